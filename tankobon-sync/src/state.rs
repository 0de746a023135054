//! Crawl-state transitions: mode switching, exhaustion, per-record skip,
//! and cursor advancement. All pure functions over `CrawlState`.

use chrono::{DateTime, TimeDelta, Utc};
use tankobon_catalog::types::{CrawlMode, CrawlState};

/// The upstream rejects offset+limit reads past this window; the crawl
/// switches to time-cursor pagination before hitting it.
pub const MAX_OFFSET_WINDOW: i64 = 10_000;

/// Sentinel cursor for a feed that has never advanced in updated-at mode.
pub fn epoch_sentinel() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

/// Would the next offset-mode page reach past the upstream window?
pub fn needs_mode_switch(state: &CrawlState) -> bool {
    state.mode == CrawlMode::Offset && state.cursor_offset + state.page_limit > MAX_OFFSET_WINDOW
}

/// Flip an offset-mode feed to updated-at pagination.
///
/// The offset resets; a previously seeded time cursor is kept so records
/// already walked by an earlier updated-at phase are not re-read, otherwise
/// the epoch sentinel makes the first updated-at sweep start from the
/// beginning of time.
pub fn switch_to_updated_at(state: &mut CrawlState) {
    state.mode = CrawlMode::UpdatedAt;
    state.cursor_offset = 0;
    if state.cursor_updated_at.is_none() {
        state.cursor_updated_at = Some(epoch_sentinel());
    }
}

/// Offset-mode walk has covered the whole known collection.
pub fn offset_exhausted(state: &CrawlState) -> bool {
    match state.total {
        Some(total) => state.cursor_offset + state.page_limit >= total,
        None => false,
    }
}

/// Should this record be skipped as already-processed?
///
/// Records strictly older than the cursor are skipped; records at exactly
/// the cursor timestamp are skipped only when their external id is lexically
/// at or before the tie-break id. `force` disables skipping entirely.
pub fn should_skip(
    state: &CrawlState,
    updated_at: Option<DateTime<Utc>>,
    external_id: &str,
    force: bool,
) -> bool {
    if force {
        return false;
    }
    let (Some(cursor), Some(ts)) = (state.cursor_updated_at, updated_at) else {
        return false;
    };
    if ts < cursor {
        return true;
    }
    if ts == cursor {
        if let Some(last_id) = &state.cursor_last_id {
            return external_id <= last_id.as_str();
        }
    }
    false
}

/// Advance the time cursor past a fully-processed record.
///
/// The stored cursor is the record's timestamp plus one second, so a
/// subsequent `updatedAtSince` query (inclusive on the lower bound) does
/// not re-fetch a full page of already-seen records; the tie-break id
/// covers records sharing the same second.
pub fn advance_cursor(state: &mut CrawlState, updated_at: DateTime<Utc>, external_id: &str) {
    state.cursor_updated_at = Some(updated_at + TimeDelta::seconds(1));
    state.cursor_last_id = Some(external_id.to_string());
}
