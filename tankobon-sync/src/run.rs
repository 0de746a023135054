//! Per-invocation crawl driver.
//!
//! All upstream I/O goes through the [`FeedSource`] trait so the whole
//! engine runs against a stub in tests. One invocation fetches a bounded
//! number of pages, applies the pipeline to each record, and persists the
//! crawl state exactly once at the end.
//!
//! The SQLite connection is passed behind a `tokio::sync::Mutex` and locked
//! only between awaits: a `&Connection` held across an await point would
//! make the futures `!Send`.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use tokio::sync::Mutex;

use tankobon_catalog::types::{CrawlMode, CrawlState};
use tankobon_db as db;
use tankobon_scraper::covers::{CachedCover, CoverStore};
use tankobon_scraper::types::{Paged, RawChapter, RawSeries, RawSeriesStub};
use tankobon_scraper::{CatalogClient, ScrapeError, cache_cover, list, normalize_series};

use crate::error::SyncError;
use crate::pipeline::{RecordOutcome, process_series};
use crate::state;

/// Injected upstream I/O for a crawl run.
pub trait FeedSource {
    fn series_page(
        &self,
        limit: i64,
        offset: i64,
    ) -> impl Future<Output = Result<Paged<RawSeries>, ScrapeError>> + Send;

    fn series_page_since(
        &self,
        limit: i64,
        since: DateTime<Utc>,
    ) -> impl Future<Output = Result<Paged<RawSeries>, ScrapeError>> + Send;

    fn series_ids_page(
        &self,
        limit: i64,
    ) -> impl Future<Output = Result<Paged<RawSeriesStub>, ScrapeError>> + Send;

    fn chapter_page_since(
        &self,
        limit: i64,
        since: DateTime<Utc>,
    ) -> impl Future<Output = Result<Paged<RawChapter>, ScrapeError>> + Send;

    fn series_by_id(
        &self,
        external_id: &str,
    ) -> impl Future<Output = Result<RawSeries, ScrapeError>> + Send;

    fn cache_cover(
        &self,
        slug: &str,
        candidates: &[String],
    ) -> impl Future<Output = Result<CachedCover, ScrapeError>> + Send;
}

/// Production feed source: the live upstream API plus a cover store.
pub struct UpstreamFeed<S: CoverStore + Sync> {
    client: CatalogClient,
    store: S,
}

impl<S: CoverStore + Sync> UpstreamFeed<S> {
    pub fn new(client: CatalogClient, store: S) -> Self {
        Self { client, store }
    }
}

impl<S: CoverStore + Sync> FeedSource for UpstreamFeed<S> {
    async fn series_page(&self, limit: i64, offset: i64) -> Result<Paged<RawSeries>, ScrapeError> {
        list::series_page(&self.client, limit, offset).await
    }

    async fn series_page_since(
        &self,
        limit: i64,
        since: DateTime<Utc>,
    ) -> Result<Paged<RawSeries>, ScrapeError> {
        list::series_page_since(&self.client, limit, since).await
    }

    async fn series_ids_page(&self, limit: i64) -> Result<Paged<RawSeriesStub>, ScrapeError> {
        list::series_ids_page(&self.client, limit).await
    }

    async fn chapter_page_since(
        &self,
        limit: i64,
        since: DateTime<Utc>,
    ) -> Result<Paged<RawChapter>, ScrapeError> {
        list::chapter_page_since(&self.client, limit, since).await
    }

    async fn series_by_id(&self, external_id: &str) -> Result<RawSeries, ScrapeError> {
        list::series_by_id(&self.client, external_id).await
    }

    async fn cache_cover(
        &self,
        slug: &str,
        candidates: &[String],
    ) -> Result<CachedCover, ScrapeError> {
        cache_cover(&self.store, &self.client, slug, candidates).await
    }
}

/// The two crawl feeds this engine drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedKind {
    /// Full metadata sweep over the series collection.
    Series,
    /// Chapter activity feed, resolved back to parent series.
    Chapters,
}

impl FeedKind {
    pub fn from_id(id: &str) -> Result<Self, SyncError> {
        match id {
            "series" => Ok(Self::Series),
            "chapters" => Ok(Self::Chapters),
            other => Err(SyncError::UnknownFeed {
                id: other.to_string(),
            }),
        }
    }
}

const DEFAULT_MAX_PAGES: u32 = 5;
const MAX_MAX_PAGES: u32 = 50;
const DEFAULT_HARD_CAP: u32 = 200;
const MAX_HARD_CAP: u32 = 1000;
const OUTCOME_SAMPLE: usize = 25;

/// Per-invocation budgets and flags.
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub max_pages: u32,
    pub hard_cap: u32,
    /// Reprocess records the cursor says are already seen.
    pub force: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_pages: DEFAULT_MAX_PAGES,
            hard_cap: DEFAULT_HARD_CAP,
            force: false,
        }
    }
}

impl RunOptions {
    fn clamped(self) -> Self {
        Self {
            max_pages: self.max_pages.clamp(1, MAX_MAX_PAGES),
            hard_cap: self.hard_cap.clamp(1, MAX_HARD_CAP),
            force: self.force,
        }
    }
}

/// Cursor fields at one point in time, for run reports.
#[derive(Debug, Clone, Serialize)]
pub struct CursorSnapshot {
    pub mode: String,
    pub offset: i64,
    pub updated_at: Option<DateTime<Utc>>,
    pub last_id: Option<String>,
}

impl CursorSnapshot {
    fn of(state: &CrawlState) -> Self {
        Self {
            mode: state.mode.as_str().to_string(),
            offset: state.cursor_offset,
            updated_at: state.cursor_updated_at,
            last_id: state.cursor_last_id.clone(),
        }
    }
}

/// Summary of one crawl invocation.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub feed_id: String,
    pub note: String,
    pub mode_switched: bool,
    pub cursor_before: CursorSnapshot,
    pub cursor_after: CursorSnapshot,
    pub pages_fetched: u32,
    /// Records examined, including skips.
    pub records_processed: u32,
    /// Records that went through the upsert pipeline.
    pub records_refreshed: u32,
    pub records_skipped: u32,
    /// Bounded sample of per-record outcomes.
    pub outcomes: Vec<RecordOutcome>,
    pub caught_up: bool,
}

struct RunTally {
    pages_fetched: u32,
    processed: u32,
    refreshed: u32,
    skipped: u32,
    outcomes: Vec<RecordOutcome>,
    caught_up: bool,
    /// Timestamp+id of the newest record seen, for the time-cursor advance.
    last_seen: Option<(DateTime<Utc>, String)>,
}

impl RunTally {
    fn new() -> Self {
        Self {
            pages_fetched: 0,
            processed: 0,
            refreshed: 0,
            skipped: 0,
            outcomes: Vec::new(),
            caught_up: false,
            last_seen: None,
        }
    }

    fn record(&mut self, outcome: RecordOutcome) {
        self.processed += 1;
        if outcome.refreshed() {
            self.refreshed += 1;
        } else {
            self.skipped += 1;
        }
        if self.outcomes.len() < OUTCOME_SAMPLE {
            self.outcomes.push(outcome);
        }
    }

    fn saw(&mut self, updated_at: Option<DateTime<Utc>>, external_id: &str) {
        if let Some(ts) = updated_at {
            // Later records win ties so the tie-break id tracks the last
            // record processed within a shared second.
            let newer = match &self.last_seen {
                Some((last_ts, _)) => ts >= *last_ts,
                None => true,
            };
            if newer {
                self.last_seen = Some((ts, external_id.to_string()));
            }
        }
    }

    fn over_budget(&self, opts: &RunOptions) -> bool {
        self.refreshed >= opts.hard_cap
    }
}

/// Run one bounded crawl invocation for a feed.
///
/// Loads the feed's crawl state, fetches up to `max_pages` pages, applies
/// the pipeline to each record, and writes the state back exactly once with
/// a compare-and-swap. The heartbeat is always bumped; cursor fields only
/// move when records were actually processed. An error persists nothing.
pub async fn run_feed<S: FeedSource>(
    db: &Mutex<Connection>,
    source: &S,
    feed_id: &str,
    source_name: &str,
    opts: RunOptions,
) -> Result<RunReport, SyncError> {
    let opts = opts.clamped();
    let kind = FeedKind::from_id(feed_id)?;

    let mut crawl = {
        let conn = db.lock().await;
        db::get_crawl_state(&conn, feed_id)?
    }
    .ok_or_else(|| SyncError::StateNotProvisioned {
        id: feed_id.to_string(),
    })?;
    let cursor_before = CursorSnapshot::of(&crawl);

    // Hitting the offset window cap is its own invocation: flip the mode,
    // persist, and report without fetching anything.
    if kind == FeedKind::Series && state::needs_mode_switch(&crawl) {
        state::switch_to_updated_at(&mut crawl);
        {
            let conn = db.lock().await;
            db::save_crawl_state(&conn, &mut crawl)?;
        }
        log::info!("feed {feed_id}: offset window exhausted, switched to updated-at pagination");
        return Ok(RunReport {
            feed_id: feed_id.to_string(),
            note: "offset window reached; switched to updated-at pagination".to_string(),
            mode_switched: true,
            cursor_before,
            cursor_after: CursorSnapshot::of(&crawl),
            pages_fetched: 0,
            records_processed: 0,
            records_refreshed: 0,
            records_skipped: 0,
            outcomes: Vec::new(),
            caught_up: false,
        });
    }

    let mut tally = RunTally::new();
    match kind {
        FeedKind::Series => {
            run_series_feed(db, source, feed_id, source_name, &opts, &mut crawl, &mut tally)
                .await?
        }
        FeedKind::Chapters => {
            run_chapter_feed(db, source, feed_id, source_name, &opts, &mut crawl, &mut tally)
                .await?
        }
    }

    // Cursor advance happens once per invocation, from the newest record
    // this run actually walked.
    let time_cursor = kind == FeedKind::Chapters || crawl.mode == CrawlMode::UpdatedAt;
    if time_cursor {
        if let Some((ts, id)) = &tally.last_seen {
            state::advance_cursor(&mut crawl, *ts, id);
        }
    }
    crawl.processed_count += i64::from(tally.refreshed);
    {
        let conn = db.lock().await;
        db::save_crawl_state(&conn, &mut crawl)?;
    }

    log::info!(
        "feed {feed_id}: {} pages, {} refreshed, {} skipped{}",
        tally.pages_fetched,
        tally.refreshed,
        tally.skipped,
        if tally.caught_up { ", caught up" } else { "" }
    );

    Ok(RunReport {
        feed_id: feed_id.to_string(),
        note: if tally.caught_up {
            "caught up with upstream".to_string()
        } else {
            "budget exhausted; more records remain".to_string()
        },
        mode_switched: false,
        cursor_before,
        cursor_after: CursorSnapshot::of(&crawl),
        pages_fetched: tally.pages_fetched,
        records_processed: tally.processed,
        records_refreshed: tally.refreshed,
        records_skipped: tally.skipped,
        outcomes: tally.outcomes,
        caught_up: tally.caught_up,
    })
}

async fn run_series_feed<S: FeedSource>(
    db: &Mutex<Connection>,
    source: &S,
    feed_id: &str,
    source_name: &str,
    opts: &RunOptions,
    crawl: &mut CrawlState,
    tally: &mut RunTally,
) -> Result<(), SyncError> {
    for _ in 0..opts.max_pages {
        if tally.over_budget(opts) {
            break;
        }

        let page = match crawl.mode {
            CrawlMode::Offset => {
                source.series_page(crawl.page_limit, crawl.cursor_offset).await?
            }
            CrawlMode::UpdatedAt => {
                let since = crawl.cursor_updated_at.unwrap_or_else(state::epoch_sentinel);
                source.series_page_since(crawl.page_limit, since).await?
            }
        };
        tally.pages_fetched += 1;
        crawl.total = Some(page.total);

        let fetched = page.data.len() as i64;
        let mut consumed = 0i64;
        for raw in &page.data {
            if tally.over_budget(opts) {
                break;
            }
            consumed += 1;
            let record = normalize_series(raw);
            if state::should_skip(crawl, record.updated_at, &record.external_id, opts.force) {
                tally.record(RecordOutcome::SkippedCursor {
                    external_id: record.external_id,
                });
                continue;
            }
            let outcome = process_series(db, source, feed_id, &record, source_name).await?;
            tally.saw(record.updated_at, &record.external_id);
            tally.record(outcome);
        }

        match crawl.mode {
            CrawlMode::Offset => {
                // Advancing only past consumed records keeps a mid-page
                // budget break from losing the tail of the page.
                crawl.cursor_offset += consumed;
                if consumed < fetched {
                    break;
                }
                if state::offset_exhausted(crawl) || fetched < crawl.page_limit {
                    tally.caught_up = true;
                    break;
                }
                if state::needs_mode_switch(crawl) {
                    // The switch itself is the next invocation's work.
                    break;
                }
            }
            CrawlMode::UpdatedAt => {
                if fetched < crawl.page_limit {
                    tally.caught_up = true;
                    break;
                }
                // The next page's lower bound comes from this page's tail.
                if let Some((ts, id)) = &tally.last_seen {
                    state::advance_cursor(crawl, *ts, id);
                }
            }
        }
    }

    // In updated-at mode the collection total is no longer a pagination
    // byproduct; refresh it from a cheap ids-only read.
    if crawl.mode == CrawlMode::UpdatedAt {
        let stub = source.series_ids_page(1).await?;
        crawl.total = Some(stub.total);
    }
    Ok(())
}

async fn run_chapter_feed<S: FeedSource>(
    db: &Mutex<Connection>,
    source: &S,
    feed_id: &str,
    source_name: &str,
    opts: &RunOptions,
    crawl: &mut CrawlState,
    tally: &mut RunTally,
) -> Result<(), SyncError> {
    // One upsert per parent series per invocation
    let mut resolved: HashSet<String> = HashSet::new();

    for _ in 0..opts.max_pages {
        if tally.over_budget(opts) {
            break;
        }

        let since = crawl.cursor_updated_at.unwrap_or_else(state::epoch_sentinel);
        let page = source.chapter_page_since(crawl.page_limit, since).await?;
        tally.pages_fetched += 1;

        let fetched = page.data.len() as i64;
        for chapter in &page.data {
            if tally.over_budget(opts) {
                break;
            }
            let ts = chapter.attributes.updated_at;
            if state::should_skip(crawl, ts, &chapter.id, opts.force) {
                tally.record(RecordOutcome::SkippedCursor {
                    external_id: chapter.id.clone(),
                });
                continue;
            }

            let Some(parent_id) = chapter.series_id() else {
                tally.saw(ts, &chapter.id);
                tally.record(RecordOutcome::SkippedOrphan {
                    chapter_id: chapter.id.clone(),
                });
                continue;
            };

            if !resolved.insert(parent_id.to_string()) {
                // Later chapters of an already-refreshed series still move
                // the cursor.
                tally.saw(ts, &chapter.id);
                tally.record(RecordOutcome::SkippedDuplicate {
                    external_id: parent_id.to_string(),
                });
                continue;
            }

            let raw = source.series_by_id(parent_id).await?;
            let record = normalize_series(&raw);
            let outcome = process_series(db, source, feed_id, &record, source_name).await?;
            tally.saw(ts, &chapter.id);
            tally.record(outcome);
        }

        if fetched < crawl.page_limit {
            tally.caught_up = true;
            break;
        }
        if let Some((ts, id)) = &tally.last_seen {
            state::advance_cursor(crawl, *ts, id);
        }
    }
    Ok(())
}
