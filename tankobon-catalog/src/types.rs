//! Data model types for the manga catalog sync engine.
//!
//! These types represent the persistent sync schema: canonical series,
//! external-id links, per-feed crawl state, the append-only delta log,
//! and art-job markers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Series ──────────────────────────────────────────────────────────────────

/// The canonical local representation of a catalog entity (a manga series).
///
/// Created and updated only through the sync pipeline; `raw` holds the
/// normalized upstream snapshot and is excluded from change diffing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Series {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub alt_titles: Vec<String>,
    pub description: Option<String>,
    pub status: SeriesStatus,
    pub year: Option<i32>,
    /// Merged genre + theme tags, deduplicated and sorted.
    pub genres: Vec<String>,
    pub cover_url: Option<String>,
    pub authors: Vec<String>,
    pub artists: Vec<String>,
    pub source: String,
    pub external_id: String,
    pub raw: serde_json::Value,
    pub created_at: String,
    pub updated_at: String,
}

/// Publication lifecycle status, normalized into a closed vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeriesStatus {
    Ongoing,
    Completed,
    Hiatus,
    Cancelled,
    Unknown,
}

impl Default for SeriesStatus {
    fn default() -> Self {
        Self::Unknown
    }
}

impl SeriesStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ongoing => "ongoing",
            Self::Completed => "completed",
            Self::Hiatus => "hiatus",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
        }
    }

    /// Map free-text upstream status values onto the closed vocabulary.
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "ongoing" | "publishing" | "releasing" | "serializing" => Self::Ongoing,
            "completed" | "complete" | "finished" | "ended" => Self::Completed,
            "hiatus" | "on_hiatus" | "on hiatus" | "paused" => Self::Hiatus,
            "cancelled" | "canceled" | "discontinued" | "dropped" => Self::Cancelled,
            _ => Self::Unknown,
        }
    }
}

// ── External Link ───────────────────────────────────────────────────────────

/// Maps an upstream external id (scoped by source) to a local series id.
///
/// Unique on (source, external_id). Created on first sight of an external
/// id; read on every subsequent sight to decide insert-vs-update.
#[derive(Debug, Clone)]
pub struct ExternalLink {
    pub source: String,
    pub external_id: String,
    pub series_id: String,
    pub created_at: String,
}

// ── Crawl State ─────────────────────────────────────────────────────────────

/// Pagination strategy for a crawl feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlMode {
    Offset,
    UpdatedAt,
}

impl CrawlMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Offset => "offset",
            Self::UpdatedAt => "updated_at",
        }
    }

    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "updated_at" | "updatedat" | "cursor" => Self::UpdatedAt,
            _ => Self::Offset,
        }
    }
}

/// One persisted row per logical crawl feed.
///
/// Exactly one of the two cursor representations is authoritative at any
/// time, selected by `mode`. The `version` column is a compare-and-swap
/// counter: writes that lose a race fail loudly instead of silently
/// clobbering the cursor.
#[derive(Debug, Clone)]
pub struct CrawlState {
    pub id: String,
    pub mode: CrawlMode,
    /// Next page offset. Valid only in offset mode.
    pub cursor_offset: i64,
    /// Upstream update time of the last fully-processed record.
    /// Authoritative only in updated-at mode.
    pub cursor_updated_at: Option<DateTime<Utc>>,
    /// External id of that same record, used as a tie-break.
    pub cursor_last_id: Option<String>,
    pub page_limit: i64,
    /// Last-known upstream total. Offset mode only.
    pub total: Option<i64>,
    /// Lifetime count of records refreshed by this feed.
    pub processed_count: i64,
    pub version: i64,
    /// Heartbeat, bumped on every invocation.
    pub updated_at: String,
}

impl CrawlState {
    /// A freshly provisioned state in offset mode.
    pub fn new(id: impl Into<String>, page_limit: i64) -> Self {
        Self {
            id: id.into(),
            mode: CrawlMode::Offset,
            cursor_offset: 0,
            cursor_updated_at: None,
            cursor_last_id: None,
            page_limit,
            total: None,
            processed_count: 0,
            version: 0,
            updated_at: String::new(),
        }
    }
}

// ── Delta Log ───────────────────────────────────────────────────────────────

/// What the pipeline did with a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeltaAction {
    Insert,
    Update,
}

impl DeltaAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
        }
    }

    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "insert" => Self::Insert,
            _ => Self::Update,
        }
    }
}

/// Immutable audit record of one pipeline application.
///
/// Append-only; written even when the change map is empty so that noisy
/// upstream updates (feed reports a change, nothing differs) stay visible.
#[derive(Debug, Clone, Serialize)]
pub struct DeltaLogEntry {
    pub id: i64,
    pub feed_id: String,
    pub external_id: String,
    pub series_id: String,
    pub source_updated_at: Option<DateTime<Utc>>,
    pub action: DeltaAction,
    /// Field-level change map: `{field: {from, to}}`.
    pub changes: serde_json::Value,
    pub before_state: Option<serde_json::Value>,
    pub after_state: serde_json::Value,
    pub created_at: String,
}

// ── Art Job ─────────────────────────────────────────────────────────────────

/// A deferred artwork-caching task marker, one row per series.
///
/// Re-enqueuing overwrites status and timestamp rather than creating a
/// duplicate row.
#[derive(Debug, Clone, Serialize)]
pub struct ArtJob {
    pub series_id: String,
    pub status: String,
    pub queued_at: String,
}

pub const ART_JOB_PENDING: &str = "pending";
