//! SQLite persistence layer for the catalog sync engine.
//!
//! Provides schema creation, CRUD operations, and query APIs
//! backed by SQLite (via rusqlite with bundled feature).

pub mod operations;
pub mod queries;
pub mod schema;

pub use operations::{
    OperationError, enqueue_art_job, find_series_by_slug, get_crawl_state, get_external_link,
    get_series, insert_crawl_state, insert_delta_log, insert_external_link, save_crawl_state,
    set_cover_url, upsert_series,
};
pub use queries::{
    SyncStats, delta_count_for_series, pending_art_jobs, recent_delta_entries, sync_stats,
};
pub use schema::{open_database, open_memory};
