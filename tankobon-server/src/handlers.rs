//! Admin request handlers.
//!
//! Each handler opens its own SQLite connection; the upstream feed client
//! is the only shared piece of state.

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::Mutex;

use tankobon_db as db;
use tankobon_sync::{FeedKind, FeedSource, RunOptions, RunReport, run_feed};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SyncQuery {
    pub max_pages: Option<u32>,
    pub hard_cap: Option<u32>,
    #[serde(default)]
    pub force: bool,
}

/// POST /admin/feeds/{state_id}/sync
pub async fn sync_feed(
    State(state): State<AppState>,
    Path(state_id): Path<String>,
    Query(query): Query<SyncQuery>,
) -> Result<Json<RunReport>, ApiError> {
    let defaults = RunOptions::default();
    let opts = RunOptions {
        max_pages: query.max_pages.unwrap_or(defaults.max_pages),
        hard_cap: query.hard_cap.unwrap_or(defaults.hard_cap),
        force: query.force,
    };

    let conn = Mutex::new(db::open_database(&state.db_path)?);
    let report = run_feed(&conn, state.feed.as_ref(), &state_id, &state.source_name, opts).await?;
    Ok(Json(report))
}

/// GET /admin/feeds/{state_id}/peek
///
/// The first upstream page the next sync invocation would read, raw and
/// unprocessed. Nothing is written.
pub async fn peek_feed(
    State(state): State<AppState>,
    Path(state_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let kind = FeedKind::from_id(&state_id)?;
    let crawl = {
        let conn = db::open_database(&state.db_path)?;
        db::get_crawl_state(&conn, &state_id)?.ok_or_else(|| {
            ApiError::NotFound(format!("Crawl state not provisioned: {state_id}"))
        })?
    };

    let since = crawl
        .cursor_updated_at
        .unwrap_or(chrono::DateTime::UNIX_EPOCH);
    let page = match (kind, crawl.mode) {
        (FeedKind::Series, tankobon_catalog::types::CrawlMode::Offset) => serde_json::to_value(
            state
                .feed
                .series_page(crawl.page_limit, crawl.cursor_offset)
                .await?,
        ),
        (FeedKind::Series, tankobon_catalog::types::CrawlMode::UpdatedAt) => serde_json::to_value(
            state.feed.series_page_since(crawl.page_limit, since).await?,
        ),
        (FeedKind::Chapters, _) => serde_json::to_value(
            state.feed.chapter_page_since(crawl.page_limit, since).await?,
        ),
    }
    .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(page))
}

/// GET /admin/feeds/{state_id}/deltas?limit=..
pub async fn feed_deltas(
    State(state): State<AppState>,
    Path(state_id): Path<String>,
    Query(query): Query<DeltaQuery>,
) -> Result<Json<Value>, ApiError> {
    let conn = db::open_database(&state.db_path)?;
    let entries = db::recent_delta_entries(&conn, &state_id, query.limit.unwrap_or(50))?;
    Ok(Json(json!({ "feed_id": state_id, "entries": entries })))
}

#[derive(Debug, Deserialize)]
pub struct DeltaQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct LookupQuery {
    pub external_id: String,
    pub source: Option<String>,
}

/// GET /admin/lookup?external_id=..&source=..
pub async fn lookup(
    State(state): State<AppState>,
    Query(query): Query<LookupQuery>,
) -> Result<Json<Value>, ApiError> {
    let source = query.source.as_deref().unwrap_or(&state.source_name);
    let conn = db::open_database(&state.db_path)?;
    let series_id = db::get_external_link(&conn, source, &query.external_id)?;
    Ok(Json(json!({
        "external_id": query.external_id,
        "source": source,
        "mapped": series_id.is_some(),
        "series_id": series_id,
    })))
}

/// GET /admin/stats
pub async fn stats(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let conn = db::open_database(&state.db_path)?;
    let stats = db::sync_stats(&conn)?;
    let pending = db::pending_art_jobs(&conn, 20)?;
    Ok(Json(json!({
        "stats": stats,
        "pending_art_jobs": pending,
    })))
}

/// GET /health (unauthenticated)
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
