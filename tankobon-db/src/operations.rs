//! CRUD operations for the sync engine's durable state.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tankobon_catalog::types::*;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OperationError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("JSON column error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Timestamp column error: {0}")]
    Time(#[from] chrono::ParseError),
    #[error("Entity not found: {entity_type} with id '{id}'")]
    NotFound { entity_type: String, id: String },
    #[error("Concurrent update detected on crawl state '{id}' (stale version {version})")]
    ConcurrentUpdate { id: String, version: i64 },
}

// ── Series Operations ───────────────────────────────────────────────────────

/// Insert or update a series. Idempotent: applying the same record twice
/// produces identical stored state and no duplicate rows.
pub fn upsert_series(conn: &Connection, series: &Series) -> Result<(), OperationError> {
    conn.execute(
        "INSERT INTO series (id, slug, title, alt_titles, description, status, year,
             genres, cover_url, authors, artists, source, external_id, raw)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
         ON CONFLICT(id) DO UPDATE SET
             slug = excluded.slug,
             title = excluded.title,
             alt_titles = excluded.alt_titles,
             description = excluded.description,
             status = excluded.status,
             year = excluded.year,
             genres = excluded.genres,
             cover_url = excluded.cover_url,
             authors = excluded.authors,
             artists = excluded.artists,
             source = excluded.source,
             external_id = excluded.external_id,
             raw = excluded.raw,
             updated_at = datetime('now')",
        params![
            series.id,
            series.slug,
            series.title,
            serde_json::to_string(&series.alt_titles)?,
            series.description,
            series.status.as_str(),
            series.year,
            serde_json::to_string(&series.genres)?,
            series.cover_url,
            serde_json::to_string(&series.authors)?,
            serde_json::to_string(&series.artists)?,
            series.source,
            series.external_id,
            serde_json::to_string(&series.raw)?,
        ],
    )?;
    Ok(())
}

const SERIES_COLUMNS: &str = "id, slug, title, alt_titles, description, status, year,
                genres, cover_url, authors, artists, source, external_id, raw,
                created_at, updated_at";

/// Load a series by local id.
pub fn get_series(conn: &Connection, id: &str) -> Result<Option<Series>, OperationError> {
    let sql = format!("SELECT {SERIES_COLUMNS} FROM series WHERE id = ?1");
    let mut stmt = conn.prepare(&sql)?;
    let row = stmt
        .query_row(params![id], series_row)
        .optional()?;
    row.map(series_from_row).transpose()
}

/// Find a series by slug.
pub fn find_series_by_slug(
    conn: &Connection,
    slug: &str,
) -> Result<Option<Series>, OperationError> {
    let sql = format!("SELECT {SERIES_COLUMNS} FROM series WHERE slug = ?1");
    let mut stmt = conn.prepare(&sql)?;
    let row = stmt
        .query_row(params![slug], series_row)
        .optional()?;
    row.map(series_from_row).transpose()
}

/// Persist a freshly cached cover URL.
pub fn set_cover_url(conn: &Connection, series_id: &str, url: &str) -> Result<(), OperationError> {
    let changed = conn.execute(
        "UPDATE series SET cover_url = ?2, updated_at = datetime('now') WHERE id = ?1",
        params![series_id, url],
    )?;
    if changed == 0 {
        return Err(OperationError::NotFound {
            entity_type: "series".to_string(),
            id: series_id.to_string(),
        });
    }
    Ok(())
}

/// Raw column values for a series row, parsed into `Series` after the
/// statement completes (JSON decoding errors carry their own type).
struct SeriesRow {
    id: String,
    slug: String,
    title: String,
    alt_titles: String,
    description: Option<String>,
    status: String,
    year: Option<i32>,
    genres: String,
    cover_url: Option<String>,
    authors: String,
    artists: String,
    source: String,
    external_id: String,
    raw: String,
    created_at: String,
    updated_at: String,
}

fn series_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SeriesRow> {
    Ok(SeriesRow {
        id: row.get(0)?,
        slug: row.get(1)?,
        title: row.get(2)?,
        alt_titles: row.get(3)?,
        description: row.get(4)?,
        status: row.get(5)?,
        year: row.get(6)?,
        genres: row.get(7)?,
        cover_url: row.get(8)?,
        authors: row.get(9)?,
        artists: row.get(10)?,
        source: row.get(11)?,
        external_id: row.get(12)?,
        raw: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

fn series_from_row(r: SeriesRow) -> Result<Series, OperationError> {
    Ok(Series {
        id: r.id,
        slug: r.slug,
        title: r.title,
        alt_titles: serde_json::from_str(&r.alt_titles)?,
        description: r.description,
        status: SeriesStatus::from_str_loose(&r.status),
        year: r.year,
        genres: serde_json::from_str(&r.genres)?,
        cover_url: r.cover_url,
        authors: serde_json::from_str(&r.authors)?,
        artists: serde_json::from_str(&r.artists)?,
        source: r.source,
        external_id: r.external_id,
        raw: serde_json::from_str(&r.raw)?,
        created_at: r.created_at,
        updated_at: r.updated_at,
    })
}

// ── External Link Operations ────────────────────────────────────────────────

/// Look up the local series id for an upstream external id.
pub fn get_external_link(
    conn: &Connection,
    source: &str,
    external_id: &str,
) -> Result<Option<String>, OperationError> {
    let mut stmt = conn.prepare(
        "SELECT series_id FROM external_links WHERE source = ?1 AND external_id = ?2",
    )?;
    let result = stmt
        .query_row(params![source, external_id], |row| row.get::<_, String>(0))
        .optional()?;
    Ok(result)
}

/// Record a new upstream-id mapping. First sight of an external id only.
pub fn insert_external_link(
    conn: &Connection,
    source: &str,
    external_id: &str,
    series_id: &str,
) -> Result<(), OperationError> {
    conn.execute(
        "INSERT INTO external_links (source, external_id, series_id) VALUES (?1, ?2, ?3)",
        params![source, external_id, series_id],
    )?;
    Ok(())
}

// ── Crawl State Operations ──────────────────────────────────────────────────

/// Load a crawl state row, or None when the feed was never provisioned.
pub fn get_crawl_state(
    conn: &Connection,
    id: &str,
) -> Result<Option<CrawlState>, OperationError> {
    let mut stmt = conn.prepare(
        "SELECT id, mode, cursor_offset, cursor_updated_at, cursor_last_id,
                page_limit, total, processed_count, version, updated_at
         FROM crawl_state WHERE id = ?1",
    )?;
    let row = stmt
        .query_row(params![id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, Option<i64>>(6)?,
                row.get::<_, i64>(7)?,
                row.get::<_, i64>(8)?,
                row.get::<_, String>(9)?,
            ))
        })
        .optional()?;

    let Some((id, mode, offset, cursor_ts, last_id, limit, total, processed, version, heartbeat)) =
        row
    else {
        return Ok(None);
    };

    let cursor_updated_at = cursor_ts
        .map(|t| DateTime::parse_from_rfc3339(&t).map(|dt| dt.with_timezone(&Utc)))
        .transpose()?;

    Ok(Some(CrawlState {
        id,
        mode: CrawlMode::from_str_loose(&mode),
        cursor_offset: offset,
        cursor_updated_at,
        cursor_last_id: last_id,
        page_limit: limit,
        total,
        processed_count: processed,
        version,
        updated_at: heartbeat,
    }))
}

/// Provision a crawl state row. Done once per feed, out-of-band.
pub fn insert_crawl_state(conn: &Connection, state: &CrawlState) -> Result<(), OperationError> {
    conn.execute(
        "INSERT INTO crawl_state (id, mode, cursor_offset, cursor_updated_at, cursor_last_id,
             page_limit, total, processed_count, version)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            state.id,
            state.mode.as_str(),
            state.cursor_offset,
            state.cursor_updated_at.map(|t| t.to_rfc3339()),
            state.cursor_last_id,
            state.page_limit,
            state.total,
            state.processed_count,
            state.version,
        ],
    )?;
    Ok(())
}

/// Persist a crawl state with a compare-and-swap on `version`.
///
/// The write only lands when the stored version still matches the version
/// the state was loaded with; a lost race surfaces as `ConcurrentUpdate`
/// instead of silently clobbering another invocation's cursor. On success
/// the in-memory version is bumped to match the stored row.
pub fn save_crawl_state(
    conn: &Connection,
    state: &mut CrawlState,
) -> Result<(), OperationError> {
    let changed = conn.execute(
        "UPDATE crawl_state SET
             mode = ?2,
             cursor_offset = ?3,
             cursor_updated_at = ?4,
             cursor_last_id = ?5,
             page_limit = ?6,
             total = ?7,
             processed_count = ?8,
             version = version + 1,
             updated_at = datetime('now')
         WHERE id = ?1 AND version = ?9",
        params![
            state.id,
            state.mode.as_str(),
            state.cursor_offset,
            state.cursor_updated_at.map(|t| t.to_rfc3339()),
            state.cursor_last_id,
            state.page_limit,
            state.total,
            state.processed_count,
            state.version,
        ],
    )?;

    if changed == 0 {
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM crawl_state WHERE id = ?1)",
            params![state.id],
            |row| row.get(0),
        )?;
        if exists {
            return Err(OperationError::ConcurrentUpdate {
                id: state.id.clone(),
                version: state.version,
            });
        }
        return Err(OperationError::NotFound {
            entity_type: "crawl_state".to_string(),
            id: state.id.clone(),
        });
    }

    state.version += 1;
    Ok(())
}

// ── Delta Log Operations ────────────────────────────────────────────────────

/// Append a delta log entry. Returns the generated id.
pub fn insert_delta_log(conn: &Connection, entry: &DeltaLogEntry) -> Result<i64, OperationError> {
    conn.execute(
        "INSERT INTO delta_log (feed_id, external_id, series_id, source_updated_at,
             action, changes, before_state, after_state)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            entry.feed_id,
            entry.external_id,
            entry.series_id,
            entry.source_updated_at.map(|t| t.to_rfc3339()),
            entry.action.as_str(),
            serde_json::to_string(&entry.changes)?,
            entry
                .before_state
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
            serde_json::to_string(&entry.after_state)?,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

// ── Art Job Operations ──────────────────────────────────────────────────────

/// Idempotently (re-)enqueue an artwork-caching job for a series.
///
/// Overwrites status and timestamp on conflict rather than adding a row.
pub fn enqueue_art_job(conn: &Connection, series_id: &str) -> Result<(), OperationError> {
    conn.execute(
        "INSERT INTO art_jobs (series_id, status, queued_at)
         VALUES (?1, ?2, datetime('now'))
         ON CONFLICT(series_id) DO UPDATE SET
             status = excluded.status,
             queued_at = excluded.queued_at",
        params![series_id, ART_JOB_PENDING],
    )?;
    Ok(())
}
