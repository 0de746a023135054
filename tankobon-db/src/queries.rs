//! Read queries for the sync database.
//!
//! Listing and counting surfaces consumed by the admin endpoints and the
//! audit dashboard.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use serde::Serialize;
use tankobon_catalog::types::*;

use crate::operations::OperationError;

// ── Delta Log ───────────────────────────────────────────────────────────────

/// Most recent delta log entries for a feed, newest first.
pub fn recent_delta_entries(
    conn: &Connection,
    feed_id: &str,
    limit: u32,
) -> Result<Vec<DeltaLogEntry>, OperationError> {
    let mut stmt = conn.prepare(
        "SELECT id, feed_id, external_id, series_id, source_updated_at,
                action, changes, before_state, after_state, created_at
         FROM delta_log WHERE feed_id = ?1
         ORDER BY id DESC LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![feed_id, limit], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, Option<String>>(4)?,
            row.get::<_, String>(5)?,
            row.get::<_, String>(6)?,
            row.get::<_, Option<String>>(7)?,
            row.get::<_, String>(8)?,
            row.get::<_, String>(9)?,
        ))
    })?;

    let mut entries = Vec::new();
    for row in rows {
        let (id, feed_id, external_id, series_id, source_ts, action, changes, before, after, created) =
            row?;
        let source_updated_at = source_ts
            .map(|t| DateTime::parse_from_rfc3339(&t).map(|dt| dt.with_timezone(&Utc)))
            .transpose()?;
        entries.push(DeltaLogEntry {
            id,
            feed_id,
            external_id,
            series_id,
            source_updated_at,
            action: DeltaAction::from_str_loose(&action),
            changes: serde_json::from_str(&changes)?,
            before_state: before.map(|b| serde_json::from_str(&b)).transpose()?,
            after_state: serde_json::from_str(&after)?,
            created_at: created,
        });
    }
    Ok(entries)
}

/// Count delta log entries recorded for one series.
pub fn delta_count_for_series(
    conn: &Connection,
    series_id: &str,
) -> Result<i64, OperationError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM delta_log WHERE series_id = ?1",
        params![series_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

// ── Art Jobs ────────────────────────────────────────────────────────────────

/// Pending art jobs, oldest first.
pub fn pending_art_jobs(conn: &Connection, limit: u32) -> Result<Vec<ArtJob>, OperationError> {
    let mut stmt = conn.prepare(
        "SELECT series_id, status, queued_at FROM art_jobs
         WHERE status = 'pending'
         ORDER BY queued_at ASC LIMIT ?1",
    )?;
    let rows = stmt.query_map(params![limit], |row| {
        Ok(ArtJob {
            series_id: row.get(0)?,
            status: row.get(1)?,
            queued_at: row.get(2)?,
        })
    })?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

// ── Stats ───────────────────────────────────────────────────────────────────

/// Aggregate sync statistics for the admin surface.
#[derive(Debug, Clone, Serialize)]
pub struct SyncStats {
    pub series_total: i64,
    pub series_with_cover: i64,
    pub delta_entries: i64,
    pub pending_art_jobs: i64,
}

pub fn sync_stats(conn: &Connection) -> Result<SyncStats, OperationError> {
    let series_total = conn.query_row("SELECT COUNT(*) FROM series", [], |row| row.get(0))?;
    let series_with_cover = conn.query_row(
        "SELECT COUNT(*) FROM series WHERE cover_url IS NOT NULL",
        [],
        |row| row.get(0),
    )?;
    let delta_entries = conn.query_row("SELECT COUNT(*) FROM delta_log", [], |row| row.get(0))?;
    let pending_art_jobs = conn.query_row(
        "SELECT COUNT(*) FROM art_jobs WHERE status = 'pending'",
        [],
        |row| row.get(0),
    )?;
    Ok(SyncStats {
        series_total,
        series_with_cover,
        delta_entries,
        pending_art_jobs,
    })
}
