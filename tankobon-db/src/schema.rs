//! SQLite schema creation and migration.

use rusqlite::Connection;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration error: expected version {expected}, found {found}")]
    VersionMismatch { expected: i32, found: i32 },
}

/// Current schema version. Increment when adding migrations.
pub const CURRENT_VERSION: i32 = 1;

/// Create all tables and indexes if they don't exist.
///
/// This is idempotent — safe to call on an existing database.
pub fn create_schema(conn: &Connection) -> Result<(), SchemaError> {
    conn.execute_batch(SCHEMA_SQL)?;
    set_schema_version(conn, CURRENT_VERSION)?;
    Ok(())
}

/// Open or create a catalog database at the given path.
pub fn open_database(path: &std::path::Path) -> Result<Connection, SchemaError> {
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;

    let version = get_schema_version(&conn)?;
    if version == 0 {
        create_schema(&conn)?;
    } else if version < CURRENT_VERSION {
        migrate(&conn, version)?;
    }

    Ok(conn)
}

/// Open an in-memory database with the full schema. Useful for testing.
pub fn open_memory() -> Result<Connection, SchemaError> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    create_schema(&conn)?;
    Ok(conn)
}

/// Get the current schema version, or 0 if no schema exists.
fn get_schema_version(conn: &Connection) -> Result<i32, SchemaError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

/// Record a schema version.
fn set_schema_version(conn: &Connection, version: i32) -> Result<(), SchemaError> {
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

/// Run migrations from `from_version` up to `CURRENT_VERSION`.
fn migrate(conn: &Connection, from_version: i32) -> Result<(), SchemaError> {
    if from_version > CURRENT_VERSION {
        return Err(SchemaError::VersionMismatch {
            expected: CURRENT_VERSION,
            found: from_version,
        });
    }

    let mut version = from_version;
    while version < CURRENT_VERSION {
        // No migrations yet; placeholder keeps the version chain intact.
        version += 1;
        set_schema_version(conn, version)?;
    }

    Ok(())
}

const SCHEMA_SQL: &str = r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Canonical series records
CREATE TABLE IF NOT EXISTS series (
    id TEXT PRIMARY KEY,
    slug TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL,
    alt_titles TEXT NOT NULL DEFAULT '[]',
    description TEXT,
    status TEXT NOT NULL DEFAULT 'unknown',
    year INTEGER,
    genres TEXT NOT NULL DEFAULT '[]',
    cover_url TEXT,
    authors TEXT NOT NULL DEFAULT '[]',
    artists TEXT NOT NULL DEFAULT '[]',
    source TEXT NOT NULL,
    external_id TEXT NOT NULL,
    raw TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_series_source_external ON series(source, external_id);

-- Upstream id -> local id mapping
CREATE TABLE IF NOT EXISTS external_links (
    source TEXT NOT NULL,
    external_id TEXT NOT NULL,
    series_id TEXT NOT NULL REFERENCES series(id),
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (source, external_id)
);
CREATE INDEX IF NOT EXISTS idx_links_series ON external_links(series_id);

-- One row per logical crawl feed
CREATE TABLE IF NOT EXISTS crawl_state (
    id TEXT PRIMARY KEY,
    mode TEXT NOT NULL DEFAULT 'offset',
    cursor_offset INTEGER NOT NULL DEFAULT 0,
    cursor_updated_at TEXT,
    cursor_last_id TEXT,
    page_limit INTEGER NOT NULL DEFAULT 100,
    total INTEGER,
    processed_count INTEGER NOT NULL DEFAULT 0,
    version INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Append-only audit trail of per-record sync outcomes
CREATE TABLE IF NOT EXISTS delta_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    feed_id TEXT NOT NULL,
    external_id TEXT NOT NULL,
    series_id TEXT NOT NULL,
    source_updated_at TEXT,
    action TEXT NOT NULL,
    changes TEXT NOT NULL DEFAULT '{}',
    before_state TEXT,
    after_state TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);
CREATE INDEX IF NOT EXISTS idx_delta_feed ON delta_log(feed_id, created_at);
CREATE INDEX IF NOT EXISTS idx_delta_series ON delta_log(series_id);

-- Deferred artwork-caching markers, one row per series
CREATE TABLE IF NOT EXISTS art_jobs (
    series_id TEXT PRIMARY KEY REFERENCES series(id),
    status TEXT NOT NULL DEFAULT 'pending',
    queued_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;
