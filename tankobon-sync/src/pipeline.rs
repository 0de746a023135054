//! Per-record pipeline: resolve identity, upsert, diff, audit, cover cache,
//! art-job enqueue.

use rusqlite::Connection;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::Mutex;

use tankobon_catalog::types::*;
use tankobon_db as db;
use tankobon_scraper::NormalizedSeries;

use crate::error::SyncError;
use crate::run::FeedSource;

/// The diffable view of a series. Excludes the raw snapshot and local
/// bookkeeping fields so audit diffs only show meaningful changes.
#[derive(Debug, Clone, Serialize)]
pub struct Projection {
    pub title: String,
    pub alt_titles: Vec<String>,
    pub description: Option<String>,
    pub status: String,
    pub year: Option<i32>,
    pub genres: Vec<String>,
    pub cover_url: Option<String>,
    pub source: String,
    pub external_id: String,
}

impl Projection {
    pub fn of(series: &Series) -> Self {
        Self {
            title: series.title.clone(),
            alt_titles: series.alt_titles.clone(),
            description: series.description.clone(),
            status: series.status.as_str().to_string(),
            year: series.year,
            genres: series.genres.clone(),
            cover_url: series.cover_url.clone(),
            source: series.source.clone(),
            external_id: series.external_id.clone(),
        }
    }

    fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Field-level change map between two projections: `{field: {from, to}}`.
///
/// Array fields are compared order-insensitively. A missing before
/// projection (fresh insert) reports every field changing from null.
pub fn diff_projections(before: Option<&Projection>, after: &Projection) -> Value {
    let before_value = before.map(Projection::to_value).unwrap_or(Value::Null);
    let after_value = after.to_value();

    let mut changes = serde_json::Map::new();
    let Value::Object(after_map) = &after_value else {
        return Value::Object(changes);
    };

    for (field, after_field) in after_map {
        let before_field = match &before_value {
            Value::Object(m) => m.get(field).cloned().unwrap_or(Value::Null),
            _ => Value::Null,
        };
        if !values_equal(&before_field, after_field) {
            changes.insert(
                field.clone(),
                json!({ "from": before_field, "to": after_field }),
            );
        }
    }
    Value::Object(changes)
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Array(xs), Value::Array(ys)) => {
            let mut xs: Vec<String> = xs.iter().map(Value::to_string).collect();
            let mut ys: Vec<String> = ys.iter().map(Value::to_string).collect();
            xs.sort();
            ys.sort();
            xs == ys
        }
        _ => a == b,
    }
}

/// What the pipeline did with one record.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RecordOutcome {
    Inserted {
        external_id: String,
        series_id: String,
    },
    Updated {
        external_id: String,
        series_id: String,
        changed: Vec<String>,
    },
    Unchanged {
        external_id: String,
        series_id: String,
    },
    SkippedCursor {
        external_id: String,
    },
    SkippedDuplicate {
        external_id: String,
    },
    SkippedOrphan {
        chapter_id: String,
    },
}

impl RecordOutcome {
    /// Outcomes that refreshed stored state (inserts and updates, including
    /// no-op updates that still wrote an audit entry).
    pub fn refreshed(&self) -> bool {
        matches!(
            self,
            Self::Inserted { .. } | Self::Updated { .. } | Self::Unchanged { .. }
        )
    }
}

fn unique_slug(conn: &Connection, wanted: &str, external_id: &str) -> Result<String, SyncError> {
    match db::find_series_by_slug(conn, wanted)? {
        None => Ok(wanted.to_string()),
        Some(taken) if taken.external_id == external_id => Ok(wanted.to_string()),
        Some(_) => {
            let suffix: String = external_id
                .chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .take(6)
                .collect::<String>()
                .to_lowercase();
            Ok(format!("{wanted}-{suffix}"))
        }
    }
}

/// Apply one normalized upstream record to the local store.
///
/// Covers are fetched through `source` only when the series has no cached
/// cover yet and the record offers candidates; a cover failure aborts the
/// record so the cursor does not advance past it. The connection lock is
/// released around the cover download.
pub async fn process_series<S: FeedSource>(
    db: &Mutex<Connection>,
    source: &S,
    feed_id: &str,
    record: &NormalizedSeries,
    source_name: &str,
) -> Result<RecordOutcome, SyncError> {
    let (series, before, action) = {
        let conn = db.lock().await;
        let linked_id = db::get_external_link(&conn, source_name, &record.external_id)?;
        let existing = match &linked_id {
            Some(id) => db::get_series(&conn, id)?,
            None => None,
        };
        let before = existing.as_ref().map(Projection::of);

        let (series_id, slug, action) = match &existing {
            // Identity and slug are fixed at first sight
            Some(series) => (series.id.clone(), series.slug.clone(), DeltaAction::Update),
            None => {
                let slug = unique_slug(&conn, &record.slug, &record.external_id)?;
                (slug.clone(), slug, DeltaAction::Insert)
            }
        };

        let series = Series {
            id: series_id.clone(),
            slug,
            title: record.title.clone(),
            alt_titles: record.alt_titles.clone(),
            description: record.description.clone(),
            status: record.status,
            year: record.year,
            genres: record.genres.clone(),
            cover_url: existing.as_ref().and_then(|s| s.cover_url.clone()),
            authors: record.authors.clone(),
            artists: record.artists.clone(),
            source: source_name.to_string(),
            external_id: record.external_id.clone(),
            raw: record.raw.clone(),
            created_at: String::new(),
            updated_at: String::new(),
        };
        db::upsert_series(&conn, &series)?;
        if linked_id.is_none() {
            db::insert_external_link(&conn, source_name, &record.external_id, &series_id)?;
        }
        (series, before, action)
    };

    let cached = if series.cover_url.is_none() && !record.cover_candidates.is_empty() {
        Some(
            source
                .cache_cover(&series.slug, &record.cover_candidates)
                .await?,
        )
    } else {
        None
    };

    let conn = db.lock().await;
    if let Some(cached) = &cached {
        db::set_cover_url(&conn, &series.id, &cached.url)?;
    }
    // Every refreshed record re-queues its art job, cover or not.
    db::enqueue_art_job(&conn, &series.id)?;

    // The audit trail diffs the stored row, not the in-memory copy.
    let stored =
        db::get_series(&conn, &series.id)?.ok_or_else(|| db::OperationError::NotFound {
            entity_type: "series".to_string(),
            id: series.id.clone(),
        })?;
    let after = Projection::of(&stored);

    let changes = diff_projections(before.as_ref(), &after);
    let changed: Vec<String> = match &changes {
        Value::Object(map) => map.keys().cloned().collect(),
        _ => Vec::new(),
    };

    let entry = DeltaLogEntry {
        id: 0,
        feed_id: feed_id.to_string(),
        external_id: record.external_id.clone(),
        series_id: series.id.clone(),
        source_updated_at: record.updated_at,
        action,
        changes,
        before_state: before.as_ref().map(Projection::to_value),
        after_state: after.to_value(),
        created_at: String::new(),
    };
    db::insert_delta_log(&conn, &entry)?;

    Ok(match action {
        DeltaAction::Insert => RecordOutcome::Inserted {
            external_id: record.external_id.clone(),
            series_id: series.id,
        },
        DeltaAction::Update if changed.is_empty() => RecordOutcome::Unchanged {
            external_id: record.external_id.clone(),
            series_id: series.id,
        },
        DeltaAction::Update => RecordOutcome::Updated {
            external_id: record.external_id.clone(),
            series_id: series.id,
            changed,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn projection(title: &str, genres: &[&str]) -> Projection {
        Projection {
            title: title.to_string(),
            alt_titles: vec![],
            description: None,
            status: "ongoing".to_string(),
            year: Some(2020),
            genres: genres.iter().map(|g| g.to_string()).collect(),
            cover_url: None,
            source: "mangadex".to_string(),
            external_id: "ext-1".to_string(),
        }
    }

    #[test]
    fn diff_against_nothing_reports_all_fields() {
        let after = projection("A", &["Action"]);
        let changes = diff_projections(None, &after);
        assert_eq!(changes["title"]["from"], Value::Null);
        assert_eq!(changes["title"]["to"], "A");
        assert!(changes.get("year").is_some());
    }

    #[test]
    fn diff_identical_is_empty() {
        let p = projection("A", &["Action"]);
        let changes = diff_projections(Some(&p), &p);
        assert_eq!(changes, json!({}));
    }

    #[test]
    fn diff_ignores_array_order() {
        let before = projection("A", &["Action", "Drama"]);
        let after = projection("A", &["Drama", "Action"]);
        let changes = diff_projections(Some(&before), &after);
        assert_eq!(changes, json!({}));
    }

    #[test]
    fn diff_reports_changed_fields_only() {
        let before = projection("A", &["Action"]);
        let after = projection("B", &["Action"]);
        let changes = diff_projections(Some(&before), &after);
        assert_eq!(changes["title"]["from"], "A");
        assert_eq!(changes["title"]["to"], "B");
        assert!(changes.get("genres").is_none());
    }
}
