//! Pure normalization of raw upstream records into catalog shapes.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use tankobon_catalog::slug::{slugify, synthesized_slug};
use tankobon_catalog::types::SeriesStatus;

use crate::list::COVER_BASE_URL;
use crate::types::{RawRelationship, RawSeries};

/// Language preference for localized title and description maps.
const LANG_PREFERENCE: [&str; 3] = ["en", "ja-ro", "ja"];

/// The sync-relevant view of an upstream series record. Everything here is
/// derived deterministically from the raw record.
#[derive(Debug, Clone)]
pub struct NormalizedSeries {
    pub external_id: String,
    pub slug: String,
    pub title: String,
    pub alt_titles: Vec<String>,
    pub description: Option<String>,
    pub status: SeriesStatus,
    pub year: Option<i32>,
    pub genres: Vec<String>,
    pub authors: Vec<String>,
    pub artists: Vec<String>,
    /// Cover URLs to try, best candidate first.
    pub cover_candidates: Vec<String>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Snapshot of the raw record for the `raw` column.
    pub raw: serde_json::Value,
}

/// Normalize a raw upstream record.
pub fn normalize_series(raw: &RawSeries) -> NormalizedSeries {
    let title = preferred_title(raw);
    let slug = {
        let s = slugify(&title);
        if s.is_empty() {
            synthesized_slug(&raw.id)
        } else {
            s
        }
    };

    NormalizedSeries {
        external_id: raw.id.clone(),
        slug,
        title,
        alt_titles: alt_titles(raw),
        description: pick_localized(&raw.attributes.description),
        status: raw
            .attributes
            .status
            .as_deref()
            .map(SeriesStatus::from_str_loose)
            .unwrap_or_default(),
        year: raw.attributes.year,
        genres: merge_genres(raw),
        authors: credits(raw, "author"),
        artists: credits(raw, "artist"),
        cover_candidates: cover_candidates(raw),
        updated_at: raw.attributes.updated_at,
        raw: serde_json::to_value(raw).unwrap_or_default(),
    }
}

/// Pick the best localized value: preferred languages in order, then any.
fn pick_localized(map: &std::collections::BTreeMap<String, String>) -> Option<String> {
    for lang in LANG_PREFERENCE {
        if let Some(v) = map.get(lang) {
            if !v.is_empty() {
                return Some(v.clone());
            }
        }
    }
    map.values().find(|v| !v.is_empty()).cloned()
}

/// Canonical display title for a raw record.
pub fn preferred_title(raw: &RawSeries) -> String {
    pick_localized(&raw.attributes.title).unwrap_or_else(|| "Untitled".to_string())
}

fn alt_titles(raw: &RawSeries) -> Vec<String> {
    let primary = preferred_title(raw);
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    let maps = raw
        .attributes
        .title
        .values()
        .chain(raw.attributes.alt_titles.iter().flat_map(|m| m.values()));
    for t in maps {
        if t.is_empty() || *t == primary {
            continue;
        }
        if seen.insert(t.clone()) {
            out.push(t.clone());
        }
    }
    out
}

/// Genre and theme tags merged into one deduplicated, sorted list.
pub fn merge_genres(raw: &RawSeries) -> Vec<String> {
    let mut genres = BTreeSet::new();
    for tag in &raw.attributes.tags {
        if tag.attributes.group != "genre" && tag.attributes.group != "theme" {
            continue;
        }
        if let Some(name) = pick_localized(&tag.attributes.name) {
            genres.insert(name);
        }
    }
    genres.into_iter().collect()
}

/// Names of related people with the given role, in relationship order,
/// deduplicated.
fn credits(raw: &RawSeries, role: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for rel in raw.relationships.iter().filter(|r| r.kind == role) {
        let Some(name) = rel.attributes.as_ref().and_then(|a| a.name.clone()) else {
            continue;
        };
        if seen.insert(name.clone()) {
            out.push(name);
        }
    }
    out
}

fn locale_rank(rel: &RawRelationship) -> usize {
    let locale = rel
        .attributes
        .as_ref()
        .and_then(|a| a.locale.as_deref())
        .unwrap_or("");
    LANG_PREFERENCE
        .iter()
        .position(|l| *l == locale)
        .unwrap_or(LANG_PREFERENCE.len())
}

/// Cover art URLs to try, in order: the upstream-flagged primary volume
/// first, then by locale preference.
pub fn cover_candidates(raw: &RawSeries) -> Vec<String> {
    let mut arts: Vec<&RawRelationship> = raw
        .relationships
        .iter()
        .filter(|r| {
            r.kind == "cover_art"
                && r.attributes
                    .as_ref()
                    .is_some_and(|a| a.file_name.is_some())
        })
        .collect();
    arts.sort_by_key(|r| {
        let main = r.attributes.as_ref().and_then(|a| a.main).unwrap_or(false);
        (!main, locale_rank(r))
    });

    arts.iter()
        .filter_map(|r| r.attributes.as_ref().and_then(|a| a.file_name.as_deref()))
        .map(|file| format!("{COVER_BASE_URL}/{}/{file}", raw.id))
        .collect()
}
