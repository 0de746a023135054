//! Wire types for the upstream catalog API.
//!
//! Shapes mirror the upstream JSON closely; normalization into catalog
//! types happens in [`crate::normalize`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single page of an upstream collection response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paged<T> {
    pub data: Vec<T>,
    pub limit: i64,
    pub offset: i64,
    pub total: i64,
}

/// A full series record as returned by the upstream API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSeries {
    pub id: String,
    pub attributes: RawSeriesAttributes,
    #[serde(default)]
    pub relationships: Vec<RawRelationship>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSeriesAttributes {
    /// Localized title map, language code to title.
    #[serde(default)]
    pub title: BTreeMap<String, String>,
    #[serde(default, rename = "altTitles")]
    pub alt_titles: Vec<BTreeMap<String, String>>,
    #[serde(default)]
    pub description: BTreeMap<String, String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub tags: Vec<RawTag>,
    #[serde(rename = "updatedAt")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTag {
    pub id: String,
    pub attributes: RawTagAttributes,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTagAttributes {
    #[serde(default)]
    pub name: BTreeMap<String, String>,
    /// Tag grouping: "genre", "theme", "format", "content".
    #[serde(default)]
    pub group: String,
}

/// Expanded relationship entry (author, artist, cover_art).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRelationship {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub attributes: Option<RawRelationshipAttributes>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawRelationshipAttributes {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "fileName")]
    pub file_name: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub main: Option<bool>,
}

/// Ids-only series listing, used to refresh the collection total cheaply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSeriesStub {
    pub id: String,
}

/// A chapter record from the activity feed. Only the fields the sync
/// pipeline needs: the update timestamp and the parent series pointer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawChapter {
    pub id: String,
    pub attributes: RawChapterAttributes,
    #[serde(default)]
    pub relationships: Vec<RawRelationship>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawChapterAttributes {
    #[serde(rename = "updatedAt")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl RawChapter {
    /// External id of the parent series, or None for orphan chapters.
    pub fn series_id(&self) -> Option<&str> {
        self.relationships
            .iter()
            .find(|r| r.kind == "manga")
            .map(|r| r.id.as_str())
    }
}
