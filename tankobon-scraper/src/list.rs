//! List-page fetchers for the upstream collection endpoints.

use chrono::{DateTime, Utc};

use crate::client::CatalogClient;
use crate::error::ScrapeError;
use crate::types::{Paged, RawChapter, RawSeries, RawSeriesStub};

pub const COVER_BASE_URL: &str = "https://uploads.mangadex.org/covers";

const INCLUDES: [&str; 3] = ["author", "artist", "cover_art"];

/// Upstream time-filter format. Seconds precision, no offset suffix.
const SINCE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

fn include_params() -> Vec<(&'static str, String)> {
    INCLUDES
        .iter()
        .map(|i| ("includes[]", i.to_string()))
        .collect()
}

/// One page of the full collection, ordered by id for a stable walk.
pub async fn series_page(
    client: &CatalogClient,
    limit: i64,
    offset: i64,
) -> Result<Paged<RawSeries>, ScrapeError> {
    let mut query = vec![
        ("limit", limit.to_string()),
        ("offset", offset.to_string()),
        ("order[id]", "asc".to_string()),
    ];
    query.extend(include_params());
    let body = client.get_json("/manga", &query).await?;
    Ok(serde_json::from_value(body)?)
}

/// One page of series updated at or after `since`, ordered by update time.
pub async fn series_page_since(
    client: &CatalogClient,
    limit: i64,
    since: DateTime<Utc>,
) -> Result<Paged<RawSeries>, ScrapeError> {
    let mut query = vec![
        ("limit", limit.to_string()),
        ("offset", "0".to_string()),
        ("updatedAtSince", since.format(SINCE_FORMAT).to_string()),
        ("order[updatedAt]", "asc".to_string()),
    ];
    query.extend(include_params());
    let body = client.get_json("/manga", &query).await?;
    Ok(serde_json::from_value(body)?)
}

/// Ids-only listing. Cheap way to learn the current collection total.
pub async fn series_ids_page(
    client: &CatalogClient,
    limit: i64,
) -> Result<Paged<RawSeriesStub>, ScrapeError> {
    let query = vec![
        ("limit", limit.to_string()),
        ("offset", "0".to_string()),
        ("order[id]", "asc".to_string()),
    ];
    let body = client.get_json("/manga", &query).await?;
    Ok(serde_json::from_value(body)?)
}

/// One page of the chapter activity feed since `since`, oldest first.
pub async fn chapter_page_since(
    client: &CatalogClient,
    limit: i64,
    since: DateTime<Utc>,
) -> Result<Paged<RawChapter>, ScrapeError> {
    let query = vec![
        ("limit", limit.to_string()),
        ("offset", "0".to_string()),
        ("updatedAtSince", since.format(SINCE_FORMAT).to_string()),
        ("order[updatedAt]", "asc".to_string()),
        ("includes[]", "manga".to_string()),
    ];
    let body = client.get_json("/chapter", &query).await?;
    Ok(serde_json::from_value(body)?)
}

/// Fetch a single series by its external id, with relationships expanded.
pub async fn series_by_id(
    client: &CatalogClient,
    external_id: &str,
) -> Result<RawSeries, ScrapeError> {
    let query = include_params();
    let body = client
        .get_json(&format!("/manga/{external_id}"), &query)
        .await?;
    Ok(serde_json::from_value(body["data"].clone())?)
}
