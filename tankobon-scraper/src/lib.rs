//! Upstream catalog API client: paged listing, retrying HTTP transport,
//! normalization, and cover re-hosting.

pub mod client;
pub mod covers;
pub mod error;
pub mod list;
pub mod normalize;
pub mod types;

pub use client::{CatalogClient, DEFAULT_BASE_URL};
pub use covers::{CachedCover, CoverStore, FsCoverStore, cache_cover};
pub use error::ScrapeError;
pub use normalize::{NormalizedSeries, normalize_series};
