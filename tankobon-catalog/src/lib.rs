//! Data model for the tankobon catalog.
//!
//! Canonical series records, crawl-state rows, external-id links, the
//! delta audit log, and art-job markers. These types mirror the persistent
//! schema in `tankobon-db` and are the durable contract the sync engine
//! and the audit dashboard both read against.

pub mod slug;
pub mod types;

pub use slug::{slugify, synthesized_slug};
pub use types::{
    ArtJob, CrawlMode, CrawlState, DeltaAction, DeltaLogEntry, ExternalLink, Series, SeriesStatus,
};
