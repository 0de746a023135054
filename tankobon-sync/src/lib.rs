//! Crawl engine: per-feed state machine, upsert/diff/audit pipeline, and
//! bounded run driver over an injected upstream source.

pub mod error;
pub mod pipeline;
pub mod run;
pub mod state;

pub use error::SyncError;
pub use pipeline::{Projection, RecordOutcome, diff_projections, process_series};
pub use run::{CursorSnapshot, FeedKind, FeedSource, RunOptions, RunReport, UpstreamFeed, run_feed};
