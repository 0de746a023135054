use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Database error: {0}")]
    Db(#[from] tankobon_db::OperationError),

    #[error("Upstream fetch error: {0}")]
    Scrape(#[from] tankobon_scraper::ScrapeError),

    #[error("Crawl state '{id}' has not been provisioned")]
    StateNotProvisioned { id: String },

    #[error("Unknown feed '{id}' (expected 'series' or 'chapters')")]
    UnknownFeed { id: String },
}
