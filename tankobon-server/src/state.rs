//! Shared application state.

use std::path::PathBuf;
use std::sync::Arc;

use tankobon_scraper::FsCoverStore;
use tankobon_sync::UpstreamFeed;

/// State shared across request handlers. Handlers open their own SQLite
/// connection per request; only the upstream feed client is shared.
#[derive(Clone)]
pub struct AppState {
    pub db_path: Arc<PathBuf>,
    pub feed: Arc<UpstreamFeed<FsCoverStore>>,
    pub admin_secret: Option<String>,
    /// Source name recorded on series and external links.
    pub source_name: String,
}
