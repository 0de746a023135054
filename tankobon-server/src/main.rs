//! tankobon sync admin server.
//!
//! Hosts the per-feed sync endpoints behind a shared admin secret and
//! serves audit queries over the local catalog database.

use std::sync::Arc;

use tankobon_catalog::types::{CrawlMode, CrawlState};
use tankobon_db as db;
use tankobon_scraper::{CatalogClient, FsCoverStore};
use tankobon_server::{AppState, Config, create_router};
use tankobon_sync::UpstreamFeed;

const SOURCE_NAME: &str = "mangadex";
const DEFAULT_PAGE_LIMIT: i64 = 100;

#[tokio::main]
async fn main() {
    env_logger::init();
    if let Err(err) = run().await {
        log::error!("fatal: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;

    // Creates the schema on first launch and provisions the two feeds.
    {
        let conn = db::open_database(&config.db_path)?;
        provision_feeds(&conn)?;
    }
    if config.admin_secret.is_none() {
        log::warn!("TANKOBON_ADMIN_SECRET not set; admin endpoints are disabled");
    }

    let client = CatalogClient::new(config.upstream_url.clone())?;
    let store = FsCoverStore::new(&config.covers_dir, &config.covers_base_url);
    let state = AppState {
        db_path: Arc::new(config.db_path.clone()),
        feed: Arc::new(UpstreamFeed::new(client, store)),
        admin_secret: config.admin_secret.clone(),
        source_name: SOURCE_NAME.to_string(),
    };

    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    log::info!("listening on {}", config.bind);
    axum::serve(listener, app).await?;
    Ok(())
}

/// Insert crawl-state rows for the two feeds if they don't exist yet.
fn provision_feeds(conn: &rusqlite::Connection) -> Result<(), db::OperationError> {
    if db::get_crawl_state(conn, "series")?.is_none() {
        db::insert_crawl_state(conn, &CrawlState::new("series", DEFAULT_PAGE_LIMIT))?;
        log::info!("provisioned crawl state 'series'");
    }
    if db::get_crawl_state(conn, "chapters")?.is_none() {
        let mut state = CrawlState::new("chapters", DEFAULT_PAGE_LIMIT);
        state.mode = CrawlMode::UpdatedAt;
        db::insert_crawl_state(conn, &state)?;
        log::info!("provisioned crawl state 'chapters'");
    }
    Ok(())
}
