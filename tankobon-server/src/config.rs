//! Server configuration from environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

use tankobon_scraper::DEFAULT_BASE_URL;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid TANKOBON_BIND address: {0}")]
    Bind(#[from] std::net::AddrParseError),
}

#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database path (`TANKOBON_DB`).
    pub db_path: PathBuf,
    /// Shared secret for admin endpoints (`TANKOBON_ADMIN_SECRET`).
    /// Unset disables the admin surface entirely.
    pub admin_secret: Option<String>,
    /// Directory cached covers are written to (`TANKOBON_COVERS_DIR`).
    pub covers_dir: PathBuf,
    /// Public base URL covers are served from (`TANKOBON_COVERS_BASE_URL`).
    pub covers_base_url: String,
    /// Upstream API base URL (`TANKOBON_UPSTREAM_URL`).
    pub upstream_url: String,
    /// Listen address (`TANKOBON_BIND`).
    pub bind: SocketAddr,
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            db_path: PathBuf::from(env_or("TANKOBON_DB", "tankobon.db")),
            admin_secret: std::env::var("TANKOBON_ADMIN_SECRET").ok(),
            covers_dir: PathBuf::from(env_or("TANKOBON_COVERS_DIR", "covers")),
            covers_base_url: env_or(
                "TANKOBON_COVERS_BASE_URL",
                "http://127.0.0.1:8080/covers",
            ),
            upstream_url: env_or("TANKOBON_UPSTREAM_URL", DEFAULT_BASE_URL),
            bind: env_or("TANKOBON_BIND", "127.0.0.1:8080").parse()?,
        })
    }
}
