use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Gave up after {attempts} attempts against the upstream API")]
    RetriesExhausted { attempts: u32 },

    #[error("Upstream returned status {status} for {url}")]
    Status { status: u16, url: String },

    #[error("API error: {0}")]
    Api(String),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("All cover candidates failed; last tried {last_url} (status {last_status})")]
    CoverExhausted { last_url: String, last_status: u16 },

    #[error("Cover store I/O error: {0}")]
    Io(#[from] std::io::Error),
}
