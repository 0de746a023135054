//! HTTP client for the upstream catalog API with retry and backoff.

use tokio::time::Duration;

use crate::error::ScrapeError;

pub const DEFAULT_BASE_URL: &str = "https://api.mangadex.org";

const USER_AGENT: &str = concat!("tankobon-sync/", env!("CARGO_PKG_VERSION"));
const MAX_ATTEMPTS: u32 = 8;
const BASE_DELAY_MS: u64 = 500;
const MAX_DELAY_MS: u64 = 15_000;
const JITTER_MS: u64 = 200;

/// HTTP client for the upstream catalog API. Retries rate-limit responses
/// and transient server errors with capped exponential backoff.
pub struct CatalogClient {
    http: reqwest::Client,
    base_url: String,
}

impl CatalogClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ScrapeError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET a JSON endpoint, retrying on 429 and 5xx responses.
    ///
    /// Honors the `retry-after` header when present; otherwise sleeps a
    /// capped exponential backoff with a small random jitter. Other 4xx
    /// responses fail immediately.
    pub async fn get_json(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<serde_json::Value, ScrapeError> {
        let url = format!("{}{}", self.base_url, path);

        for attempt in 1..=MAX_ATTEMPTS {
            let resp = self.http.get(&url).query(query).send().await?;
            let status = resp.status();

            if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                let retry_after = resp
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok());
                let Some(delay) = retry_delay(attempt, retry_after) else {
                    break;
                };
                log::warn!(
                    "{} from {} (attempt {attempt}/{MAX_ATTEMPTS}), retrying in {delay:?}",
                    status.as_u16(),
                    url
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            if !status.is_success() {
                return Err(ScrapeError::Status {
                    status: status.as_u16(),
                    url,
                });
            }

            let body: serde_json::Value = resp.json().await?;

            // Some rate-limit responses come back as 200 with an error body.
            if body.get("result").and_then(|r| r.as_str()) == Some("error") {
                let detail = body["errors"].to_string();
                if detail.to_lowercase().contains("rate limit") {
                    let Some(delay) = retry_delay(attempt, None) else {
                        break;
                    };
                    log::warn!(
                        "rate-limited body from {url} (attempt {attempt}/{MAX_ATTEMPTS}), retrying in {delay:?}"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                return Err(ScrapeError::Api(detail));
            }

            return Ok(body);
        }

        Err(ScrapeError::RetriesExhausted {
            attempts: MAX_ATTEMPTS,
        })
    }

    /// Download a cover image. No retry: the caller iterates candidates and
    /// a failed candidate is reported via `Status` so the next one can run.
    pub async fn download_cover(&self, url: &str) -> Result<Vec<u8>, ScrapeError> {
        let resp = self.http.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ScrapeError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(resp.bytes().await?.to_vec())
    }
}

/// Delay before the next attempt, or None once the attempt budget is spent.
fn retry_delay(attempt: u32, retry_after: Option<u64>) -> Option<Duration> {
    (attempt < MAX_ATTEMPTS).then(|| backoff_delay(attempt, retry_after))
}

/// Backoff for a retryable response. `retry_after` (seconds, from the
/// response header) wins over the exponential schedule when present.
pub fn backoff_delay(attempt: u32, retry_after: Option<u64>) -> Duration {
    let base_ms = match retry_after {
        Some(secs) => secs * 1000,
        None => (BASE_DELAY_MS << (attempt.saturating_sub(1)).min(10)).min(MAX_DELAY_MS),
    };
    Duration::from_millis(base_ms + fastrand::u64(0..=JITTER_MS))
}
