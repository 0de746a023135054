//! Cover re-hosting: download upstream cover art and store it behind a
//! stable public URL.

use std::path::PathBuf;

use crate::client::CatalogClient;
use crate::error::ScrapeError;

/// Object-store seam for cached cover bytes.
pub trait CoverStore {
    /// Store bytes under a key, returning the public URL they are served at.
    fn put(&self, key: &str, bytes: &[u8]) -> Result<String, ScrapeError>;
}

/// Filesystem-backed store serving files from a public base URL.
pub struct FsCoverStore {
    root: PathBuf,
    public_base: String,
}

impl FsCoverStore {
    pub fn new(root: impl Into<PathBuf>, public_base: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base: public_base.into(),
        }
    }
}

impl CoverStore for FsCoverStore {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<String, ScrapeError> {
        let path = self.root.join(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, bytes)?;
        Ok(format!("{}/{key}", self.public_base.trim_end_matches('/')))
    }
}

/// A successfully cached cover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedCover {
    pub url: String,
    /// Index into the candidate list of the URL that worked.
    pub candidate_index: usize,
}

/// File extension from a URL path, defaulting to jpg.
pub fn extension_for(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    match path.rsplit('.').next() {
        Some(ext)
            if !ext.contains('/')
                && !ext.is_empty()
                && ext.len() <= 4
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            ext
        }
        _ => "jpg",
    }
}

/// Download the first working cover candidate and store it under
/// `{slug}/cover.{ext}`.
///
/// Candidates are tried in order; a candidate that fails with a non-success
/// status is logged and the next one runs. When every candidate fails the
/// error names the last URL and status, and nothing is written.
pub async fn cache_cover(
    store: &(dyn CoverStore + Sync),
    client: &CatalogClient,
    slug: &str,
    candidates: &[String],
) -> Result<CachedCover, ScrapeError> {
    let mut last_url = String::new();
    let mut last_status = 0u16;

    for (index, url) in candidates.iter().enumerate() {
        match client.download_cover(url).await {
            Ok(bytes) => {
                let key = format!("{slug}/cover.{}", extension_for(url));
                let public_url = store.put(&key, &bytes)?;
                return Ok(CachedCover {
                    url: public_url,
                    candidate_index: index,
                });
            }
            Err(ScrapeError::Status { status, url }) => {
                log::debug!("cover candidate {index} for {slug} failed with {status}: {url}");
                last_url = url;
                last_status = status;
            }
            Err(other) => return Err(other),
        }
    }

    Err(ScrapeError::CoverExhausted {
        last_url,
        last_status,
    })
}
