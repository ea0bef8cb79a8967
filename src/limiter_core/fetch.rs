//! Batch download with local disk cache and infinite retry
//!
//! This is the single centralized retry point of the pipeline: a fetch
//! never returns without success and never lets a failure escape. After
//! the first failure the local cache is bypassed on every retry, so a
//! corrupt cached or mirrored file cannot wedge the stream.

use crate::limiter_core::replication::ReplicationPosition;
use flate2::read::GzDecoder;
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::sleep;

const RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub enum FetchError {
    Http(reqwest::Error),
    Io(std::io::Error),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Http(err)
    }
}

impl From<std::io::Error> for FetchError {
    fn from(err: std::io::Error) -> Self {
        FetchError::Io(err)
    }
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::Http(e) => write!(f, "download failed: {}", e),
            FetchError::Io(e) => write!(f, "cache/decompress failed: {}", e),
        }
    }
}

impl std::error::Error for FetchError {}

/// Relative path for a batch file: 9-digit zero-padded sequence split
/// into three directory segments, e.g. 107442 -> `000/107/442.osc.gz`
///
/// Sequences wider than 9 digits keep their last 9.
pub fn replication_file_path(sequence: u64) -> String {
    let padded = format!("{:09}", sequence);
    let tail = &padded[padded.len() - 9..];
    format!(
        "{}/{}/{}.osc.gz",
        &tail[0..3],
        &tail[3..6],
        &tail[6..9]
    )
}

/// Fetches batch files, mirroring them under a granularity-scoped
/// directory tree before decompressing
pub struct BatchCache {
    client: reqwest::Client,
    cache_root: PathBuf,
}

impl BatchCache {
    pub fn new(cache_root: PathBuf) -> Self {
        Self {
            client: reqwest::Client::new(),
            cache_root,
        }
    }

    /// Materialize one batch as decompressed XML bytes
    ///
    /// Retries indefinitely; each failure is logged and flips the
    /// cache-bypass flag for the remaining attempts.
    pub async fn fetch_batch(&self, position: &ReplicationPosition, base_url: &str) -> Vec<u8> {
        let mut bypass_cache = false;
        loop {
            match self.try_fetch(position, base_url, bypass_cache).await {
                Ok(xml) => return xml,
                Err(e) => {
                    log::warn!(
                        "Failed to download/decompress batch {} ({}): {}",
                        position.sequence,
                        position.granularity.as_str(),
                        e
                    );
                    bypass_cache = true;
                    sleep(RETRY_DELAY).await;
                }
            }
        }
    }

    async fn try_fetch(
        &self,
        position: &ReplicationPosition,
        base_url: &str,
        bypass_cache: bool,
    ) -> Result<Vec<u8>, FetchError> {
        let relative = replication_file_path(position.sequence);
        let cache_path = self
            .cache_root
            .join(position.granularity.as_str())
            .join(&relative);

        if bypass_cache || !cache_path.exists() {
            let url = format!("{}/{}", base_url.trim_end_matches('/'), relative);
            let body = self
                .client
                .get(&url)
                .send()
                .await?
                .error_for_status()?
                .bytes()
                .await?;
            if let Some(parent) = cache_path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&cache_path, &body).await?;
        }

        let compressed = tokio::fs::read(&cache_path).await?;
        let mut decoder = GzDecoder::new(&compressed[..]);
        let mut xml = Vec::new();
        decoder.read_to_end(&mut xml)?;
        Ok(xml)
    }
}
