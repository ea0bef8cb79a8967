//! Publish sink backends for the violation snapshot
//!
//! The snapshot is always written whole (overwrite-the-object, no
//! incremental append). Two backends: an HTTP blob PUT for production
//! (pre-signed/SAS URL carries the credentials) and a local JSON file
//! for development and tests.

use crate::limiter_core::ledger::ViolationGroup;
use async_trait::async_trait;
use std::path::PathBuf;

#[derive(Debug)]
pub enum PublishError {
    Io(std::io::Error),
    Serialization(serde_json::Error),
    Http(reqwest::Error),
}

impl From<std::io::Error> for PublishError {
    fn from(err: std::io::Error) -> Self {
        PublishError::Io(err)
    }
}

impl From<serde_json::Error> for PublishError {
    fn from(err: serde_json::Error) -> Self {
        PublishError::Serialization(err)
    }
}

impl From<reqwest::Error> for PublishError {
    fn from(err: reqwest::Error) -> Self {
        PublishError::Http(err)
    }
}

impl std::fmt::Display for PublishError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PublishError::Io(e) => write!(f, "IO error: {}", e),
            PublishError::Serialization(e) => write!(f, "Serialization error: {}", e),
            PublishError::Http(e) => write!(f, "HTTP error: {}", e),
        }
    }
}

impl std::error::Error for PublishError {}

/// Backend trait for publishing the violation snapshot
#[async_trait]
pub trait PublishSink: Send + Sync {
    /// Overwrite the published object with this snapshot
    async fn publish(&self, snapshot: &[ViolationGroup]) -> Result<(), PublishError>;

    /// Backend type for logging
    fn sink_type(&self) -> &'static str;
}

/// Local file backend
pub struct JsonFilePublisher {
    path: PathBuf,
}

impl JsonFilePublisher {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl PublishSink for JsonFilePublisher {
    async fn publish(&self, snapshot: &[ViolationGroup]) -> Result<(), PublishError> {
        let json = serde_json::to_string(snapshot)?;
        tokio::fs::write(&self.path, json).await?;
        log::debug!(
            "Published {} violation groups to {}",
            snapshot.len(),
            self.path.display()
        );
        Ok(())
    }

    fn sink_type(&self) -> &'static str {
        "file"
    }
}

/// HTTP blob backend: whole-object PUT against a pre-signed URL
///
/// The `x-ms-blob-type` header makes the PUT valid against Azure blob
/// SAS URLs; other stores ignore it.
pub struct HttpBlobPublisher {
    client: reqwest::Client,
    url: String,
}

impl HttpBlobPublisher {
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }
}

#[async_trait]
impl PublishSink for HttpBlobPublisher {
    async fn publish(&self, snapshot: &[ViolationGroup]) -> Result<(), PublishError> {
        let json = serde_json::to_string(snapshot)?;
        self.client
            .put(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header("x-ms-blob-type", "BlockBlob")
            .body(json)
            .send()
            .await?
            .error_for_status()?;
        log::debug!("Published {} violation groups to blob storage", snapshot.len());
        Ok(())
    }

    fn sink_type(&self) -> &'static str {
        "blob"
    }
}
