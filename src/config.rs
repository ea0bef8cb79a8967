//! Runtime configuration from environment variables

use std::env;
use std::path::PathBuf;

/// Publish backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkType {
    File,
    Blob,
}

/// Configuration for the limiter runtime
///
/// Loaded from environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the coarse (hourly) replication stream
    pub coarse_replication_url: String,

    /// Base URL of the fine (minutely) replication stream
    pub fine_replication_url: String,

    /// Root directory for the local batch cache
    pub replication_cache_dir: PathBuf,

    /// Accounts API endpoint for batched profile lookups
    pub accounts_api_url: String,

    /// Path of the persisted account directory
    pub accounts_cache_path: PathBuf,

    /// Which publish backend to use
    pub publish_sink: SinkType,

    /// Pre-signed URL for the blob backend
    pub publish_url: Option<String>,

    /// Output path for the file backend
    pub publish_path: PathBuf,

    /// Delay between publish cycles and after a failed cycle (seconds)
    pub cycle_delay_secs: u64,
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `COARSE_REPLICATION_URL` (default: https://planet.openstreetmap.org/replication/hour)
    /// - `FINE_REPLICATION_URL` (default: https://planet.openstreetmap.org/replication/minute)
    /// - `REPLICATION_CACHE_DIR` (default: ReplicationCache)
    /// - `ACCOUNTS_API_URL` (default: https://www.openstreetmap.org/api/0.6/users)
    /// - `ACCOUNTS_CACHE_PATH` (default: accounts.json)
    /// - `PUBLISH_SINK` (file | blob, default: file)
    /// - `PUBLISH_URL` (required when PUBLISH_SINK=blob)
    /// - `PUBLISH_PATH` (default: rate_limit.json)
    /// - `CYCLE_DELAY_SECS` (default: 60)
    pub fn from_env() -> Self {
        let publish_sink = match env::var("PUBLISH_SINK").as_deref() {
            Ok("blob") => SinkType::Blob,
            _ => SinkType::File,
        };

        Self {
            coarse_replication_url: env::var("COARSE_REPLICATION_URL").unwrap_or_else(|_| {
                "https://planet.openstreetmap.org/replication/hour".to_string()
            }),

            fine_replication_url: env::var("FINE_REPLICATION_URL").unwrap_or_else(|_| {
                "https://planet.openstreetmap.org/replication/minute".to_string()
            }),

            replication_cache_dir: env::var("REPLICATION_CACHE_DIR")
                .unwrap_or_else(|_| "ReplicationCache".to_string())
                .into(),

            accounts_api_url: env::var("ACCOUNTS_API_URL")
                .unwrap_or_else(|_| "https://www.openstreetmap.org/api/0.6/users".to_string()),

            accounts_cache_path: env::var("ACCOUNTS_CACHE_PATH")
                .unwrap_or_else(|_| "accounts.json".to_string())
                .into(),

            publish_sink,

            publish_url: env::var("PUBLISH_URL").ok(),

            publish_path: env::var("PUBLISH_PATH")
                .unwrap_or_else(|_| "rate_limit.json".to_string())
                .into(),

            cycle_delay_secs: env::var("CYCLE_DELAY_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(60),
        }
    }
}
