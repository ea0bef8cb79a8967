//! Limiter Runtime - unattended monitoring daemon
//!
//! Consumes the replication feed, maintains per-account rolling
//! activity windows, and publishes the flagged-account snapshot after
//! every fine-stream drain.
//!
//! Usage:
//!   cargo run --release --bin limiter_runtime
//!
//! Environment variables:
//!   COARSE_REPLICATION_URL - hourly stream base URL
//!   FINE_REPLICATION_URL   - minutely stream base URL
//!   REPLICATION_CACHE_DIR  - local batch cache root (default: ReplicationCache)
//!   ACCOUNTS_API_URL       - accounts API endpoint
//!   ACCOUNTS_CACHE_PATH    - persisted account directory (default: accounts.json)
//!   PUBLISH_SINK           - file | blob (default: file)
//!   PUBLISH_URL            - pre-signed blob URL (required for blob)
//!   PUBLISH_PATH           - output path for the file sink (default: rate_limit.json)
//!   CYCLE_DELAY_SECS       - delay between cycles (default: 60)
//!   RUST_LOG               - logging level (optional, default: info)

use changeset_limiter::config::{Config, SinkType};
use changeset_limiter::limiter_core::{
    AccountDirectory, BatchCache, HttpBlobPublisher, JsonFilePublisher, PublishSink,
    ReplicationFeed, StreamDriver,
};
use dotenv::dotenv;
use log::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("🚀 Changeset Limiter Runtime");

    let config = Config::from_env();

    let publisher: Box<dyn PublishSink> = match config.publish_sink {
        SinkType::Blob => {
            let url = config
                .publish_url
                .clone()
                .ok_or("PUBLISH_SINK=blob requires PUBLISH_URL")?;
            Box::new(HttpBlobPublisher::new(url))
        }
        SinkType::File => Box::new(JsonFilePublisher::new(config.publish_path.clone())),
    };

    info!("   ├─ Coarse stream: {}", config.coarse_replication_url);
    info!("   ├─ Fine stream: {}", config.fine_replication_url);
    info!("   ├─ Batch cache: {}", config.replication_cache_dir.display());
    info!("   ├─ Accounts API: {}", config.accounts_api_url);
    info!("   ├─ Publish sink: {}", publisher.sink_type());
    info!("   └─ Cycle delay: {}s", config.cycle_delay_secs);

    let feed = ReplicationFeed::new(
        config.coarse_replication_url.clone(),
        config.fine_replication_url.clone(),
    );
    let cache = BatchCache::new(config.replication_cache_dir.clone());
    let accounts = AccountDirectory::new(
        config.accounts_api_url.clone(),
        config.accounts_cache_path.clone(),
    );

    let driver = StreamDriver::new(feed, cache, accounts, publisher, config.cycle_delay_secs);

    // Only a failed startup lookup can end the process
    driver.run().await
}
