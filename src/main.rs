
pub mod config;
pub mod limiter_core;

pub use config::Config;
pub use limiter_core::{
    accounts::AccountDirectory,
    driver::StreamDriver,
    extract::extract_deltas,
    fetch::BatchCache,
    ledger::ViolationLedger,
    publish::PublishSink,
    quota::QuotaSet,
    replication::{ReplicationFeed, ReplicationGranularity, ReplicationPosition},
    types::{ChangesetDelta, EditCategory, EditCounts},
    window::WindowTracker,
};
