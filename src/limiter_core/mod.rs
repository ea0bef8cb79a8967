//! Limiter Core - Rate-Limit Engine
//!
//! Pipeline that consumes the append-only replication stream of
//! map-editing activity and flags accounts exceeding their dynamic
//! per-24h quotas.
//!
//! # Architecture
//!
//! ```text
//! ReplicationFeed (state.txt + positions, coarse then fine)
//!     ↓
//! BatchCache (download + disk cache, infinite retry)
//!     ↓
//! extract_deltas (osc XML → per-changeset deltas)
//!     ↓
//! WindowTracker (rolling 24h per-account counters)
//!     ↓
//! QuotaSet (per-account dynamic ceilings)
//!     ↓
//! ViolationLedger (reasons, retention, snapshot)
//!     ↓
//! PublishSink → HTTP blob or JSON file backend
//! ```
//!
//! The StreamDriver runs all of the above as a single logical task; the
//! AccountDirectory feeds the quota computation with profiles fetched
//! once per batch.

pub mod accounts;
pub mod driver;
pub mod extract;
pub mod fetch;
pub mod ledger;
pub mod publish;
pub mod quota;
pub mod replication;
pub mod types;
pub mod window;

pub use accounts::{AccountDirectory, AccountProfile};
pub use driver::StreamDriver;
pub use extract::{extract_deltas, ExtractError};
pub use fetch::BatchCache;
pub use ledger::{Violation, ViolationGroup, ViolationLedger};
pub use publish::{HttpBlobPublisher, JsonFilePublisher, PublishSink};
pub use quota::QuotaSet;
pub use replication::{ReplicationFeed, ReplicationGranularity, ReplicationPosition};
pub use types::{ChangesetDelta, EditCategory, EditCounts};
pub use window::{AccountWindow, WindowTracker};
