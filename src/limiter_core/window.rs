//! Per-account rolling activity windows
//!
//! One window per account, created lazily and reset in place when a
//! changeset lands more than 24h past the window anchor. The anchor
//! jumps to the triggering changeset, so the effective window length
//! varies between 24h and the inter-changeset gap. This is a coarse
//! reset, not a true sliding window.

use crate::limiter_core::types::{ChangesetDelta, EditCounts};
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};

/// Window length before the anchor resets
pub const WINDOW_HOURS: i64 = 24;

/// Rolling activity state for one account
#[derive(Debug, Clone)]
pub struct AccountWindow {
    pub account_id: i64,
    pub anchor: DateTime<Utc>,
    pub changeset_count: u64,
    pub counts: EditCounts,
}

impl AccountWindow {
    fn fresh(account_id: i64, anchor: DateTime<Utc>) -> Self {
        Self {
            account_id,
            anchor,
            changeset_count: 0,
            counts: EditCounts::new(),
        }
    }
}

/// Tracks all account windows plus the process-wide changeset dedup set
pub struct WindowTracker {
    windows: HashMap<i64, AccountWindow>,
    seen_changesets: HashSet<i64>,
}

impl WindowTracker {
    pub fn new() -> Self {
        Self {
            windows: HashMap::new(),
            seen_changesets: HashSet::new(),
        }
    }

    /// Fold one changeset delta into its account's window
    ///
    /// Only the changeset count is gated by the process-wide dedup set.
    /// Category deltas accumulate unconditionally: a changeset replayed
    /// across the one-time coarse->fine handover is counted once as a
    /// changeset but its edits are added again (bounded, one-time skew).
    pub fn update(&mut self, delta: &ChangesetDelta) -> &AccountWindow {
        let window = self
            .windows
            .entry(delta.account_id)
            .or_insert_with(|| AccountWindow::fresh(delta.account_id, delta.timestamp));

        if delta.timestamp - window.anchor > Duration::hours(WINDOW_HOURS) {
            *window = AccountWindow::fresh(delta.account_id, delta.timestamp);
        }

        if self.seen_changesets.insert(delta.changeset_id) {
            window.changeset_count += 1;
        }
        window.counts.merge(&delta.counts);
        window
    }

    pub fn tracked_accounts(&self) -> usize {
        self.windows.len()
    }
}

impl Default for WindowTracker {
    fn default() -> Self {
        Self::new()
    }
}
