//! Violation ledger: breach detection, retention pruning, snapshots

use crate::limiter_core::quota::QuotaSet;
use crate::limiter_core::types::{ChangesetDelta, EditCategory};
use crate::limiter_core::window::AccountWindow;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;

/// How long a recorded violation stays in the ledger
pub const RETENTION_HOURS: i64 = 24;

/// One flagged changeset with the reasons it breached
#[derive(Debug, Clone, Serialize)]
pub struct Violation {
    #[serde(rename = "id")]
    pub changeset_id: i64,
    pub timestamp: DateTime<Utc>,
    pub reasons: Vec<String>,
}

/// All flagged changesets of one account
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationGroup {
    pub account_id: i64,
    pub username: String,
    pub changesets: Vec<Violation>,
}

pub struct ViolationLedger {
    groups: HashMap<i64, ViolationGroup>,
}

impl ViolationLedger {
    pub fn new() -> Self {
        Self {
            groups: HashMap::new(),
        }
    }

    /// Compare a freshly updated window against its quota and record
    /// a violation when any ceiling is breached
    ///
    /// Returns true when a violation was appended.
    pub fn record_if_breached(
        &mut self,
        delta: &ChangesetDelta,
        window: &AccountWindow,
        quota: &QuotaSet,
    ) -> bool {
        let mut reasons = Vec::new();

        if window.changeset_count > quota.changeset_limit {
            reasons.push(format!(
                "Made {} changesets in 24 hours, limit is {}.",
                window.changeset_count, quota.changeset_limit
            ));
        }
        for category in EditCategory::all() {
            let count = window.counts.get(category);
            let limit = quota.limit(category);
            if count > limit {
                reasons.push(format!(
                    "{} {} {} in 24 hours, limit is {}.",
                    category.verb(),
                    count,
                    category.noun(),
                    limit
                ));
            }
        }

        if reasons.is_empty() {
            return false;
        }

        let group = self.groups.entry(delta.account_id).or_insert_with(|| {
            log::info!(
                "Flagged https://www.openstreetmap.org/changeset/{} {}",
                delta.changeset_id,
                reasons.join(" - ")
            );
            ViolationGroup {
                account_id: delta.account_id,
                username: delta.username.clone(),
                changesets: Vec::new(),
            }
        });
        group.changesets.push(Violation {
            changeset_id: delta.changeset_id,
            timestamp: delta.timestamp,
            reasons,
        });
        true
    }

    /// Drop violations older than `now - retention`, then empty groups
    pub fn prune(&mut self, retention: Duration, now: DateTime<Utc>) {
        let cutoff = now - retention;
        for group in self.groups.values_mut() {
            group.changesets.retain(|v| v.timestamp >= cutoff);
        }
        self.groups.retain(|_, group| !group.changesets.is_empty());
    }

    /// Publishable view of the ledger, ordered by account id
    pub fn snapshot(&self) -> Vec<ViolationGroup> {
        let mut groups: Vec<ViolationGroup> = self.groups.values().cloned().collect();
        groups.sort_by_key(|g| g.account_id);
        groups
    }

    pub fn flagged_accounts(&self) -> usize {
        self.groups.len()
    }
}

impl Default for ViolationLedger {
    fn default() -> Self {
        Self::new()
    }
}
