//! Quota policy: dynamic per-account ceilings
//!
//! A pure derivation from the account profile and an evaluation
//! timestamp. Long-lived, high-activity accounts get unbounded ceilings
//! (trusted tier); everyone else gets the category base limits scaled
//! by an age/lifetime ratio.

use crate::limiter_core::accounts::AccountProfile;
use crate::limiter_core::types::EditCategory;
use chrono::{DateTime, Duration, Utc};

/// Fixed per-24h changeset-count ceiling for non-trusted accounts
pub const BASE_CHANGESET_LIMIT: u64 = 100;

/// One evaluated set of ceilings (9 categories + changeset count)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaSet {
    pub changeset_limit: u64,
    category_limits: [u64; 9],
}

impl QuotaSet {
    pub fn limit(&self, category: EditCategory) -> u64 {
        self.category_limits[category.index()]
    }

    fn unbounded() -> Self {
        Self {
            changeset_limit: u64::MAX,
            category_limits: [u64::MAX; 9],
        }
    }

    /// Compute the ceilings for a profile at an evaluation timestamp
    ///
    /// Trusted tier: more than 1000 lifetime changesets AND an account
    /// age above 90 days lifts every ceiling. Otherwise a multiplicative
    /// ratio starts at 1.0 and the highest matching bracket of each
    /// dimension is added:
    ///
    /// - age: >365d +4.0, >30d +1.0, >7d +0.5
    /// - lifetime changesets: >500 +1.0, >100 +0.5, >50 +0.3
    pub fn compute(profile: &AccountProfile, at: DateTime<Utc>) -> QuotaSet {
        let age = at - profile.created_at;

        if profile.lifetime_changesets > 1000 && age > Duration::days(90) {
            return QuotaSet::unbounded();
        }

        let mut ratio = 1.0;

        if age > Duration::days(365) {
            ratio += 4.0;
        } else if age > Duration::days(30) {
            ratio += 1.0;
        } else if age > Duration::days(7) {
            ratio += 0.5;
        }

        if profile.lifetime_changesets > 500 {
            ratio += 1.0;
        } else if profile.lifetime_changesets > 100 {
            ratio += 0.5;
        } else if profile.lifetime_changesets > 50 {
            ratio += 0.3;
        }

        let mut category_limits = [0u64; 9];
        for category in EditCategory::all() {
            category_limits[category.index()] = (category.base_limit() as f64 * ratio) as u64;
        }

        QuotaSet {
            changeset_limit: BASE_CHANGESET_LIMIT,
            category_limits,
        }
    }
}
