//! Stream driver: two-phase consumption of the replication streams
//!
//! The driver starts in coarse catch-up one day in the past, drains the
//! hourly stream until it reports no further position, then switches --
//! exactly once, never back -- to the minutely stream resumed from the
//! coarse stream's last end timestamp. In fine streaming, every full
//! drain of the currently available positions triggers one publish
//! cycle (prune + snapshot + publish).
//!
//! Everything after startup runs inside a recovery loop: any failure is
//! logged, the driver waits one cycle delay and resumes from its current
//! position. Only the very first head lookup is allowed to be fatal.

use crate::limiter_core::accounts::AccountDirectory;
use crate::limiter_core::extract::extract_deltas;
use crate::limiter_core::fetch::BatchCache;
use crate::limiter_core::ledger::{ViolationLedger, RETENTION_HOURS};
use crate::limiter_core::publish::PublishSink;
use crate::limiter_core::quota::QuotaSet;
use crate::limiter_core::replication::{
    ReplicationEnumerator, ReplicationFeed, ReplicationGranularity, ReplicationPosition,
};
use crate::limiter_core::types::ChangesetDelta;
use crate::limiter_core::window::WindowTracker;
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::sleep;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    CoarseCatchup,
    FineStreaming,
}

pub struct StreamDriver {
    feed: ReplicationFeed,
    cache: BatchCache,
    accounts: AccountDirectory,
    tracker: WindowTracker,
    ledger: ViolationLedger,
    publisher: Box<dyn PublishSink>,
    cycle_delay: Duration,
    /// Distinct accounts seen since startup, for the flag-rate log line
    seen_accounts: HashSet<i64>,
}

impl StreamDriver {
    pub fn new(
        feed: ReplicationFeed,
        cache: BatchCache,
        accounts: AccountDirectory,
        publisher: Box<dyn PublishSink>,
        cycle_delay_secs: u64,
    ) -> Self {
        Self {
            feed,
            cache,
            accounts,
            tracker: WindowTracker::new(),
            ledger: ViolationLedger::new(),
            publisher,
            cycle_delay: Duration::from_secs(cycle_delay_secs),
            seen_accounts: HashSet::new(),
        }
    }

    /// Run the pipeline indefinitely
    ///
    /// Returns an error only when the initial coarse stream lookup
    /// fails; after that, failures are contained by the recovery loop.
    pub async fn run(mut self) -> Result<(), Box<dyn std::error::Error>> {
        let start = Utc::now() - ChronoDuration::days(1);
        let mut enumerator = self
            .feed
            .enumerator_from(ReplicationGranularity::Coarse, start)
            .await?;
        let mut phase = Phase::CoarseCatchup;
        let mut last_end = start;

        log::info!("🚀 Stream driver starting in coarse catch-up from {}", start);

        loop {
            match self.drain(&mut enumerator, &mut last_end).await {
                Ok(()) => match phase {
                    Phase::CoarseCatchup => {
                        match self
                            .feed
                            .enumerator_from(ReplicationGranularity::Fine, last_end)
                            .await
                        {
                            Ok(fine) => {
                                enumerator = fine;
                                phase = Phase::FineStreaming;
                                log::info!(
                                    "✅ Coarse stream caught up, switching to fine stream from {}",
                                    last_end
                                );
                                // Start draining the fine stream right away
                                continue;
                            }
                            Err(e) => {
                                log::error!("Failed to open fine stream: {}", e);
                            }
                        }
                    }
                    Phase::FineStreaming => {
                        if let Err(e) = self.publish_cycle().await {
                            log::error!("Publish cycle failed: {}", e);
                        }
                    }
                },
                Err(e) => {
                    log::error!("Replication cycle failed: {}", e);
                }
            }

            sleep(self.cycle_delay).await;
        }
    }

    /// Process every currently available position of the stream
    async fn drain(
        &mut self,
        enumerator: &mut ReplicationEnumerator,
        last_end: &mut chrono::DateTime<Utc>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        while let Some(position) = enumerator.move_next(&self.feed).await? {
            self.process_position(&position).await?;
            *last_end = position.end_time;
        }
        Ok(())
    }

    /// Fetch, extract and fold one batch into account state
    async fn process_position(
        &mut self,
        position: &ReplicationPosition,
    ) -> Result<(), Box<dyn std::error::Error>> {
        log::info!(
            "Processing {} batch {} covering {} - {}",
            position.granularity.as_str(),
            position.sequence,
            position.start_time,
            position.end_time
        );

        let xml = self
            .cache
            .fetch_batch(position, self.feed.base_url(position.granularity))
            .await;
        let deltas = extract_deltas(&xml)?;

        let mut account_ids: Vec<i64> = deltas.iter().map(|d| d.account_id).collect();
        account_ids.sort_unstable();
        account_ids.dedup();
        self.accounts.refresh(&account_ids).await?;

        self.apply_deltas(&deltas);
        Ok(())
    }

    /// Fold extracted deltas into windows and evaluate quotas
    fn apply_deltas(&mut self, deltas: &[ChangesetDelta]) {
        for delta in deltas {
            self.seen_accounts.insert(delta.account_id);
            let profile = self.accounts.profile(delta.account_id);
            let quota = QuotaSet::compute(&profile, delta.timestamp);
            let window = self.tracker.update(delta);
            self.ledger.record_if_breached(delta, window, &quota);
        }
    }

    /// Prune the ledger and publish the snapshot
    async fn publish_cycle(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.ledger
            .prune(ChronoDuration::hours(RETENTION_HOURS), Utc::now());
        let snapshot = self.ledger.snapshot();
        self.publisher.publish(&snapshot).await?;

        let flagged = snapshot.len();
        let seen = self.seen_accounts.len();
        let rate = if seen > 0 {
            flagged as f64 / seen as f64
        } else {
            0.0
        };
        log::info!(
            "📊 Published via {}: {} flagged of {} seen accounts (rate {:.4})",
            self.publisher.sink_type(),
            flagged,
            seen,
            rate
        );
        Ok(())
    }
}
