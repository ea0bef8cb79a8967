//! Integration tests for the rate-limit pipeline
//!
//! Exercises the full batch path without a network: a gzipped batch is
//! seeded into the local cache, materialized through the BatchCache,
//! extracted, folded into account windows, evaluated against quotas and
//! published through the file sink.

use changeset_limiter::limiter_core::accounts::AccountProfile;
use changeset_limiter::limiter_core::extract::extract_deltas;
use changeset_limiter::limiter_core::fetch::{replication_file_path, BatchCache};
use changeset_limiter::limiter_core::ledger::ViolationLedger;
use changeset_limiter::limiter_core::publish::{JsonFilePublisher, PublishSink};
use changeset_limiter::limiter_core::quota::QuotaSet;
use changeset_limiter::limiter_core::replication::{ReplicationGranularity, ReplicationPosition};
use changeset_limiter::limiter_core::types::EditCategory;
use changeset_limiter::limiter_core::window::WindowTracker;
use chrono::{Duration, TimeZone, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn flood_batch_xml(changeset: i64, uid: i64, ways: usize) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?><osmChange version="0.6" generator="test"><create>"#,
    );
    for i in 0..ways {
        xml.push_str(&format!(
            r#"<way id="{}" changeset="{}" uid="{}" user="mass_editor" timestamp="2025-08-30T09:00:00Z"><nd ref="1"/></way>"#,
            i, changeset, uid
        ));
    }
    xml.push_str("</create></osmChange>");
    xml
}

#[tokio::test]
async fn test_batch_from_cache_to_published_snapshot() {
    let temp_dir = tempfile::tempdir().unwrap();

    // Seed the local cache with one fine-granularity batch
    let sequence = 6_543_210;
    let cache_path = temp_dir
        .path()
        .join("minute")
        .join(replication_file_path(sequence));
    std::fs::create_dir_all(cache_path.parent().unwrap()).unwrap();
    // 800 created ways: over the base 700 limit for a new account
    std::fs::write(&cache_path, gzip(flood_batch_xml(500, 42, 800).as_bytes())).unwrap();

    let end_time = Utc.with_ymd_and_hms(2025, 8, 30, 9, 1, 0).unwrap();
    let position = ReplicationPosition {
        granularity: ReplicationGranularity::Fine,
        sequence,
        start_time: end_time - Duration::seconds(60),
        end_time,
    };

    // Unroutable base URL proves the fetch is served from the cache
    let cache = BatchCache::new(temp_dir.path().to_path_buf());
    let xml = cache.fetch_batch(&position, "http://127.0.0.1:1/minute").await;

    let deltas = extract_deltas(&xml).unwrap();
    assert_eq!(deltas.len(), 1);
    assert_eq!(deltas[0].counts.get(EditCategory::CreatedWays), 800);

    let mut tracker = WindowTracker::new();
    let mut ledger = ViolationLedger::new();
    for delta in &deltas {
        let profile = AccountProfile {
            account_id: delta.account_id,
            lifetime_changesets: 3,
            created_at: delta.timestamp - Duration::days(2),
            fetched_at: delta.timestamp,
        };
        let quota = QuotaSet::compute(&profile, delta.timestamp);
        let window = tracker.update(delta);
        ledger.record_if_breached(delta, window, &quota);
    }

    let snapshot = ledger.snapshot();
    assert_eq!(snapshot.len(), 1);

    let publish_path = temp_dir.path().join("rate_limit.json");
    let publisher = JsonFilePublisher::new(publish_path.clone());
    publisher.publish(&snapshot).await.unwrap();

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&publish_path).unwrap()).unwrap();
    assert_eq!(json[0]["accountId"], 42);
    assert_eq!(json[0]["username"], "mass_editor");
    assert_eq!(
        json[0]["changesets"][0]["reasons"][0],
        "Created 800 ways in 24 hours, limit is 700."
    );
}

#[tokio::test]
async fn test_replayed_batch_does_not_double_flag_changesets() {
    // The same batch observed twice (coarse stream, then its fine
    // replacement at the handover): the changeset count stays at one
    let xml = flood_batch_xml(500, 42, 10);
    let deltas_first = extract_deltas(xml.as_bytes()).unwrap();
    let deltas_second = extract_deltas(xml.as_bytes()).unwrap();

    let mut tracker = WindowTracker::new();
    for delta in deltas_first.iter().chain(deltas_second.iter()) {
        tracker.update(delta);
    }

    // A probe delta for the same account exposes the window state
    let probe = changeset_limiter::limiter_core::types::ChangesetDelta {
        changeset_id: 501,
        account_id: 42,
        username: "mass_editor".to_string(),
        timestamp: Utc.with_ymd_and_hms(2025, 8, 30, 9, 2, 0).unwrap(),
        counts: changeset_limiter::limiter_core::types::EditCounts::new(),
    };
    let window = tracker.update(&probe);
    assert_eq!(window.changeset_count, 2); // changeset 500 once + the probe
    // Category counters accumulate on replay: documented handover skew
    assert_eq!(window.counts.get(EditCategory::CreatedWays), 20);
}

#[tokio::test]
async fn test_pruned_ledger_publishes_shrunken_snapshot() {
    let temp_dir = tempfile::tempdir().unwrap();

    let mut tracker = WindowTracker::new();
    let mut ledger = ViolationLedger::new();

    let now = Utc.with_ymd_and_hms(2025, 8, 30, 12, 0, 0).unwrap();
    for (changeset, offset_hours) in [(1i64, 30i64), (2, 1)] {
        let xml = flood_batch_xml(changeset, changeset * 10, 800);
        let mut deltas = extract_deltas(xml.as_bytes()).unwrap();
        deltas[0].timestamp = now - Duration::hours(offset_hours);

        let delta = &deltas[0];
        let profile = AccountProfile::unknown(delta.account_id);
        let quota = QuotaSet::compute(&profile, delta.timestamp);
        let window = tracker.update(delta);
        assert!(ledger.record_if_breached(delta, window, &quota));
    }
    assert_eq!(ledger.flagged_accounts(), 2);

    ledger.prune(Duration::hours(24), now);
    let snapshot = ledger.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].account_id, 20);

    let publish_path = temp_dir.path().join("rate_limit.json");
    let publisher = JsonFilePublisher::new(publish_path.clone());
    publisher.publish(&snapshot).await.unwrap();

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&publish_path).unwrap()).unwrap();
    assert_eq!(json.as_array().unwrap().len(), 1);
}
