// tests/recovery_tests.rs

mod common;

use chrono::Duration;
use common::{aged, record, seeded_store, FlakyStore};
use credpool::recovery::{PoolStats, RecoveryService};
use credpool::store::KeyStore;
use std::sync::Arc;

fn cooldown_24h() -> Duration {
    Duration::hours(24)
}

#[tokio::test]
async fn rested_inactive_key_is_recovered() {
    // Scenario: A active 0/100, B inactive and 30h old.
    let a = record("gemini", "a", 0, 100, true);
    let b = aged(record("gemini", "b", 75, 100, false), 30);
    let b_id = b.id;
    let store = seeded_store(vec![a, b]).await;
    let recovery = RecoveryService::new(store.clone(), cooldown_24h());

    let report = recovery
        .recover_inactive_keys("gemini")
        .await
        .expect("recovery");
    assert_eq!(report.recovered_keys, 1);
    assert_eq!(report.total_inactive_keys, 1);
    assert!(report.success);
    assert!(report.errors.is_empty());

    let recovered = store.get(b_id).await.expect("get");
    assert!(recovered.is_active);
    assert_eq!(recovered.current_usage, 0);
}

#[tokio::test]
async fn recently_deactivated_keys_are_left_untouched() {
    let resting = aged(record("gemini", "resting", 50, 100, false), 2);
    let id = resting.id;
    let store = seeded_store(vec![resting]).await;
    let recovery = RecoveryService::new(store.clone(), cooldown_24h());

    let report = recovery
        .recover_inactive_keys("gemini")
        .await
        .expect("recovery");
    assert_eq!(report.recovered_keys, 0);
    assert_eq!(report.total_inactive_keys, 0);
    assert!(report.success);

    let untouched = store.get(id).await.expect("get");
    assert!(!untouched.is_active);
    assert_eq!(untouched.current_usage, 50);
}

#[tokio::test]
async fn empty_batch_reports_success() {
    let store = seeded_store(vec![record("gemini", "a", 0, 100, true)]).await;
    let recovery = RecoveryService::new(store, cooldown_24h());

    let report = recovery
        .recover_inactive_keys("gemini")
        .await
        .expect("recovery");
    assert_eq!(report.recovered_keys, 0);
    assert_eq!(report.total_inactive_keys, 0);
    assert!(report.errors.is_empty());
    assert!(report.success);
}

#[tokio::test]
async fn one_failed_key_does_not_abort_the_batch() {
    let k1 = aged(record("gemini", "k1", 90, 100, false), 30);
    let k2 = aged(record("gemini", "k2", 90, 100, false), 30);
    let k1_id = k1.id;
    let k2_id = k2.id;
    let inner = seeded_store(vec![k1, k2]).await;
    let store = Arc::new(FlakyStore::new(inner.clone(), k1_id));
    let recovery = RecoveryService::new(store, cooldown_24h());

    let report = recovery
        .recover_inactive_keys("gemini")
        .await
        .expect("recovery");
    assert_eq!(report.recovered_keys, 1);
    assert_eq!(report.total_inactive_keys, 2);
    assert!(!report.success);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].key_id, k1_id);
    assert_eq!(report.errors[0].key_name, "k1");
    assert!(!report.errors[0].message.is_empty());

    assert!(inner.get(k2_id).await.expect("get").is_active);
    assert!(!inner.get(k1_id).await.expect("get").is_active);
}

#[tokio::test]
async fn custom_cooldown_window_is_respected() {
    let resting = aged(record("gemini", "resting", 10, 100, false), 2);
    let store = seeded_store(vec![resting]).await;
    let recovery = RecoveryService::new(store, cooldown_24h());

    let report = recovery
        .recover_inactive_keys_with("gemini", Duration::hours(1))
        .await
        .expect("recovery");
    assert_eq!(report.recovered_keys, 1);
}

#[tokio::test]
async fn manual_recovery_ignores_the_cooldown() {
    let resting = aged(record("gemini", "resting", 10, 100, false), 1);
    let id = resting.id;
    let store = seeded_store(vec![resting]).await;
    let recovery = RecoveryService::new(store.clone(), cooldown_24h());

    let recovered = recovery.recover_key(id).await.expect("manual recovery");
    assert!(recovered.is_active);
    assert_eq!(recovered.current_usage, 0);
}

#[tokio::test]
async fn stats_on_an_empty_pool_are_zeros() {
    let store = seeded_store(vec![]).await;
    let recovery = RecoveryService::new(store, cooldown_24h());

    let stats = recovery.recovery_stats("gemini").await.expect("stats");
    assert_eq!(stats, PoolStats::default());
}

#[tokio::test]
async fn stats_count_each_bucket() {
    let active = record("gemini", "active", 0, 100, true);
    let resting = aged(record("gemini", "resting", 0, 100, false), 2);
    let eligible = aged(record("gemini", "eligible", 0, 100, false), 30);
    let other_service = record("openai", "other", 0, 100, true);
    let store = seeded_store(vec![active, resting, eligible, other_service]).await;
    let recovery = RecoveryService::new(store, cooldown_24h());

    let stats = recovery.recovery_stats("gemini").await.expect("stats");
    assert_eq!(
        stats,
        PoolStats {
            total_keys: 3,
            active_keys: 1,
            inactive_keys: 2,
            eligible_for_recovery: 1,
        }
    );
}
