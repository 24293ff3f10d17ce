// tests/store_tests.rs

mod common;

use chrono::{Duration, Utc};
use common::{aged, record, seeded_store};
use credpool::error::AppError;
use credpool::store::{InMemoryStore, KeyStore};

#[tokio::test]
async fn concurrent_usage_increments_do_not_lose_updates() {
    let key = record("gemini", "a", 0, 1000, true);
    let id = key.id;
    let store = seeded_store(vec![key]).await;

    let mut handles = Vec::new();
    for _ in 0..10 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..5 {
                store.record_usage(id).await.expect("increment");
            }
        }));
    }
    for handle in handles {
        handle.await.expect("task");
    }

    let updated = store.get(id).await.expect("get");
    assert_eq!(updated.current_usage, 50);
}

#[tokio::test]
async fn at_ceiling_key_is_never_selected() {
    let exhausted = record("gemini", "a", 100, 100, true);
    let fresh = record("gemini", "b", 0, 100, true);
    let fresh_id = fresh.id;
    let store = seeded_store(vec![exhausted, fresh]).await;

    let selected = store.fetch_active_key("gemini").await.expect("select");
    assert_eq!(selected.id, fresh_id);
}

#[tokio::test]
async fn exhausted_pool_reports_no_available_key() {
    let exhausted = record("gemini", "a", 100, 100, true);
    let inactive = record("gemini", "b", 0, 100, false);
    let store = seeded_store(vec![exhausted, inactive]).await;

    let result = store.fetch_active_key("gemini").await;
    assert!(matches!(
        result,
        Err(AppError::NoAvailableKey { service }) if service == "gemini"
    ));
}

#[tokio::test]
async fn least_recently_used_key_is_selected_first() {
    let older = aged(record("gemini", "older", 5, 100, true), 2);
    let newer = aged(record("gemini", "newer", 5, 100, true), 1);
    let older_id = older.id;
    let store = seeded_store(vec![newer, older]).await;

    let selected = store.fetch_active_key("gemini").await.expect("select");
    assert_eq!(selected.id, older_id);
}

#[tokio::test]
async fn services_are_isolated() {
    let gemini = record("gemini", "a", 0, 100, true);
    let openai = record("openai", "a", 0, 100, true);
    let openai_id = openai.id;
    let store = seeded_store(vec![gemini, openai]).await;

    let selected = store.fetch_active_key("openai").await.expect("select");
    assert_eq!(selected.id, openai_id);
    assert_eq!(store.list_keys("gemini").await.expect("list").len(), 1);
}

#[tokio::test]
async fn insert_rejects_duplicate_names_within_service() {
    let store = seeded_store(vec![record("gemini", "a", 0, 100, true)]).await;

    let result = store.insert(record("gemini", "a", 0, 100, true)).await;
    assert!(matches!(result, Err(AppError::Validation { .. })));

    // Same name under another service is fine.
    store
        .insert(record("openai", "a", 0, 100, true))
        .await
        .expect("different service");
}

#[tokio::test]
async fn record_usage_on_unknown_id_is_not_found() {
    let store = InMemoryStore::new();
    let result = store.record_usage(uuid::Uuid::new_v4()).await;
    assert!(matches!(result, Err(AppError::KeyNotFound { .. })));
}

#[tokio::test]
async fn fetch_inactive_older_than_applies_the_cutoff() {
    let old = aged(record("gemini", "old", 40, 100, false), 30);
    let recent = aged(record("gemini", "recent", 40, 100, false), 2);
    let active = aged(record("gemini", "active", 0, 100, true), 30);
    let old_id = old.id;
    let store = seeded_store(vec![old, recent, active]).await;

    let cutoff = Utc::now() - Duration::hours(24);
    let eligible = store
        .fetch_inactive_older_than("gemini", cutoff)
        .await
        .expect("fetch");
    assert_eq!(eligible.len(), 1);
    assert_eq!(eligible[0].id, old_id);
}

#[tokio::test]
async fn activate_resets_usage_and_refreshes_timestamp() {
    let key = aged(record("gemini", "a", 80, 100, false), 30);
    let id = key.id;
    let before = key.updated_at;
    let store = seeded_store(vec![key]).await;

    let recovered = store.activate(id).await.expect("activate");
    assert!(recovered.is_active);
    assert_eq!(recovered.current_usage, 0);
    assert!(recovered.updated_at > before);
}

#[tokio::test]
async fn deactivate_refreshes_timestamp() {
    let key = record("gemini", "a", 10, 100, true);
    let id = key.id;
    let store = seeded_store(vec![key]).await;

    let retired = store.deactivate(id).await.expect("deactivate");
    assert!(!retired.is_active);
    // Usage is preserved; only recovery resets it.
    assert_eq!(retired.current_usage, 10);
}
