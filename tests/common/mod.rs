// tests/common/mod.rs

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use credpool::error::{AppError, Result};
use credpool::store::{InMemoryStore, KeyRecord, KeyStore};
use secrecy::Secret;
use std::sync::Arc;
use uuid::Uuid;

/// Builds a key record with explicit usage/activity state.
pub fn record(service: &str, name: &str, usage: u64, limit: u64, active: bool) -> KeyRecord {
    let mut rec = KeyRecord::new(
        service,
        name,
        Secret::new(format!("sk-{name}-secret")),
        limit,
    );
    rec.current_usage = usage;
    rec.is_active = active;
    rec
}

/// Moves a record's `updated_at` into the past.
pub fn aged(mut rec: KeyRecord, hours: i64) -> KeyRecord {
    rec.updated_at = Utc::now() - Duration::hours(hours);
    rec
}

pub async fn seeded_store(records: Vec<KeyRecord>) -> Arc<InMemoryStore> {
    Arc::new(
        InMemoryStore::with_records(records)
            .await
            .expect("seeding test store"),
    )
}

/// Store wrapper that fails activation for one designated key, for
/// partial-failure tests.
pub struct FlakyStore {
    inner: Arc<InMemoryStore>,
    fail_activation_for: Uuid,
}

impl FlakyStore {
    pub fn new(inner: Arc<InMemoryStore>, fail_activation_for: Uuid) -> Self {
        Self {
            inner,
            fail_activation_for,
        }
    }
}

#[async_trait]
impl KeyStore for FlakyStore {
    async fn insert(&self, record: KeyRecord) -> Result<()> {
        self.inner.insert(record).await
    }

    async fn get(&self, id: Uuid) -> Result<KeyRecord> {
        self.inner.get(id).await
    }

    async fn list_keys(&self, service: &str) -> Result<Vec<KeyRecord>> {
        self.inner.list_keys(service).await
    }

    async fn fetch_active_key(&self, service: &str) -> Result<KeyRecord> {
        self.inner.fetch_active_key(service).await
    }

    async fn fetch_inactive_older_than(
        &self,
        service: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<KeyRecord>> {
        self.inner.fetch_inactive_older_than(service, cutoff).await
    }

    async fn record_usage(&self, id: Uuid) -> Result<KeyRecord> {
        self.inner.record_usage(id).await
    }

    async fn deactivate(&self, id: Uuid) -> Result<KeyRecord> {
        self.inner.deactivate(id).await
    }

    async fn activate(&self, id: Uuid) -> Result<KeyRecord> {
        if id == self.fail_activation_for {
            return Err(AppError::persistence(
                "activate",
                "simulated storage failure",
            ));
        }
        self.inner.activate(id).await
    }
}
