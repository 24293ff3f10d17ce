// src/store/traits.rs

use crate::error::Result;
use crate::store::KeyRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Durable persistence of `KeyRecord`s, queryable by service and activity.
///
/// All mutations are single-record updates that refresh `updated_at`; the
/// recovery service depends on that timestamp for its cooldown test. Usage
/// increments must be atomic at the storage layer so concurrent callers never
/// lose updates.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Adds a new record. Fails with a validation error when `key_name`
    /// already exists within the same service.
    async fn insert(&self, record: KeyRecord) -> Result<()>;

    /// Fetches a record by id.
    async fn get(&self, id: Uuid) -> Result<KeyRecord>;

    /// All records for a service, in no particular order.
    async fn list_keys(&self, service: &str) -> Result<Vec<KeyRecord>>;

    /// One active, under-limit key for the service. When several are
    /// eligible, the least-recently-used wins (oldest `updated_at`, then
    /// `key_name` as the final tie-break).
    async fn fetch_active_key(&self, service: &str) -> Result<KeyRecord>;

    /// All inactive keys whose `updated_at` is before the cutoff.
    async fn fetch_inactive_older_than(
        &self,
        service: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<KeyRecord>>;

    /// Atomically increments `current_usage` and refreshes `updated_at`.
    /// Never deactivates; ceiling enforcement belongs to the rotator.
    async fn record_usage(&self, id: Uuid) -> Result<KeyRecord>;

    /// Sets `is_active = false` and refreshes `updated_at`.
    async fn deactivate(&self, id: Uuid) -> Result<KeyRecord>;

    /// Sets `is_active = true`, resets `current_usage` to 0 and refreshes
    /// `updated_at`.
    async fn activate(&self, id: Uuid) -> Result<KeyRecord>;
}

/// Sorts candidates into selection order: least-recently-used first.
pub(crate) fn select_order(candidates: &mut [KeyRecord]) {
    candidates.sort_by(|a, b| {
        a.updated_at
            .cmp(&b.updated_at)
            .then_with(|| a.key_name.cmp(&b.key_name))
    });
}
