// src/store/memory.rs

use crate::error::{AppError, Result};
use crate::store::traits::select_order;
use crate::store::{KeyRecord, KeyStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::trace;
use uuid::Uuid;

/// In-memory implementation of the key store.
///
/// Used by tests and single-process deployments. Each mutation happens under
/// one write-lock section, which gives the same no-lost-update guarantee the
/// Redis backend gets from `HINCRBY`.
#[derive(Default)]
pub struct InMemoryStore {
    records: Arc<RwLock<HashMap<Uuid, KeyRecord>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with_records(records: Vec<KeyRecord>) -> Result<Self> {
        let store = Self::new();
        for record in records {
            store.insert(record).await?;
        }
        Ok(store)
    }
}

#[async_trait]
impl KeyStore for InMemoryStore {
    async fn insert(&self, record: KeyRecord) -> Result<()> {
        let mut guard = self.records.write().await;
        let duplicate = guard.values().any(|existing| {
            existing.service_name == record.service_name && existing.key_name == record.key_name
        });
        if duplicate {
            return Err(AppError::validation(
                "key_name",
                format!(
                    "key '{}' already exists for service '{}'",
                    record.key_name, record.service_name
                ),
            ));
        }
        guard.insert(record.id, record);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<KeyRecord> {
        let guard = self.records.read().await;
        guard
            .get(&id)
            .cloned()
            .ok_or(AppError::KeyNotFound { id })
    }

    async fn list_keys(&self, service: &str) -> Result<Vec<KeyRecord>> {
        let guard = self.records.read().await;
        Ok(guard
            .values()
            .filter(|rec| rec.service_name == service)
            .cloned()
            .collect())
    }

    async fn fetch_active_key(&self, service: &str) -> Result<KeyRecord> {
        let guard = self.records.read().await;
        let mut candidates: Vec<KeyRecord> = guard
            .values()
            .filter(|rec| rec.service_name == service && rec.is_eligible())
            .cloned()
            .collect();
        drop(guard);

        select_order(&mut candidates);
        trace!(
            service = service,
            candidates = candidates.len(),
            "selecting active key"
        );
        candidates
            .into_iter()
            .next()
            .ok_or_else(|| AppError::NoAvailableKey {
                service: service.to_string(),
            })
    }

    async fn fetch_inactive_older_than(
        &self,
        service: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<KeyRecord>> {
        let guard = self.records.read().await;
        Ok(guard
            .values()
            .filter(|rec| {
                rec.service_name == service && !rec.is_active && rec.updated_at < cutoff
            })
            .cloned()
            .collect())
    }

    async fn record_usage(&self, id: Uuid) -> Result<KeyRecord> {
        let mut guard = self.records.write().await;
        let record = guard.get_mut(&id).ok_or(AppError::KeyNotFound { id })?;
        record.current_usage += 1;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn deactivate(&self, id: Uuid) -> Result<KeyRecord> {
        let mut guard = self.records.write().await;
        let record = guard.get_mut(&id).ok_or(AppError::KeyNotFound { id })?;
        record.is_active = false;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn activate(&self, id: Uuid) -> Result<KeyRecord> {
        let mut guard = self.records.write().await;
        let record = guard.get_mut(&id).ok_or(AppError::KeyNotFound { id })?;
        record.is_active = true;
        record.current_usage = 0;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }
}
