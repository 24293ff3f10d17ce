// src/rotation.rs

use crate::error::{AppError, Result};
use crate::store::{KeyRecord, KeyStore};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Why a key is being rotated away from. Logged for diagnosis, not persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationReason {
    QuotaExhausted,
    AuthRejected,
    UsageCeiling,
}

impl fmt::Display for RotationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::QuotaExhausted => "quota_exhausted",
            Self::AuthRejected => "auth_rejected",
            Self::UsageCeiling => "usage_ceiling",
        };
        f.write_str(s)
    }
}

/// Hands out usable keys and retires keys that can no longer serve requests.
///
/// Caches the most recently issued key per service so the hot path avoids a
/// store round-trip. The cache is advisory only: concurrent processes may
/// still pick the same key, which the usage ceiling tolerates by design.
pub struct KeyRotator {
    store: Arc<dyn KeyStore>,
    current: RwLock<HashMap<String, KeyRecord>>,
}

impl KeyRotator {
    pub fn new(store: Arc<dyn KeyStore>) -> Self {
        Self {
            store,
            current: RwLock::new(HashMap::new()),
        }
    }

    /// Returns an active, under-limit key for the service.
    ///
    /// Serves from the per-service cache while the cached key is still
    /// eligible. A cached key found at its ceiling is deactivated here (the
    /// pre-flight rotation trigger) before a replacement is fetched.
    #[instrument(level = "debug", skip(self))]
    pub async fn get_key(&self, service: &str) -> Result<KeyRecord> {
        let cached = {
            let guard = self.current.read().await;
            guard.get(service).cloned()
        };

        if let Some(record) = cached {
            if record.is_eligible() {
                debug!(
                    key.name = %record.key_name,
                    key.usage = record.current_usage,
                    "serving cached key"
                );
                return Ok(record);
            }
            if record.is_active && record.at_ceiling() {
                self.retire(service, &record, RotationReason::UsageCeiling)
                    .await?;
            } else {
                self.current.write().await.remove(service);
            }
        }

        let record = self.store.fetch_active_key(service).await?;
        debug!(
            key.name = %record.key_name,
            key.usage = record.current_usage,
            key.limit = record.usage_limit,
            "issued key from store"
        );
        self.current
            .write()
            .await
            .insert(service.to_string(), record.clone());
        Ok(record)
    }

    /// Accounts one call against a key and keeps the cache in sync.
    pub async fn record_usage(&self, id: Uuid) -> Result<KeyRecord> {
        let updated = self.store.record_usage(id).await?;
        let mut guard = self.current.write().await;
        if let Some(entry) = guard.get_mut(&updated.service_name) {
            if entry.id == id {
                *entry = updated.clone();
            }
        }
        Ok(updated)
    }

    /// Deactivates the failing key and returns a replacement.
    ///
    /// Fails with `RotationExhausted` when no eligible key remains; callers
    /// must treat that as fatal for the current request.
    #[instrument(level = "warn", skip(self), fields(reason = %reason))]
    pub async fn rotate(
        &self,
        service: &str,
        failing_id: Uuid,
        reason: RotationReason,
    ) -> Result<KeyRecord> {
        let retired = self.store.deactivate(failing_id).await?;
        warn!(
            key.name = %retired.key_name,
            key.usage = retired.current_usage,
            "key deactivated, rotating"
        );

        {
            let mut guard = self.current.write().await;
            if guard.get(service).is_some_and(|rec| rec.id == failing_id) {
                guard.remove(service);
            }
        }

        match self.store.fetch_active_key(service).await {
            Ok(replacement) => {
                info!(
                    key.name = %replacement.key_name,
                    "rotation complete"
                );
                self.current
                    .write()
                    .await
                    .insert(service.to_string(), replacement.clone());
                Ok(replacement)
            }
            Err(AppError::NoAvailableKey { .. }) => Err(AppError::RotationExhausted {
                service: service.to_string(),
            }),
            Err(e) => Err(e),
        }
    }

    async fn retire(
        &self,
        service: &str,
        record: &KeyRecord,
        reason: RotationReason,
    ) -> Result<()> {
        warn!(
            key.name = %record.key_name,
            key.usage = record.current_usage,
            key.limit = record.usage_limit,
            reason = %reason,
            "retiring key"
        );
        self.store.deactivate(record.id).await?;
        let mut guard = self.current.write().await;
        if guard.get(service).is_some_and(|rec| rec.id == record.id) {
            guard.remove(service);
        }
        Ok(())
    }
}
