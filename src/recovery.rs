// src/recovery.rs

use crate::error::Result;
use crate::store::{KeyRecord, KeyStore};
use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Outcome of one recovery batch. Partial-failure report: each key is updated
/// independently and one failure does not block the rest.
#[derive(Debug, Serialize)]
pub struct RecoveryReport {
    pub service_name: String,
    pub recovered_keys: usize,
    pub total_inactive_keys: usize,
    pub success: bool,
    pub errors: Vec<RecoveryError>,
}

/// Per-key failure entry with enough context for operator diagnosis.
#[derive(Debug, Serialize)]
pub struct RecoveryError {
    pub key_id: Uuid,
    pub key_name: String,
    pub message: String,
}

/// Read-only pool counts for observability.
#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct PoolStats {
    pub total_keys: usize,
    pub active_keys: usize,
    pub inactive_keys: usize,
    pub eligible_for_recovery: usize,
}

/// Reclaims keys that have rested long enough for the provider's quota window
/// to reset. Invocation is time-driven and external (cron hitting the admin
/// endpoint); this service never schedules itself.
pub struct RecoveryService {
    store: Arc<dyn KeyStore>,
    cooldown: Duration,
}

impl RecoveryService {
    pub fn new(store: Arc<dyn KeyStore>, cooldown: Duration) -> Self {
        Self { store, cooldown }
    }

    /// Reactivates every inactive key older than the configured cooldown,
    /// resetting its usage counter.
    pub async fn recover_inactive_keys(&self, service: &str) -> Result<RecoveryReport> {
        self.recover_inactive_keys_with(service, self.cooldown).await
    }

    /// Same as [`recover_inactive_keys`](Self::recover_inactive_keys) with an
    /// explicit cooldown window.
    #[instrument(level = "info", skip(self), fields(cooldown_hours = cooldown.num_hours()))]
    pub async fn recover_inactive_keys_with(
        &self,
        service: &str,
        cooldown: Duration,
    ) -> Result<RecoveryReport> {
        let cutoff = Utc::now() - cooldown;
        let eligible = self.store.fetch_inactive_older_than(service, cutoff).await?;
        let total_inactive_keys = eligible.len();

        let mut recovered_keys = 0;
        let mut errors = Vec::new();
        for key in eligible {
            match self.store.activate(key.id).await {
                Ok(recovered) => {
                    info!(
                        key.name = %recovered.key_name,
                        "key recovered"
                    );
                    recovered_keys += 1;
                }
                Err(e) => {
                    warn!(
                        key.name = %key.key_name,
                        error = %e,
                        "key recovery failed"
                    );
                    errors.push(RecoveryError {
                        key_id: key.id,
                        key_name: key.key_name,
                        message: e.to_string(),
                    });
                }
            }
        }

        info!(
            recovered = recovered_keys,
            eligible = total_inactive_keys,
            failed = errors.len(),
            "recovery batch finished"
        );
        Ok(RecoveryReport {
            service_name: service.to_string(),
            recovered_keys,
            total_inactive_keys,
            success: errors.is_empty(),
            errors,
        })
    }

    /// Manual operator override: reactivates one key regardless of cooldown.
    #[instrument(level = "info", skip(self))]
    pub async fn recover_key(&self, id: Uuid) -> Result<KeyRecord> {
        let recovered = self.store.activate(id).await?;
        info!(
            key.name = %recovered.key_name,
            service = %recovered.service_name,
            "key recovered by operator override"
        );
        Ok(recovered)
    }

    /// Aggregate counts for a service. An empty pool yields zeros.
    pub async fn recovery_stats(&self, service: &str) -> Result<PoolStats> {
        let keys = self.store.list_keys(service).await?;
        let cutoff = Utc::now() - self.cooldown;

        let mut stats = PoolStats {
            total_keys: keys.len(),
            ..PoolStats::default()
        };
        for key in &keys {
            if key.is_active {
                stats.active_keys += 1;
            } else {
                stats.inactive_keys += 1;
                if key.updated_at < cutoff {
                    stats.eligible_for_recovery += 1;
                }
            }
        }
        Ok(stats)
    }
}
