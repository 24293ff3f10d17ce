// src/pool.rs

use crate::error::Result;
use crate::rotation::{KeyRotator, RotationReason};
use crate::upstream::{FailureKind, UpstreamError};
use secrecy::Secret;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

/// The contract feature code programs against: get a key, call upstream,
/// report the outcome.
///
/// Per request: `ACQUIRE -> INVOKE -> {success: record usage | failure:
/// classify -> rotatable: rotate + retry once | terminal: propagate}`. The
/// retry bound comes from `max_retries` (default 1); there is no unbounded
/// loop.
pub struct KeyPool {
    rotator: Arc<KeyRotator>,
    max_retries: u32,
}

impl KeyPool {
    pub fn new(rotator: Arc<KeyRotator>) -> Self {
        Self {
            rotator,
            max_retries: 1,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Runs `call` with an eligible key's secret, handling accounting and
    /// rotation.
    pub async fn with_key<T, F, Fut>(&self, service: &str, mut call: F) -> Result<T>
    where
        F: FnMut(Secret<String>) -> Fut,
        Fut: Future<Output = std::result::Result<T, UpstreamError>>,
    {
        let mut key = self.rotator.get_key(service).await?;
        let mut rotations = 0;

        loop {
            match call(key.secret.clone()).await {
                Ok(value) => {
                    self.rotator.record_usage(key.id).await?;
                    debug!(
                        key.name = %key.key_name,
                        "upstream call succeeded, usage recorded"
                    );
                    return Ok(value);
                }
                Err(err) => {
                    let kind = err.kind();
                    if !err.is_rotatable() || rotations >= self.max_retries {
                        warn!(
                            key.name = %key.key_name,
                            kind = ?kind,
                            rotations,
                            error = %err,
                            "upstream failure propagated"
                        );
                        return Err(err.into());
                    }

                    let reason = match kind {
                        FailureKind::QuotaExhausted => RotationReason::QuotaExhausted,
                        _ => RotationReason::AuthRejected,
                    };
                    warn!(
                        key.name = %key.key_name,
                        kind = ?kind,
                        error = %err,
                        "rotatable upstream failure, switching keys"
                    );
                    key = self.rotator.rotate(service, key.id, reason).await?;
                    rotations += 1;
                }
            }
        }
    }
}
