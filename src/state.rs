// src/state.rs

use crate::config::AppConfig;
use crate::error::Result;
use crate::pool::KeyPool;
use crate::recovery::RecoveryService;
use crate::rotation::KeyRotator;
use crate::store::{InMemoryStore, KeyRecord, KeyStore};
use secrecy::Secret;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Shared application state: configuration plus the wired-up pool services.
///
/// Everything is an injected handle; there is no process-global "current key"
/// anywhere, so independent callers and tests never interfere.
pub struct AppState {
    pub config: RwLock<AppConfig>,
    pub store: Arc<dyn KeyStore>,
    pub rotator: Arc<KeyRotator>,
    pub recovery: Arc<RecoveryService>,
    pub pool: Arc<KeyPool>,
}

impl AppState {
    pub async fn new(config: &AppConfig) -> Result<Self> {
        let store = build_store(config)?;
        seed_store(store.as_ref(), config).await?;

        let rotator = Arc::new(KeyRotator::new(store.clone()));
        let recovery = Arc::new(RecoveryService::new(
            store.clone(),
            config.pool.cooldown(),
        ));
        let pool = Arc::new(
            KeyPool::new(rotator.clone()).with_max_retries(config.pool.max_retries),
        );

        Ok(Self {
            config: RwLock::new(config.clone()),
            store,
            rotator,
            recovery,
            pool,
        })
    }
}

#[cfg(feature = "redis")]
fn build_store(config: &AppConfig) -> Result<Arc<dyn KeyStore>> {
    use crate::store::RedisStore;

    if let Some(url) = &config.redis_url {
        let prefix = config
            .redis_key_prefix
            .clone()
            .unwrap_or_else(|| "credpool:".to_string());
        let store = RedisStore::connect(url, prefix)?;
        return Ok(Arc::new(store));
    }
    info!("No redis_url configured. Key store runs in memory.");
    Ok(Arc::new(InMemoryStore::new()))
}

#[cfg(not(feature = "redis"))]
fn build_store(config: &AppConfig) -> Result<Arc<dyn KeyStore>> {
    if config.redis_url.is_some() {
        tracing::warn!("redis_url is set but the 'redis' feature is disabled. Falling back to the in-memory store.");
    }
    Ok(Arc::new(InMemoryStore::new()))
}

/// Provisions seed keys for any service that has none yet. Services with
/// existing keys are left untouched so restarts do not reset live state.
async fn seed_store(store: &dyn KeyStore, config: &AppConfig) -> Result<()> {
    let mut by_service: HashMap<String, Vec<&crate::config::SeedKey>> = HashMap::new();
    for seed in &config.seed_keys {
        let service = seed
            .service_name
            .clone()
            .unwrap_or_else(|| config.pool.default_service.clone());
        by_service.entry(service).or_default().push(seed);
    }

    for (service, seeds) in by_service {
        let existing = store.list_keys(&service).await?;
        if !existing.is_empty() {
            info!(
                service = %service,
                existing = existing.len(),
                "service already has keys, skipping seed"
            );
            continue;
        }

        for seed in &seeds {
            let record = KeyRecord::new(
                service.clone(),
                seed.key_name.clone(),
                Secret::new(seed.secret.clone()),
                seed.usage_limit.unwrap_or(config.pool.default_usage_limit),
            );
            store.insert(record).await?;
        }
        info!(service = %service, seeded = seeds.len(), "seed keys provisioned");
    }

    Ok(())
}
