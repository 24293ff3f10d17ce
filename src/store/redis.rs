// src/store/redis.rs

use crate::error::{AppError, Result};
use crate::store::traits::select_order;
use crate::store::{KeyRecord, KeyStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_redis::{Config, Connection, Pool, Runtime};
use redis::AsyncCommands;
use secrecy::{ExposeSecret, Secret};
use std::collections::HashMap;
use tracing::{info, trace};
use uuid::Uuid;

const SERVICE_SET_KEY: &str = "service_keys";
const RECORD_KEY: &str = "key_record";

/// Redis implementation of the key store.
///
/// One hash per record (`key_record:{id}`) and one set of record ids per
/// service (`service_keys:{service}`). Usage increments go through `HINCRBY`,
/// so concurrent callers never lose updates.
pub struct RedisStore {
    pool: Pool,
    key_prefix: String,
}

impl RedisStore {
    pub fn new(pool: Pool, key_prefix: impl Into<String>) -> Self {
        Self {
            pool,
            key_prefix: key_prefix.into(),
        }
    }

    /// Builds a store from a Redis URL.
    pub fn connect(url: &str, key_prefix: impl Into<String>) -> Result<Self> {
        let pool = Config::from_url(url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| AppError::persistence("redis_pool_create", e.to_string()))?;
        info!("Redis key store initialized");
        Ok(Self::new(pool, key_prefix))
    }

    async fn get_connection(&self) -> Result<Connection> {
        self.pool.get().await.map_err(Into::into)
    }

    fn service_set_key(&self, service: &str) -> String {
        format!("{}{SERVICE_SET_KEY}:{service}", self.key_prefix)
    }

    fn record_key(&self, id: Uuid) -> String {
        format!("{}{RECORD_KEY}:{id}", self.key_prefix)
    }

    fn parse_record(id: Uuid, fields: HashMap<String, String>) -> Result<KeyRecord> {
        let field = |name: &str| -> Result<&String> {
            fields
                .get(name)
                .ok_or_else(|| AppError::persistence("redis_parse", format!("missing field '{name}' for record {id}")))
        };

        let updated_at = DateTime::parse_from_rfc3339(field("updated_at")?)
            .map_err(|e| AppError::persistence("redis_parse", e.to_string()))?
            .with_timezone(&Utc);

        Ok(KeyRecord {
            id,
            service_name: field("service_name")?.clone(),
            key_name: field("key_name")?.clone(),
            secret: Secret::new(field("secret")?.clone()),
            is_active: field("is_active")?
                .parse()
                .map_err(|_| AppError::persistence("redis_parse", "invalid is_active"))?,
            current_usage: field("current_usage")?
                .parse()
                .map_err(|_| AppError::persistence("redis_parse", "invalid current_usage"))?,
            usage_limit: field("usage_limit")?
                .parse()
                .map_err(|_| AppError::persistence("redis_parse", "invalid usage_limit"))?,
            updated_at,
        })
    }

    async fn read_record(&self, conn: &mut Connection, id: Uuid) -> Result<KeyRecord> {
        let fields: HashMap<String, String> = conn.hgetall(self.record_key(id)).await?;
        if fields.is_empty() {
            return Err(AppError::KeyNotFound { id });
        }
        Self::parse_record(id, fields)
    }

    async fn read_service_records(
        &self,
        conn: &mut Connection,
        service: &str,
    ) -> Result<Vec<KeyRecord>> {
        let ids: Vec<String> = conn.smembers(self.service_set_key(service)).await?;
        let mut records = Vec::with_capacity(ids.len());
        for raw_id in ids {
            let id = Uuid::parse_str(&raw_id)
                .map_err(|e| AppError::persistence("redis_parse", e.to_string()))?;
            // A dangling set member means the hash was removed out of band;
            // skip it rather than failing the whole listing.
            match self.read_record(conn, id).await {
                Ok(record) => records.push(record),
                Err(AppError::KeyNotFound { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl KeyStore for RedisStore {
    async fn insert(&self, record: KeyRecord) -> Result<()> {
        let mut conn = self.get_connection().await?;

        let existing = self.read_service_records(&mut conn, &record.service_name).await?;
        if existing.iter().any(|r| r.key_name == record.key_name) {
            return Err(AppError::validation(
                "key_name",
                format!(
                    "key '{}' already exists for service '{}'",
                    record.key_name, record.service_name
                ),
            ));
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.sadd(self.service_set_key(&record.service_name), record.id.to_string());
        pipe.hset_multiple(
            self.record_key(record.id),
            &[
                ("service_name", record.service_name.as_str()),
                ("key_name", record.key_name.as_str()),
                ("secret", record.secret.expose_secret().as_str()),
                ("is_active", if record.is_active { "true" } else { "false" }),
                ("current_usage", &record.current_usage.to_string()),
                ("usage_limit", &record.usage_limit.to_string()),
                ("updated_at", &record.updated_at.to_rfc3339()),
            ],
        );
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<KeyRecord> {
        let mut conn = self.get_connection().await?;
        self.read_record(&mut conn, id).await
    }

    async fn list_keys(&self, service: &str) -> Result<Vec<KeyRecord>> {
        let mut conn = self.get_connection().await?;
        self.read_service_records(&mut conn, service).await
    }

    async fn fetch_active_key(&self, service: &str) -> Result<KeyRecord> {
        let mut conn = self.get_connection().await?;
        let mut candidates: Vec<KeyRecord> = self
            .read_service_records(&mut conn, service)
            .await?
            .into_iter()
            .filter(KeyRecord::is_eligible)
            .collect();

        select_order(&mut candidates);
        trace!(
            service = service,
            candidates = candidates.len(),
            "selecting active key from redis"
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
        let mut conn = self.get_connection().await?;
        Ok(self
            .read_service_records(&mut conn, service)
            .await?
            .into_iter()
            .filter(|rec| !rec.is_active && rec.updated_at < cutoff)
            .collect())
    }

    async fn record_usage(&self, id: Uuid) -> Result<KeyRecord> {
        let mut conn = self.get_connection().await?;
        let record_key = self.record_key(id);

        let exists: bool = conn.exists(&record_key).await?;
        if !exists {
            return Err(AppError::KeyNotFound { id });
        }

        // HINCRBY is the atomic increment; the timestamp rides in the same
        // transaction so the recovery cooldown test stays accurate.
        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.hincr(&record_key, "current_usage", 1i64);
        pipe.hset(&record_key, "updated_at", Utc::now().to_rfc3339());
        let _: () = pipe.query_async(&mut conn).await?;

        self.read_record(&mut conn, id).await
    }

    async fn deactivate(&self, id: Uuid) -> Result<KeyRecord> {
        let mut conn = self.get_connection().await?;
        let record_key = self.record_key(id);

        let exists: bool = conn.exists(&record_key).await?;
        if !exists {
            return Err(AppError::KeyNotFound { id });
        }

        let _: () = conn
            .hset_multiple(
                &record_key,
                &[
                    ("is_active", "false"),
                    ("updated_at", &Utc::now().to_rfc3339()),
                ],
            )
            .await?;
        self.read_record(&mut conn, id).await
    }

    async fn activate(&self, id: Uuid) -> Result<KeyRecord> {
        let mut conn = self.get_connection().await?;
        let record_key = self.record_key(id);

        let exists: bool = conn.exists(&record_key).await?;
        if !exists {
            return Err(AppError::KeyNotFound { id });
        }

        let _: () = conn
            .hset_multiple(
                &record_key,
                &[
                    ("is_active", "true"),
                    ("current_usage", "0"),
                    ("updated_at", &Utc::now().to_rfc3339()),
                ],
            )
            .await?;
        self.read_record(&mut conn, id).await
    }
}
