// src/store/record.rs

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, Secret};
use uuid::Uuid;

/// A single credential record in the pool.
///
/// Keys are created with `is_active = true` and `current_usage = 0`. They are
/// deactivated by the rotator (ceiling reached or upstream quota/auth failure)
/// and reactivated only by the recovery service or a manual operator override.
#[derive(Debug, Clone)]
pub struct KeyRecord {
    pub id: Uuid,
    pub service_name: String,
    pub key_name: String,
    pub secret: Secret<String>,
    pub is_active: bool,
    pub current_usage: u64,
    pub usage_limit: u64,
    pub updated_at: DateTime<Utc>,
}

impl KeyRecord {
    pub fn new(
        service_name: impl Into<String>,
        key_name: impl Into<String>,
        secret: Secret<String>,
        usage_limit: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            service_name: service_name.into(),
            key_name: key_name.into(),
            secret,
            is_active: true,
            current_usage: 0,
            usage_limit,
            updated_at: Utc::now(),
        }
    }

    /// Whether the key may be handed out: active and under its usage ceiling.
    pub fn is_eligible(&self) -> bool {
        self.is_active && self.current_usage < self.usage_limit
    }

    /// Whether the key has reached its usage ceiling.
    pub fn at_ceiling(&self) -> bool {
        self.current_usage >= self.usage_limit
    }

    /// Redacted form of the secret, safe for logs and admin listings.
    pub fn secret_preview(&self) -> String {
        preview(self.secret.expose_secret())
    }
}

/// Shortens a secret to its first and last four characters. Counts chars,
/// not bytes, so multi-byte secrets never split a char boundary.
pub fn preview(secret: &str) -> String {
    let count = secret.chars().count();
    if count > 8 {
        let head: String = secret.chars().take(4).collect();
        let tail: String = secret.chars().skip(count - 4).collect();
        format!("{head}...{tail}")
    } else {
        secret.to_string()
    }
}
