// src/config.rs

use serde::Deserialize;
use std::collections::HashSet;
use std::{env, fs, io, path::Path};
use tracing::{info, warn};

use crate::error::{AppError, Result};

/// Upper bound for cooldown windows, config and admin overrides alike. One
/// year keeps `chrono::Duration::hours` far away from its own limits.
pub const MAX_COOLDOWN_HOURS: u64 = 24 * 365;

const ENV_ADMIN_TOKEN: &str = "CREDPOOL_ADMIN_TOKEN";
const ENV_REDIS_URL: &str = "CREDPOOL_REDIS_URL";
const ENV_SEED_KEYS: &str = "CREDPOOL_SEED_KEYS";

/// Root of the application configuration.
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    /// Redis connection URL. When absent the store runs in memory.
    #[serde(default)]
    pub redis_url: Option<String>,
    #[serde(default)]
    pub redis_key_prefix: Option<String>,
    /// Keys provisioned at startup when the store has none for their service.
    #[serde(default)]
    pub seed_keys: Vec<SeedKey>,
}

/// Network address the admin server listens on.
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_server_host")]
    pub host: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
    /// Bearer token guarding /admin routes. Admin routes reject everything
    /// when unset.
    #[serde(default)]
    pub admin_token: Option<String>,
}

/// Behaviour of the credential pool itself.
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct PoolConfig {
    /// Which credential pool callers use when they do not name one.
    #[serde(default = "default_service")]
    pub default_service: String,
    /// Hours a deactivated key must rest before recovery reactivates it.
    #[serde(default = "default_cooldown_hours")]
    pub cooldown_hours: u64,
    /// Usage ceiling applied to keys provisioned without an explicit limit.
    #[serde(default = "default_usage_limit")]
    pub default_usage_limit: u64,
    /// How many times `with_key` rotates and retries after a quota/auth
    /// failure before propagating.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

/// A key provisioned from configuration.
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct SeedKey {
    #[serde(default)]
    pub service_name: Option<String>,
    pub key_name: String,
    pub secret: String,
    #[serde(default)]
    pub usage_limit: Option<u64>,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            server: ServerConfig::default(),
            pool: PoolConfig::default(),
            redis_url: None,
            redis_key_prefix: None,
            seed_keys: Vec::new(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: default_server_host(),
            port: default_server_port(),
            admin_token: None,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            default_service: default_service(),
            cooldown_hours: default_cooldown_hours(),
            default_usage_limit: default_usage_limit(),
            max_retries: default_max_retries(),
        }
    }
}

impl PoolConfig {
    /// Cooldown window as a chrono duration. Clamped to
    /// [`MAX_COOLDOWN_HOURS`] so an unvalidated value can never overflow the
    /// chrono constructor or wrap negative.
    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::hours(self.cooldown_hours.min(MAX_COOLDOWN_HOURS) as i64)
    }
}

fn default_server_host() -> String {
    "0.0.0.0".to_string()
}
fn default_server_port() -> u16 {
    8080
}
fn default_service() -> String {
    "gemini".to_string()
}
fn default_cooldown_hours() -> u64 {
    24
}
fn default_usage_limit() -> u64 {
    1000
}
fn default_max_retries() -> u32 {
    1
}

/// Loads configuration from an optional YAML file, then applies environment
/// overrides (`CREDPOOL_ADMIN_TOKEN`, `CREDPOOL_REDIS_URL`,
/// `CREDPOOL_SEED_KEYS`).
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let path_str = path.display().to_string();
    let mut config = match fs::read_to_string(path) {
        Ok(contents) if !contents.trim().is_empty() => {
            let parsed: AppConfig = serde_yaml::from_str(&contents).map_err(|e| {
                AppError::Config(format!("failed to parse '{path_str}': {e}"))
            })?;
            info!(config.path = %path_str, "Loaded configuration file");
            parsed
        }
        Ok(_) => {
            warn!(config.path = %path_str, "Config file is empty. Using defaults.");
            AppConfig::default()
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!(config.path = %path_str, "Config file not found. Using defaults and environment variables.");
            AppConfig::default()
        }
        Err(e) => {
            return Err(AppError::Io(io::Error::new(
                e.kind(),
                format!("failed to read config file '{path_str}': {e}"),
            )))
        }
    };

    apply_env_overrides(&mut config);
    validate_config(&config)?;

    info!(
        pool.default_service = %config.pool.default_service,
        pool.cooldown_hours = config.pool.cooldown_hours,
        seed_keys = config.seed_keys.len(),
        redis = config.redis_url.is_some(),
        "Configuration loaded and validated"
    );
    Ok(config)
}

fn apply_env_overrides(config: &mut AppConfig) {
    if let Ok(token) = env::var(ENV_ADMIN_TOKEN) {
        if !token.trim().is_empty() {
            config.server.admin_token = Some(token.trim().to_string());
        }
    }
    if let Ok(url) = env::var(ENV_REDIS_URL) {
        if !url.trim().is_empty() {
            config.redis_url = Some(url.trim().to_string());
        }
    }
    // CREDPOOL_SEED_KEYS holds comma-separated secrets for the default
    // service; names are generated positionally.
    if let Ok(raw) = env::var(ENV_SEED_KEYS) {
        let secrets: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        for (index, secret) in secrets.into_iter().enumerate() {
            config.seed_keys.push(SeedKey {
                service_name: None,
                key_name: format!("env-{}", index + 1),
                secret,
                usage_limit: None,
            });
        }
    }
}

/// Validation checks applied after loading.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    if config.server.host.trim().is_empty() {
        return Err(AppError::Config("server.host must not be empty".to_string()));
    }
    if config.server.port == 0 {
        return Err(AppError::Config("server.port must not be 0".to_string()));
    }
    if config.pool.cooldown_hours == 0 {
        return Err(AppError::Config(
            "pool.cooldown_hours must be at least 1".to_string(),
        ));
    }
    if config.pool.cooldown_hours > MAX_COOLDOWN_HOURS {
        return Err(AppError::Config(format!(
            "pool.cooldown_hours must not exceed {MAX_COOLDOWN_HOURS}"
        )));
    }
    if config.pool.default_usage_limit == 0 {
        return Err(AppError::Config(
            "pool.default_usage_limit must be positive".to_string(),
        ));
    }
    if config.pool.default_service.trim().is_empty() {
        return Err(AppError::Config(
            "pool.default_service must not be empty".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for seed in &config.seed_keys {
        if seed.key_name.trim().is_empty() {
            return Err(AppError::Config("seed key with empty key_name".to_string()));
        }
        if seed.secret.trim().is_empty() {
            return Err(AppError::Config(format!(
                "seed key '{}' has an empty secret",
                seed.key_name
            )));
        }
        if let Some(limit) = seed.usage_limit {
            if limit == 0 {
                return Err(AppError::Config(format!(
                    "seed key '{}' has usage_limit 0",
                    seed.key_name
                )));
            }
        }
        let service = seed
            .service_name
            .clone()
            .unwrap_or_else(|| config.pool.default_service.clone());
        if !seen.insert((service.clone(), seed.key_name.clone())) {
            return Err(AppError::Config(format!(
                "duplicate seed key '{}' for service '{}'",
                seed.key_name, service
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use tempfile::tempdir;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    fn create_temp_config_file(dir: &tempfile::TempDir, content: &str) -> PathBuf {
        let file_path = dir.path().join("test_config.yaml");
        let mut file = File::create(&file_path).expect("Failed to create temp config file");
        writeln!(file, "{content}").expect("Failed to write to temp config file");
        file_path
    }

    fn cleanup_env() {
        std::env::remove_var(ENV_ADMIN_TOKEN);
        std::env::remove_var(ENV_REDIS_URL);
        std::env::remove_var(ENV_SEED_KEYS);
    }

    #[test]
    fn defaults_when_file_missing() {
        let _lock = ENV_MUTEX.lock().unwrap();
        cleanup_env();
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope.yaml");

        let config = load_config(&missing).expect("defaults should load");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.pool.default_service, "gemini");
        assert_eq!(config.pool.cooldown_hours, 24);
        assert_eq!(config.pool.max_retries, 1);
        assert!(config.seed_keys.is_empty());
        cleanup_env();
    }

    #[test]
    fn loads_yaml_with_seed_keys() {
        let _lock = ENV_MUTEX.lock().unwrap();
        cleanup_env();
        let dir = tempdir().unwrap();
        let yaml = r#"
server: { host: "127.0.0.1", port: 9000, admin_token: "tok" }
pool: { default_service: "gemini", cooldown_hours: 12, default_usage_limit: 50 }
seed_keys:
  - { key_name: "primary", secret: "sk-aaa" }
  - { key_name: "backup", secret: "sk-bbb", usage_limit: 10, service_name: "openai" }
"#;
        let path = create_temp_config_file(&dir, yaml);

        let config = load_config(&path).expect("yaml should load");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.admin_token.as_deref(), Some("tok"));
        assert_eq!(config.pool.cooldown_hours, 12);
        assert_eq!(config.seed_keys.len(), 2);
        assert_eq!(config.seed_keys[1].service_name.as_deref(), Some("openai"));
        cleanup_env();
    }

    #[test]
    fn env_overrides_apply() {
        let _lock = ENV_MUTEX.lock().unwrap();
        cleanup_env();
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope.yaml");

        std::env::set_var(ENV_ADMIN_TOKEN, "env-token");
        std::env::set_var(ENV_SEED_KEYS, "sk-one, sk-two");

        let config = load_config(&missing).expect("env config should load");
        assert_eq!(config.server.admin_token.as_deref(), Some("env-token"));
        assert_eq!(config.seed_keys.len(), 2);
        assert_eq!(config.seed_keys[0].key_name, "env-1");
        assert_eq!(config.seed_keys[1].secret, "sk-two");
        cleanup_env();
    }

    #[test]
    fn rejects_zero_cooldown() {
        let _lock = ENV_MUTEX.lock().unwrap();
        cleanup_env();
        let dir = tempdir().unwrap();
        let path = create_temp_config_file(&dir, "pool: { cooldown_hours: 0 }");

        let result = load_config(&path);
        assert!(matches!(result, Err(AppError::Config(_))));
        cleanup_env();
    }

    #[test]
    fn rejects_oversized_cooldown() {
        let _lock = ENV_MUTEX.lock().unwrap();
        cleanup_env();
        let dir = tempdir().unwrap();
        let path = create_temp_config_file(
            &dir,
            &format!("pool: {{ cooldown_hours: {} }}", u64::MAX),
        );

        let result = load_config(&path);
        assert!(matches!(result, Err(AppError::Config(_))));
        cleanup_env();
    }

    #[test]
    fn cooldown_never_overflows_chrono() {
        let pool = PoolConfig {
            cooldown_hours: u64::MAX,
            ..PoolConfig::default()
        };
        assert_eq!(
            pool.cooldown(),
            chrono::Duration::hours(MAX_COOLDOWN_HOURS as i64)
        );
        assert!(pool.cooldown() > chrono::Duration::zero());
    }

    #[test]
    fn rejects_duplicate_seed_keys() {
        let _lock = ENV_MUTEX.lock().unwrap();
        cleanup_env();
        let dir = tempdir().unwrap();
        let yaml = r#"
seed_keys:
  - { key_name: "same", secret: "a" }
  - { key_name: "same", secret: "b" }
"#;
        let path = create_temp_config_file(&dir, yaml);

        let result = load_config(&path);
        assert!(matches!(result, Err(AppError::Config(_))));
        cleanup_env();
    }

    #[test]
    fn rejects_empty_seed_secret() {
        let _lock = ENV_MUTEX.lock().unwrap();
        cleanup_env();
        let dir = tempdir().unwrap();
        let path =
            create_temp_config_file(&dir, "seed_keys: [{ key_name: \"k\", secret: \"  \" }]");

        let result = load_config(&path);
        assert!(matches!(result, Err(AppError::Config(_))));
        cleanup_env();
    }
}
