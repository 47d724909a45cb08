use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Cache behaviour (namespace, TTL, tier timeout)
    #[serde(default)]
    pub cache: CacheSettings,
    /// Durable tier connection
    #[serde(default)]
    pub redis: RedisConfig,
    /// Local persistent store used when the durable tier is not reachable from this host
    #[serde(default)]
    pub local_store: LocalStoreConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Cache validations
        if self.cache.namespace.is_empty() {
            return Err("cache.namespace must not be empty".into());
        }
        if self.cache.default_ttl_secs == 0 {
            return Err("cache.default_ttl_secs must be > 0".into());
        }
        if self.cache.tier_timeout_ms == 0 {
            return Err("cache.tier_timeout_ms must be > 0".into());
        }
        // Redis validations
        if self.redis.enabled {
            if self.redis.url.is_none() && self.redis.host.is_empty() {
                return Err("redis requires either 'url' or 'host' to be set".into());
            }
            if self.redis.pool_size == 0 {
                return Err("redis.pool_size must be > 0".into());
            }
            if self.redis.timeout_ms == 0 {
                return Err("redis.timeout_ms must be > 0".into());
            }
            if matches!(self.redis.invalidation_channel.as_deref(), Some("")) {
                return Err("redis.invalidation_channel must not be empty when set".into());
            }
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        Ok(())
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Prefix of every key this cache manages (default: "app:")
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// TTL used when a caller passes none (default: 300s)
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,

    /// Upper bound for each secondary tier call in milliseconds
    #[serde(default = "default_tier_timeout_ms")]
    pub tier_timeout_ms: u64,
}

fn default_namespace() -> String {
    "app:".into()
}
fn default_ttl_secs() -> u64 {
    300 // 5 minutes
}
fn default_tier_timeout_ms() -> u64 {
    5000
}

impl CacheSettings {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn tier_timeout(&self) -> Duration {
        Duration::from_millis(self.tier_timeout_ms)
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            default_ttl_secs: default_ttl_secs(),
            tier_timeout_ms: default_tier_timeout_ms(),
        }
    }
}

/// Redis configuration for the durable tier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Enable Redis (gracefully degrades without it)
    /// Default: false
    #[serde(default)]
    pub enabled: bool,

    /// Full connection URL (e.g., "redis://localhost:6379/0").
    /// Takes precedence over host/port/password/db.
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default = "default_redis_host")]
    pub host: String,

    #[serde(default = "default_redis_port")]
    pub port: u16,

    #[serde(default)]
    pub password: Option<String>,

    /// Logical database index
    #[serde(default)]
    pub db: u32,

    /// Connection pool size
    #[serde(default = "default_redis_pool_size")]
    pub pool_size: usize,

    /// Connection timeout in milliseconds
    #[serde(default = "default_redis_timeout_ms")]
    pub timeout_ms: u64,

    /// Pub/Sub channel for cross-instance fast-tier invalidation.
    /// Unset disables it.
    #[serde(default)]
    pub invalidation_channel: Option<String>,
}

fn default_redis_host() -> String {
    "localhost".into()
}
fn default_redis_port() -> u16 {
    6379
}
fn default_redis_pool_size() -> usize {
    10
}
fn default_redis_timeout_ms() -> u64 {
    5000
}

impl RedisConfig {
    /// Returns the connection URL.
    /// If `url` is set, returns it directly.
    /// Otherwise, constructs URL from individual options.
    pub fn connection_url(&self) -> String {
        if let Some(ref url) = self.url {
            return url.clone();
        }

        let base = format!("redis://{}:{}/{}", self.host, self.port, self.db);
        let Some(ref password) = self.password else {
            return base;
        };
        if let Ok(mut parsed) = url::Url::parse(&base) {
            if parsed.set_password(Some(password)).is_ok() {
                return parsed.to_string();
            }
        }
        format!("redis://:{}@{}:{}/{}", password, self.host, self.port, self.db)
    }

    /// Connection target without credentials, for logs.
    pub fn redacted_target(&self) -> String {
        match self.url.as_deref().map(url::Url::parse) {
            Some(Ok(mut parsed)) => {
                if parsed.password().is_some() {
                    let _ = parsed.set_password(Some("***"));
                }
                parsed.to_string()
            }
            Some(Err(_)) => "<invalid url>".to_string(),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: None,
            host: default_redis_host(),
            port: default_redis_port(),
            password: None,
            db: 0,
            pool_size: default_redis_pool_size(),
            timeout_ms: default_redis_timeout_ms(),
            invalidation_channel: None,
        }
    }
}

/// Local persistent store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalStoreConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Directory holding one file per cached key
    #[serde(default = "default_local_store_path")]
    pub path: PathBuf,
}

fn default_local_store_path() -> PathBuf {
    PathBuf::from(".makhraj-cache")
}

impl Default for LocalStoreConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_local_store_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    pub const DEFAULT_CONFIG_FILE: &str = "makhraj.toml";

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_FILE));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        } else if path.is_some() {
            return Err(format!("config file not found: {}", pathbuf.display()));
        }
        // Environment variable overrides, e.g., MAKHRAJ__REDIS__HOST=cache.internal
        builder = builder.add_source(
            Environment::with_prefix("MAKHRAJ")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.cache.namespace, "app:");
        assert_eq!(cfg.cache.default_ttl(), Duration::from_secs(300));
        assert!(!cfg.redis.enabled);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut cfg = AppConfig::default();
        cfg.cache.default_ttl_secs = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = AppConfig::default();
        cfg.cache.namespace.clear();
        assert!(cfg.validate().is_err());

        let mut cfg = AppConfig::default();
        cfg.logging.level = "loud".into();
        assert!(cfg.validate().is_err());

        let mut cfg = AppConfig::default();
        cfg.redis.enabled = true;
        cfg.redis.pool_size = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_connection_url_from_parts() {
        let mut redis = RedisConfig {
            host: "cache.internal".into(),
            port: 6380,
            db: 2,
            ..RedisConfig::default()
        };
        assert_eq!(redis.connection_url(), "redis://cache.internal:6380/2");

        redis.password = Some("s3cret".into());
        assert_eq!(redis.connection_url(), "redis://:s3cret@cache.internal:6380/2");

        redis.url = Some("redis://other:6379".into());
        assert_eq!(redis.connection_url(), "redis://other:6379");
    }

    #[test]
    fn test_redacted_target_hides_password() {
        let redis = RedisConfig {
            url: Some("redis://:s3cret@cache.internal:6379/0".into()),
            ..RedisConfig::default()
        };
        let shown = redis.redacted_target();
        assert!(!shown.contains("s3cret"));
        assert!(shown.contains("cache.internal"));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[cache]
namespace = "tajwid:"
default_ttl_secs = 120

[redis]
enabled = true
host = "cache.internal"
db = 1
invalidation_channel = "tajwid:invalidate"
"#
        )
        .unwrap();

        let cfg = loader::load_config(file.path().to_str()).unwrap();
        assert_eq!(cfg.cache.namespace, "tajwid:");
        assert_eq!(cfg.cache.default_ttl_secs, 120);
        assert_eq!(cfg.cache.tier_timeout_ms, 5000);
        assert!(cfg.redis.enabled);
        assert_eq!(cfg.redis.connection_url(), "redis://cache.internal:6379/1");
        assert_eq!(
            cfg.redis.invalidation_channel.as_deref(),
            Some("tajwid:invalidate")
        );
    }

    #[test]
    fn test_load_config_missing_explicit_file() {
        assert!(loader::load_config(Some("/definitely/not/here.toml")).is_err());
    }
}
