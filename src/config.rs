//! Configuration Module
//!
//! Handles loading cache client and server configuration through the
//! settings resolver, with environment-variable override.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::{Codec, RetryPolicy};
use crate::settings::{EnvSettings, Settings};

// == Backend Kind ==
/// Which storage backend the client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    #[default]
    InMemory,
    Redis,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" | "in_memory" | "inmemory" => Ok(BackendKind::InMemory),
            "redis" | "remote" => Ok(BackendKind::Redis),
            other => Err(format!("unknown backend '{}'", other)),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::InMemory => write!(f, "memory"),
            BackendKind::Redis => write!(f, "redis"),
        }
    }
}

/// Cache client configuration.
///
/// Values can be overridden with `BEDA_*` environment variables; see
/// [`CacheConfig::from_settings`] for the recognized names.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Storage backend to construct
    pub backend: BackendKind,
    /// Connection URL for the Redis backend
    pub redis_url: String,
    /// TTL in seconds applied when `set` is called without one. None = never expires
    pub default_ttl: Option<u64>,
    /// Namespace prepended verbatim to every key
    pub key_prefix: String,
    /// Total attempts per backend operation, including the first
    pub max_retries: u32,
    /// Backoff before the first retry, doubled on each further retry
    pub retry_backoff_ms: u64,
    /// Upper bound for a single backoff delay
    pub retry_max_backoff_ms: u64,
    /// Per-attempt timeout for backend calls
    pub operation_timeout_ms: u64,
    /// In-memory capacity. None = unbounded
    pub max_entries: Option<usize>,
    /// Eager sweep interval in seconds for the in-memory backend. None = disabled
    pub sweep_interval: Option<u64>,
    /// Value codec
    pub codec: Codec,
}

impl CacheConfig {
    /// Loads configuration from `BEDA_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_settings(&EnvSettings)
    }

    /// Resolves every option through `settings`, falling back to defaults.
    ///
    /// # Settings
    /// - `BACKEND` - `memory` or `redis` (default: memory)
    /// - `REDIS_URL` - Redis URL (default: redis://127.0.0.1:6379)
    /// - `DEFAULT_TTL` - Default TTL in seconds, 0 = never (default: 0)
    /// - `KEY_PREFIX` - Key namespace (default: empty)
    /// - `MAX_RETRIES` - Attempts per operation (default: 3)
    /// - `RETRY_BACKOFF_MS` - Initial backoff (default: 50)
    /// - `RETRY_MAX_BACKOFF_MS` - Backoff cap (default: 2000)
    /// - `OPERATION_TIMEOUT_MS` - Per-attempt timeout (default: 1000)
    /// - `MAX_ENTRIES` - In-memory capacity, 0 = unbounded (default: 0)
    /// - `SWEEP_INTERVAL` - Eager sweep seconds, 0 = off (default: 1)
    /// - `CODEC` - `auto`, `json` or `binary` (default: auto)
    pub fn from_settings(settings: &impl Settings) -> Self {
        let defaults = Self::default();
        Self {
            backend: settings.resolve_or("BACKEND", defaults.backend),
            redis_url: settings.resolve_or("REDIS_URL", defaults.redis_url),
            default_ttl: non_zero(settings.resolve_or("DEFAULT_TTL", 0u64)),
            key_prefix: settings.resolve_or("KEY_PREFIX", defaults.key_prefix),
            max_retries: settings
                .resolve_or("MAX_RETRIES", defaults.max_retries)
                .max(1),
            retry_backoff_ms: settings.resolve_or("RETRY_BACKOFF_MS", defaults.retry_backoff_ms),
            retry_max_backoff_ms: settings
                .resolve_or("RETRY_MAX_BACKOFF_MS", defaults.retry_max_backoff_ms),
            operation_timeout_ms: settings
                .resolve_or("OPERATION_TIMEOUT_MS", defaults.operation_timeout_ms),
            max_entries: non_zero(settings.resolve_or("MAX_ENTRIES", 0usize)),
            sweep_interval: non_zero(settings.resolve_or("SWEEP_INTERVAL", 1u64)),
            codec: settings.resolve_or("CODEC", defaults.codec),
        }
    }

    /// Retry policy derived from the retry settings.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries.max(1),
            base_delay_ms: self.retry_backoff_ms,
            multiplier: 2,
            max_delay_ms: self.retry_max_backoff_ms,
            operation_timeout: Duration::from_millis(self.operation_timeout_ms),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::InMemory,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            default_ttl: None,
            key_prefix: String::new(),
            max_retries: 3,
            retry_backoff_ms: 50,
            retry_max_backoff_ms: 2_000,
            operation_timeout_ms: 1_000,
            max_entries: None,
            sweep_interval: Some(1),
            codec: Codec::Auto,
        }
    }
}

/// HTTP server configuration for the `beda_cache` binary.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP server port
    pub server_port: u16,
    /// Cache client options
    pub cache: CacheConfig,
}

impl ServerConfig {
    /// Loads configuration from `BEDA_*` environment variables.
    ///
    /// `SERVER_PORT` defaults to 3000.
    pub fn from_env() -> Self {
        Self::from_settings(&EnvSettings)
    }

    pub fn from_settings(settings: &impl Settings) -> Self {
        Self {
            server_port: settings.resolve_or("SERVER_PORT", 3000u16),
            cache: CacheConfig::from_settings(settings),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_port: 3000,
            cache: CacheConfig::default(),
        }
    }
}

fn non_zero<T: Default + PartialEq>(value: T) -> Option<T> {
    if value == T::default() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::MapSettings;

    #[test]
    fn test_config_default() {
        let config = CacheConfig::default();
        assert_eq!(config.backend, BackendKind::InMemory);
        assert_eq!(config.default_ttl, None);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_backoff_ms, 50);
        assert_eq!(config.sweep_interval, Some(1));
        assert_eq!(config.codec, Codec::Auto);
        assert!(config.key_prefix.is_empty());
    }

    #[test]
    fn test_config_from_empty_settings_matches_default() {
        let config = CacheConfig::from_settings(&MapSettings::new());
        let defaults = CacheConfig::default();
        assert_eq!(config.backend, defaults.backend);
        assert_eq!(config.redis_url, defaults.redis_url);
        assert_eq!(config.default_ttl, defaults.default_ttl);
        assert_eq!(config.max_entries, defaults.max_entries);
        assert_eq!(config.operation_timeout_ms, defaults.operation_timeout_ms);
    }

    #[test]
    fn test_config_from_settings_overrides() {
        let settings = MapSettings::new()
            .with("BACKEND", "redis")
            .with("REDIS_URL", "redis://cache:6380")
            .with("DEFAULT_TTL", "300")
            .with("KEY_PREFIX", "app:")
            .with("MAX_RETRIES", "5")
            .with("MAX_ENTRIES", "100")
            .with("SWEEP_INTERVAL", "0")
            .with("CODEC", "binary");

        let config = CacheConfig::from_settings(&settings);
        assert_eq!(config.backend, BackendKind::Redis);
        assert_eq!(config.redis_url, "redis://cache:6380");
        assert_eq!(config.default_ttl, Some(300));
        assert_eq!(config.key_prefix, "app:");
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.max_entries, Some(100));
        assert_eq!(config.sweep_interval, None);
        assert_eq!(config.codec, Codec::Binary);
    }

    #[test]
    fn test_config_zero_retries_clamped() {
        let settings = MapSettings::new().with("MAX_RETRIES", "0");
        assert_eq!(CacheConfig::from_settings(&settings).max_retries, 1);
    }

    #[test]
    fn test_retry_policy_from_config() {
        let policy = CacheConfig::default().retry_policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay_ms, 50);
        assert_eq!(policy.operation_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!("memory".parse::<BackendKind>(), Ok(BackendKind::InMemory));
        assert_eq!("Redis".parse::<BackendKind>(), Ok(BackendKind::Redis));
        assert!("memcached".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_server_config_port() {
        let settings = MapSettings::new().with("SERVER_PORT", "8080");
        assert_eq!(ServerConfig::from_settings(&settings).server_port, 8080);
        assert_eq!(ServerConfig::default().server_port, 3000);
    }
}
