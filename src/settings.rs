//! Settings Resolver
//!
//! Resolves named settings with environment-variable override. Configuration
//! structs pull their values through the [`Settings`] trait so tests can feed
//! a plain map instead of mutating the process environment.

use std::collections::HashMap;
use std::env;
use std::str::FromStr;

use tracing::warn;

/// Prefix applied to every environment variable read by [`EnvSettings`].
pub const ENV_PREFIX: &str = "BEDA_";

/// Source of named configuration values.
pub trait Settings {
    /// Returns the raw value for `name`, if one is set.
    fn resolve(&self, name: &str) -> Option<String>;

    /// Resolves `name` and parses it, falling back to `default` when the
    /// setting is missing or does not parse.
    fn resolve_or<T: FromStr>(&self, name: &str, default: T) -> T {
        match self.resolve(name) {
            Some(raw) => match raw.trim().parse() {
                Ok(value) => value,
                Err(_) => {
                    warn!(setting = name, value = %raw, "Unparseable setting, using default");
                    default
                }
            },
            None => default,
        }
    }
}

// == Environment Settings ==
/// Reads settings from `BEDA_<NAME>` environment variables.
#[derive(Debug, Clone, Default)]
pub struct EnvSettings;

impl Settings for EnvSettings {
    fn resolve(&self, name: &str) -> Option<String> {
        env::var(format!("{}{}", ENV_PREFIX, name.to_ascii_uppercase())).ok()
    }
}

// == Map Settings ==
/// In-memory settings, layered over nothing. Mostly useful in tests.
#[derive(Debug, Clone, Default)]
pub struct MapSettings {
    values: HashMap<String, String>,
}

impl MapSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a setting, builder style.
    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.values.insert(name.to_ascii_uppercase(), value.into());
        self
    }
}

impl Settings for MapSettings {
    fn resolve(&self, name: &str) -> Option<String> {
        self.values.get(&name.to_ascii_uppercase()).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_settings_resolve() {
        let settings = MapSettings::new().with("default_ttl", "60");
        assert_eq!(settings.resolve("DEFAULT_TTL").as_deref(), Some("60"));
        assert_eq!(settings.resolve_or("default_ttl", 0u64), 60);
    }

    #[test]
    fn test_resolve_or_missing_uses_default() {
        let settings = MapSettings::new();
        assert_eq!(settings.resolve_or("MAX_RETRIES", 3u32), 3);
    }

    #[test]
    fn test_resolve_or_unparseable_uses_default() {
        let settings = MapSettings::new().with("MAX_RETRIES", "lots");
        assert_eq!(settings.resolve_or("MAX_RETRIES", 3u32), 3);
    }

    #[test]
    fn test_env_settings_reads_prefixed_variable() {
        env::set_var("BEDA_SETTINGS_TEST_ONLY", "42");
        assert_eq!(EnvSettings.resolve_or("settings_test_only", 0u32), 42);
        env::remove_var("BEDA_SETTINGS_TEST_ONLY");
        assert!(EnvSettings.resolve("SETTINGS_TEST_ONLY").is_none());
    }
}
