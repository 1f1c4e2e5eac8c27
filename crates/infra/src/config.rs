//! Store configuration loading and representation.

use std::time::Duration;

use thiserror::Error;
use tracing::debug;

pub const DATABASE_URL_VAR: &str = "STOCKROOM_DATABASE_URL";
pub const MAX_CONNECTIONS_VAR: &str = "STOCKROOM_MAX_CONNECTIONS";
pub const BUSY_TIMEOUT_VAR: &str = "STOCKROOM_BUSY_TIMEOUT_MS";

pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/inventory.db";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 4;
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

const IN_MEMORY_URL: &str = "sqlite::memory:";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Where the store lives and how its connection pool behaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub busy_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
        }
    }
}

impl StoreConfig {
    /// Read `STOCKROOM_*` variables from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup; unset or blank keys fall
    /// back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        match get(DATABASE_URL_VAR) {
            Some(url) => config.database_url = url,
            None => debug!(default = DEFAULT_DATABASE_URL, "{DATABASE_URL_VAR} not set"),
        }

        if let Some(raw) = get(MAX_CONNECTIONS_VAR) {
            let n: u32 = raw.parse().map_err(|e: std::num::ParseIntError| ConfigError::Invalid {
                key: MAX_CONNECTIONS_VAR,
                value: raw.clone(),
                reason: e.to_string(),
            })?;
            if n == 0 {
                return Err(ConfigError::Invalid {
                    key: MAX_CONNECTIONS_VAR,
                    value: raw,
                    reason: "must be at least 1".to_string(),
                });
            }
            config.max_connections = n;
        }

        if let Some(raw) = get(BUSY_TIMEOUT_VAR) {
            let ms: u64 = raw.parse().map_err(|e: std::num::ParseIntError| ConfigError::Invalid {
                key: BUSY_TIMEOUT_VAR,
                value: raw.clone(),
                reason: e.to_string(),
            })?;
            config.busy_timeout = Duration::from_millis(ms);
        }

        Ok(config)
    }

    /// A private, throwaway in-memory database (one connection, kept alive).
    pub fn in_memory() -> Self {
        Self {
            database_url: IN_MEMORY_URL.to_string(),
            max_connections: 1,
            ..Self::default()
        }
    }

    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = url.into();
        self
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_url == IN_MEMORY_URL || self.database_url.contains("mode=memory")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = StoreConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, StoreConfig::default());
        assert_eq!(config.database_url, "sqlite://data/inventory.db");
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.busy_timeout, Duration::from_millis(5_000));
    }

    #[test]
    fn reads_overrides() {
        let config = StoreConfig::from_lookup(lookup(&[
            (DATABASE_URL_VAR, "sqlite:///srv/shop.db"),
            (MAX_CONNECTIONS_VAR, " 2 "),
            (BUSY_TIMEOUT_VAR, "250"),
        ]))
        .unwrap();

        assert_eq!(config.database_url, "sqlite:///srv/shop.db");
        assert_eq!(config.max_connections, 2);
        assert_eq!(config.busy_timeout, Duration::from_millis(250));
    }

    #[test]
    fn rejects_bad_numbers() {
        let err = StoreConfig::from_lookup(lookup(&[(MAX_CONNECTIONS_VAR, "many")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: MAX_CONNECTIONS_VAR, .. }));

        let err = StoreConfig::from_lookup(lookup(&[(MAX_CONNECTIONS_VAR, "0")])).unwrap_err();
        assert!(err.to_string().contains("at least 1"));

        let err = StoreConfig::from_lookup(lookup(&[(BUSY_TIMEOUT_VAR, "-5")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: BUSY_TIMEOUT_VAR, .. }));
    }

    #[test]
    fn in_memory_is_detected() {
        assert!(StoreConfig::in_memory().is_in_memory());
        assert!(!StoreConfig::default().is_in_memory());
    }
}
