// SPDX-License-Identifier: MIT OR Apache-2.0

//! # AlertFlux Configuration
//!
//! Typed configuration for the detector engine's backing stores, loaded from
//! YAML files via [`ConfigManager`].
//!
//! ## Example
//!
//! ```yaml
//! redis:
//!   url: "redis://localhost:6379"
//!   key_prefix: "alertflux:detector:"
//! sqlite:
//!   path: "alertflux.db"
//! ```

use crate::core::error::{AlertFluxError, AlertFluxResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Seven days, the expiry applied to every ephemeral dedupe/counter key.
pub const DEFAULT_TTL_SECONDS: u64 = 7 * 24 * 60 * 60;

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_key_prefix() -> String {
    String::new()
}

fn default_connection_timeout_ms() -> u64 {
    1000
}

fn default_ttl_seconds() -> u64 {
    DEFAULT_TTL_SECONDS
}

fn default_sqlite_path() -> String {
    "alertflux.db".to_string()
}

/// Redis connection settings for the ephemeral state store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
    /// Prefix prepended to every key written by this engine. Lets multiple
    /// deployments share one cluster.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,
    /// Expiry applied to dedupe watermark and counter keys.
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            key_prefix: default_key_prefix(),
            connection_timeout_ms: default_connection_timeout_ms(),
            ttl_seconds: default_ttl_seconds(),
        }
    }
}

/// SQLite settings for the durable state store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqliteConfig {
    #[serde(default = "default_sqlite_path")]
    pub path: String,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: default_sqlite_path(),
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertFluxConfig {
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub sqlite: SqliteConfig,
}

/// Loads [`AlertFluxConfig`] from YAML sources.
#[derive(Debug, Default)]
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> AlertFluxResult<AlertFluxConfig> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            AlertFluxError::configuration(format!(
                "Failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_yaml_str(&raw)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the YAML is malformed.
    pub fn from_yaml_str(raw: &str) -> AlertFluxResult<AlertFluxConfig> {
        serde_yaml::from_str(raw).map_err(|e| {
            AlertFluxError::configuration(format!("Failed to parse YAML config: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AlertFluxConfig::default();
        assert_eq!(config.redis.url, "redis://localhost:6379");
        assert_eq!(config.redis.ttl_seconds, 604_800);
        assert_eq!(config.sqlite.path, "alertflux.db");
    }

    #[test]
    fn test_from_yaml_str() {
        let yaml = "\
redis:
  url: \"redis://cache:6379\"
  key_prefix: \"alertflux:test:\"
sqlite:
  path: \"/tmp/detectors.db\"
";
        let config = ConfigManager::from_yaml_str(yaml).unwrap();
        assert_eq!(config.redis.url, "redis://cache:6379");
        assert_eq!(config.redis.key_prefix, "alertflux:test:");
        assert_eq!(config.redis.connection_timeout_ms, 1000);
        assert_eq!(config.sqlite.path, "/tmp/detectors.db");
    }

    #[test]
    fn test_partial_yaml_falls_back_to_defaults() {
        let config = ConfigManager::from_yaml_str("redis:\n  key_prefix: \"p:\"\n").unwrap();
        assert_eq!(config.redis.key_prefix, "p:");
        assert_eq!(config.redis.url, "redis://localhost:6379");
        assert_eq!(config.sqlite.path, "alertflux.db");
    }

    #[test]
    fn test_malformed_yaml_is_configuration_error() {
        let err = ConfigManager::from_yaml_str("redis: [not a map").unwrap_err();
        assert!(matches!(
            err,
            crate::core::error::AlertFluxError::Configuration { .. }
        ));
    }
}
