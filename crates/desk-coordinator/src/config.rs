//! Application configuration.

use crate::error::{CoordinatorError, CoordinatorResult};
use desk_core::StalenessThresholds;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Coordinator tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Timeout for initial key-value snapshot fetches (ms).
    #[serde(default = "default_kv_timeout_ms")]
    pub kv_timeout_ms: u64,
    /// Interval between failed-subscription retry sweeps (ms).
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
    /// User id for the per-user order-update channel, when known.
    #[serde(default)]
    pub user: Option<String>,
}

fn default_kv_timeout_ms() -> u64 {
    2_000
}

fn default_retry_interval_ms() -> u64 {
    5_000
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            kv_timeout_ms: default_kv_timeout_ms(),
            retry_interval_ms: default_retry_interval_ms(),
            user: None,
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Log filter directive, e.g. "info,desk=debug".
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub staleness: StalenessThresholds,
}

fn default_log_filter() -> String {
    "info,desk=debug".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
            coordinator: CoordinatorConfig::default(),
            staleness: StalenessThresholds::default(),
        }
    }
}

impl AppConfig {
    /// Load from `DESKGUARD_CONFIG` or the default path, falling back to
    /// defaults when the file is absent.
    pub fn load() -> CoordinatorResult<Self> {
        let config_path =
            std::env::var("DESKGUARD_CONFIG").unwrap_or_else(|_| "config/default.toml".to_string());

        if Path::new(&config_path).exists() {
            Self::from_file(&config_path)
        } else {
            tracing::warn!(path = %config_path, "config file not found, using defaults");
            Ok(Self::default())
        }
    }

    pub fn from_file(path: &str) -> CoordinatorResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CoordinatorError::Config(format!("failed to read config: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| CoordinatorError::Config(format!("failed to parse config: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.coordinator.kv_timeout_ms, 2_000);
        assert_eq!(config.coordinator.retry_interval_ms, 5_000);
        assert!(config.coordinator.user.is_none());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            log_filter = "debug"

            [coordinator]
            retry_interval_ms = 1000

            [staleness]
            price_max_age_ms = 2500
            "#,
        )
        .unwrap();
        assert_eq!(config.log_filter, "debug");
        assert_eq!(config.coordinator.retry_interval_ms, 1_000);
        assert_eq!(config.coordinator.kv_timeout_ms, 2_000);
        assert_eq!(config.staleness.price_max_age_ms, 2_500);
    }
}
