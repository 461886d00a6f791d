//! Configuration for the analytics layer
//!
//! Every struct has serde defaults so a partial TOML file is enough.
//! `AnalyticsConfig::from_env` reads `ANALYTICS_*` variables and falls back
//! to defaults on anything it cannot parse.

use crate::backend::{DuplicatePolicy, TsCreateOptions};
use crate::error::{AnalyticsError, Result};
use crate::time::Timeframe;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Settings applied when a time-series key is provisioned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeSeriesConfig {
    pub labels: BTreeMap<String, String>,
    /// 0 keeps samples forever
    pub retention_hrs: u64,
    pub duplicate_policy: DuplicatePolicy,
    /// Alter keys that already exist so their settings match this config
    pub reconcile_existing: bool,
}

impl Default for TimeSeriesConfig {
    fn default() -> Self {
        TimeSeriesConfig {
            labels: BTreeMap::new(),
            retention_hrs: 0,
            duplicate_policy: DuplicatePolicy::Last,
            reconcile_existing: false,
        }
    }
}

impl TimeSeriesConfig {
    pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }

    pub fn with_retention_hrs(mut self, hours: u64) -> Self {
        self.retention_hrs = hours;
        self
    }

    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn reconciling(mut self) -> Self {
        self.reconcile_existing = true;
        self
    }

    pub fn create_options(&self) -> TsCreateOptions {
        TsCreateOptions {
            retention_ms: self.retention_hrs * 60 * 60 * 1000,
            duplicate_policy: self.duplicate_policy,
            labels: self.labels.clone(),
        }
    }
}

/// Reservation parameters for a probabilistic set
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BloomConfig {
    pub error_rate: f64,
    pub capacity: u64,
}

impl Default for BloomConfig {
    fn default() -> Self {
        BloomConfig {
            error_rate: 0.01,
            capacity: 1_000_000,
        }
    }
}

impl BloomConfig {
    pub fn validate(&self) -> Result<()> {
        let rate_ok = self.error_rate > 0.0 && self.error_rate < 1.0;
        if !rate_ok || self.capacity == 0 {
            return Err(AnalyticsError::InvalidBloomConfig {
                error_rate: self.error_rate,
                capacity: self.capacity,
            });
        }
        Ok(())
    }
}

/// Overrides for what the backend handle advertises
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilityOverrides {
    pub supports_pipelining: Option<bool>,
    pub supports_native_group_by: Option<bool>,
}

/// Log output settings for binaries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    /// JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// Check the backend contract when the facade is created
    pub validate_client_contract: bool,
    /// Window used for lifetime series of approximate-counting stores
    pub lifetime_series_timeframe: Timeframe,
    pub bloom: BloomConfig,
    pub timeseries: TimeSeriesConfig,
    pub capabilities: CapabilityOverrides,
    pub logging: LoggingConfig,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        AnalyticsConfig {
            validate_client_contract: true,
            lifetime_series_timeframe: Timeframe::LastYear,
            bloom: BloomConfig::default(),
            timeseries: TimeSeriesConfig::default(),
            capabilities: CapabilityOverrides::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AnalyticsConfig {
    /// Config for tests: quiet logs, contract checked
    pub fn test() -> Self {
        AnalyticsConfig {
            logging: LoggingConfig {
                level: "warn".to_string(),
                json: false,
            },
            ..Self::default()
        }
    }

    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: AnalyticsConfig =
            toml::from_str(input).map_err(|e| AnalyticsError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| AnalyticsError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&raw)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        AnalyticsConfig {
            validate_client_contract: std::env::var("ANALYTICS_VALIDATE_CONTRACT")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(defaults.validate_client_contract),
            lifetime_series_timeframe: std::env::var("ANALYTICS_LIFETIME_SERIES_TIMEFRAME")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|tf: &Timeframe| !tf.is_lifetime())
                .unwrap_or(defaults.lifetime_series_timeframe),
            bloom: BloomConfig {
                error_rate: std::env::var("ANALYTICS_BLOOM_ERROR_RATE")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.bloom.error_rate),
                capacity: std::env::var("ANALYTICS_BLOOM_CAPACITY")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.bloom.capacity),
            },
            timeseries: TimeSeriesConfig {
                retention_hrs: std::env::var("ANALYTICS_RETENTION_HRS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.timeseries.retention_hrs),
                reconcile_existing: std::env::var("ANALYTICS_RECONCILE_EXISTING")
                    .map(|v| v == "true" || v == "1")
                    .unwrap_or(false),
                ..defaults.timeseries
            },
            capabilities: CapabilityOverrides::default(),
            logging: LoggingConfig {
                level: std::env::var("ANALYTICS_LOG_LEVEL").unwrap_or(defaults.logging.level),
                json: std::env::var("ANALYTICS_LOG_JSON")
                    .map(|v| v == "true" || v == "1")
                    .unwrap_or(false),
            },
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.bloom.validate()?;
        if self.lifetime_series_timeframe.is_lifetime() {
            return Err(AnalyticsError::Config(
                "lifetime_series_timeframe must be a bounded timeframe".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AnalyticsConfig::default();
        assert!(config.validate_client_contract);
        assert_eq!(config.lifetime_series_timeframe, Timeframe::LastYear);
        assert_eq!(config.bloom.error_rate, 0.01);
        assert_eq!(config.bloom.capacity, 1_000_000);
        assert_eq!(config.timeseries.duplicate_policy, DuplicatePolicy::Last);
        assert!(!config.timeseries.reconcile_existing);
    }

    #[test]
    fn test_partial_toml() {
        let config = AnalyticsConfig::from_toml_str(
            r#"
            lifetime_series_timeframe = "1m"

            [bloom]
            capacity = 5000

            [timeseries]
            retention_hrs = 48
            duplicate_policy = "SUM"
            "#,
        )
        .unwrap();
        assert_eq!(config.lifetime_series_timeframe, Timeframe::LastMonth);
        assert_eq!(config.bloom.capacity, 5000);
        assert_eq!(config.bloom.error_rate, 0.01);
        assert_eq!(config.timeseries.create_options().retention_ms, 48 * 3_600_000);
        assert_eq!(config.timeseries.duplicate_policy, DuplicatePolicy::Sum);
    }

    #[test]
    fn test_rejects_invalid_bloom() {
        let err = AnalyticsConfig::from_toml_str("[bloom]\nerror_rate = 1.5\n").unwrap_err();
        assert!(matches!(err, AnalyticsError::InvalidBloomConfig { .. }));
        assert!(BloomConfig { error_rate: 0.1, capacity: 0 }.validate().is_err());
    }

    #[test]
    fn test_rejects_lifetime_series_window() {
        let err = AnalyticsConfig::from_toml_str("lifetime_series_timeframe = \"lifetime\"\n")
            .unwrap_err();
        assert!(matches!(err, AnalyticsError::Config(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "validate_client_contract = false").unwrap();
        let config = AnalyticsConfig::from_file(file.path()).unwrap();
        assert!(!config.validate_client_contract);

        assert!(AnalyticsConfig::from_file("/nonexistent/analytics.toml").is_err());
    }
}
