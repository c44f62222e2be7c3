//! Pool configuration types

use std::path::Path;
use std::time::Duration;

use reservoir_core::{ReservoirError, Result};
use serde::{Deserialize, Serialize};

use crate::metrics::AlertConfig;
use crate::reconnect::ConnectRetryConfig;

/// Configuration for a connection pool
///
/// Controls pool sizing, timeouts, and connection lifecycle. The pool takes a
/// snapshot at construction; changing a value requires building a new pool.
///
/// Every field has a default, so a TOML file only needs the values it wants
/// to override:
///
/// ```toml
/// name = "orders"
/// max_pool_size = 20
/// min_idle = 4
/// connection_timeout_ms = 2000
///
/// [connect_retry]
/// max_attempts = 5
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Pool name used in logs and alerts
    name: String,
    /// Maximum number of connections (idle + leased)
    max_pool_size: usize,
    /// Number of idle connections the pool tries to keep ready
    min_idle: usize,
    /// Milliseconds an idle connection may sit unused before it is evicted
    idle_timeout_ms: u64,
    /// Maximum lifetime of a connection in milliseconds before it's recycled
    max_lifetime_ms: u64,
    /// Milliseconds a caller waits for a connection before timing out
    connection_timeout_ms: u64,
    /// Upper bound in milliseconds for a single liveness probe
    validation_timeout_ms: u64,
    /// Connections used within this many milliseconds skip validation
    validation_skip_window_ms: u64,
    /// Period of the background eviction sweep in milliseconds
    housekeeping_interval_ms: u64,
    /// Warn about leases held longer than this many milliseconds
    leak_detection_threshold_ms: Option<u64>,
    /// Retry policy for opening physical connections
    connect_retry: ConnectRetryConfig,
    /// Thresholds for saturation and validation alerts
    alerts: AlertConfig,
}

impl PoolConfig {
    /// Create a new pool configuration with the given minimum idle count and
    /// maximum pool size. Other values take their defaults.
    ///
    /// The values are checked by [`PoolConfig::validate`], which the pool runs
    /// at construction.
    pub fn new(min_idle: usize, max_pool_size: usize) -> Self {
        Self {
            min_idle,
            max_pool_size,
            ..Self::default()
        }
    }

    /// Parse a configuration from TOML text and validate it.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a configuration from a TOML file and validate it.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ReservoirError::Configuration(format!(
                "Failed to read pool config '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&text)
    }

    /// Check the configuration for inconsistent values.
    ///
    /// Requires `max_pool_size > 0`, `min_idle <= max_pool_size` and every
    /// timeout to be non-zero.
    pub fn validate(&self) -> Result<()> {
        if self.max_pool_size == 0 {
            return Err(ReservoirError::Configuration(
                "max_pool_size must be greater than 0".into(),
            ));
        }
        if self.min_idle > self.max_pool_size {
            return Err(ReservoirError::Configuration(format!(
                "min_idle ({}) cannot exceed max_pool_size ({})",
                self.min_idle, self.max_pool_size
            )));
        }

        let timeouts = [
            ("idle_timeout_ms", self.idle_timeout_ms),
            ("max_lifetime_ms", self.max_lifetime_ms),
            ("connection_timeout_ms", self.connection_timeout_ms),
            ("validation_timeout_ms", self.validation_timeout_ms),
            ("housekeeping_interval_ms", self.housekeeping_interval_ms),
        ];
        for (field, value) in timeouts {
            if value == 0 {
                return Err(ReservoirError::Configuration(format!(
                    "{} must be greater than 0",
                    field
                )));
            }
        }
        if self.leak_detection_threshold_ms == Some(0) {
            return Err(ReservoirError::Configuration(
                "leak_detection_threshold_ms must be greater than 0 when set".into(),
            ));
        }

        self.connect_retry.validate()?;
        self.alerts.validate()?;
        Ok(())
    }

    /// Set the pool name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the idle timeout in milliseconds
    pub fn with_idle_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.idle_timeout_ms = timeout_ms;
        self
    }

    /// Set the maximum connection lifetime in milliseconds
    pub fn with_max_lifetime_ms(mut self, lifetime_ms: u64) -> Self {
        self.max_lifetime_ms = lifetime_ms;
        self
    }

    /// Set the connection (acquire) timeout in milliseconds
    pub fn with_connection_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.connection_timeout_ms = timeout_ms;
        self
    }

    /// Set the validation timeout in milliseconds
    pub fn with_validation_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.validation_timeout_ms = timeout_ms;
        self
    }

    /// Set the freshness window inside which validation is skipped
    pub fn with_validation_skip_window_ms(mut self, window_ms: u64) -> Self {
        self.validation_skip_window_ms = window_ms;
        self
    }

    /// Set the eviction sweep period in milliseconds
    pub fn with_housekeeping_interval_ms(mut self, interval_ms: u64) -> Self {
        self.housekeeping_interval_ms = interval_ms;
        self
    }

    /// Enable leak detection for leases held longer than the threshold
    pub fn with_leak_detection_threshold_ms(mut self, threshold_ms: u64) -> Self {
        self.leak_detection_threshold_ms = Some(threshold_ms);
        self
    }

    /// Set the connect retry policy
    pub fn with_connect_retry(mut self, retry: ConnectRetryConfig) -> Self {
        self.connect_retry = retry;
        self
    }

    /// Set the alert thresholds
    pub fn with_alerts(mut self, alerts: AlertConfig) -> Self {
        self.alerts = alerts;
        self
    }

    /// Get the pool name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the maximum pool size
    pub fn max_pool_size(&self) -> usize {
        self.max_pool_size
    }

    /// Get the minimum idle count
    pub fn min_idle(&self) -> usize {
        self.min_idle
    }

    /// Get the idle timeout as a Duration
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// Get the maximum lifetime as a Duration
    pub fn max_lifetime(&self) -> Duration {
        Duration::from_millis(self.max_lifetime_ms)
    }

    /// Get the connection timeout as a Duration
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    /// Get the validation timeout as a Duration
    pub fn validation_timeout(&self) -> Duration {
        Duration::from_millis(self.validation_timeout_ms)
    }

    /// Get the validation freshness window as a Duration
    pub fn validation_skip_window(&self) -> Duration {
        Duration::from_millis(self.validation_skip_window_ms)
    }

    /// Get the housekeeping interval as a Duration
    pub fn housekeeping_interval(&self) -> Duration {
        Duration::from_millis(self.housekeeping_interval_ms)
    }

    /// Get the leak detection threshold if set
    pub fn leak_detection_threshold(&self) -> Option<Duration> {
        self.leak_detection_threshold_ms.map(Duration::from_millis)
    }

    /// Get the connect retry policy
    pub fn connect_retry(&self) -> &ConnectRetryConfig {
        &self.connect_retry
    }

    /// Get the alert thresholds
    pub fn alerts(&self) -> &AlertConfig {
        &self.alerts
    }
}

impl Default for PoolConfig {
    /// Create a default pool configuration
    ///
    /// Defaults:
    /// - max_pool_size: 10, min_idle: 1
    /// - connection_timeout: 30 seconds
    /// - idle_timeout: 10 minutes
    /// - max_lifetime: 30 minutes
    /// - validation_timeout: 5 seconds, skip window: 500ms
    /// - housekeeping_interval: 30 seconds
    fn default() -> Self {
        Self {
            name: "reservoir".to_string(),
            max_pool_size: 10,
            min_idle: 1,
            idle_timeout_ms: 600_000,
            max_lifetime_ms: 1_800_000,
            connection_timeout_ms: 30_000,
            validation_timeout_ms: 5_000,
            validation_skip_window_ms: 500,
            housekeeping_interval_ms: 30_000,
            leak_detection_threshold_ms: None,
            connect_retry: ConnectRetryConfig::default(),
            alerts: AlertConfig::default(),
        }
    }
}
