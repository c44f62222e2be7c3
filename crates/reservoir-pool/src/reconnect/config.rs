//! Retry policy for opening physical connections

use std::time::Duration;

use rand::Rng;
use reservoir_core::{ReservoirError, Result};
use serde::{Deserialize, Serialize};

/// How failed connection opens are retried
///
/// The delay before retry `n` (zero-based) is
/// `min(initial_backoff * multiplier^n, max_backoff)`. With jitter enabled the
/// first half of that delay is kept and the second half is randomized, so
/// pools that lost the same database spread their reconnects out while every
/// delay still grows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectRetryConfig {
    /// Total open attempts, including the first one
    max_attempts: u32,
    /// Delay in milliseconds before the first retry
    initial_backoff_ms: u64,
    /// Cap on the delay between attempts in milliseconds
    max_backoff_ms: u64,
    /// Growth factor between consecutive delays
    multiplier: f64,
    /// Randomize the upper half of each delay
    jitter: bool,
}

impl ConnectRetryConfig {
    /// Create a retry configuration with the given attempt count and default
    /// backoff.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// A configuration that never retries.
    pub fn disabled() -> Self {
        Self::new(1)
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_backoff_ms(mut self, initial_ms: u64, max_ms: u64) -> Self {
        self.initial_backoff_ms = initial_ms;
        self.max_backoff_ms = max_ms;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn jitter(&self) -> bool {
        self.jitter
    }

    /// Upper bound of the delay before retry `retry` (zero-based).
    pub fn base_delay(&self, retry: u32) -> Duration {
        let exponent = retry.min(i32::MAX as u32) as i32;
        let grown = self.initial_backoff_ms as f64 * self.multiplier.max(1.0).powi(exponent);
        let capped = grown.min(self.max_backoff_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }

    /// Delay to sleep before retry `retry` (zero-based).
    ///
    /// Without jitter this is [`base_delay`](Self::base_delay); with jitter it
    /// lies between half of it and all of it.
    pub fn retry_delay(&self, retry: u32) -> Duration {
        let base = self.base_delay(retry);
        if !self.jitter {
            return base;
        }
        let base_ms = base.as_millis() as u64;
        let fixed = base_ms - base_ms / 2;
        let spread = rand::thread_rng().gen_range(0..=base_ms / 2);
        Duration::from_millis(fixed + spread)
    }

    /// Check the configuration for inconsistent values.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(ReservoirError::Configuration(
                "connect_retry.max_attempts must be at least 1".into(),
            ));
        }
        if self.initial_backoff_ms == 0 {
            return Err(ReservoirError::Configuration(
                "connect_retry.initial_backoff_ms must be greater than 0".into(),
            ));
        }
        if self.max_backoff_ms < self.initial_backoff_ms {
            return Err(ReservoirError::Configuration(format!(
                "connect_retry.max_backoff_ms ({}) cannot be below initial_backoff_ms ({})",
                self.max_backoff_ms, self.initial_backoff_ms
            )));
        }
        if self.multiplier.is_nan() || self.multiplier < 1.0 {
            return Err(ReservoirError::Configuration(
                "connect_retry.multiplier must be at least 1.0".into(),
            ));
        }
        Ok(())
    }
}

impl Default for ConnectRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 50,
            max_backoff_ms: 2_000,
            multiplier: 2.0,
            jitter: true,
        }
    }
}
