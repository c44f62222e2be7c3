//! Saturation and validation failure alerts

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use reservoir_core::{ReservoirError, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::Instant;

const ALERT_CHANNEL_CAPACITY: usize = 64;

/// Thresholds for pool alerts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Alert when more than this many callers are waiting
    waiting_threshold: usize,
    /// How long, in milliseconds, the waiting count must stay above the
    /// threshold before an alert is raised
    saturation_window_ms: u64,
    /// Failure fraction (0.0 to 1.0) above which validation failures alert
    validation_failure_rate: f64,
    /// Sliding window in milliseconds for the failure rate
    validation_window_ms: u64,
    /// Minimum samples in the window before the rate is considered
    min_validation_samples: usize,
}

impl AlertConfig {
    pub fn with_waiting_threshold(mut self, threshold: usize) -> Self {
        self.waiting_threshold = threshold;
        self
    }

    pub fn with_saturation_window_ms(mut self, window_ms: u64) -> Self {
        self.saturation_window_ms = window_ms;
        self
    }

    pub fn with_validation_failure_rate(mut self, rate: f64) -> Self {
        self.validation_failure_rate = rate;
        self
    }

    pub fn with_validation_window_ms(mut self, window_ms: u64) -> Self {
        self.validation_window_ms = window_ms;
        self
    }

    pub fn with_min_validation_samples(mut self, samples: usize) -> Self {
        self.min_validation_samples = samples;
        self
    }

    pub fn waiting_threshold(&self) -> usize {
        self.waiting_threshold
    }

    pub fn saturation_window(&self) -> Duration {
        Duration::from_millis(self.saturation_window_ms)
    }

    pub fn validation_failure_rate(&self) -> f64 {
        self.validation_failure_rate
    }

    pub fn validation_window(&self) -> Duration {
        Duration::from_millis(self.validation_window_ms)
    }

    pub fn min_validation_samples(&self) -> usize {
        self.min_validation_samples
    }

    /// Check the configuration for inconsistent values.
    pub fn validate(&self) -> Result<()> {
        if self.saturation_window_ms == 0 || self.validation_window_ms == 0 {
            return Err(ReservoirError::Configuration(
                "alert windows must be greater than 0".into(),
            ));
        }
        if !(self.validation_failure_rate > 0.0 && self.validation_failure_rate <= 1.0) {
            return Err(ReservoirError::Configuration(format!(
                "alerts.validation_failure_rate must be in (0, 1], got {}",
                self.validation_failure_rate
            )));
        }
        if self.min_validation_samples == 0 {
            return Err(ReservoirError::Configuration(
                "alerts.min_validation_samples must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            waiting_threshold: 0,
            saturation_window_ms: 10_000,
            validation_failure_rate: 0.5,
            validation_window_ms: 60_000,
            min_validation_samples: 5,
        }
    }
}

/// How urgent an alert is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    /// A previously raised condition cleared
    Info,
    /// Sustained saturation
    Warning,
    /// Systemic validation failures, the database is likely unreachable
    Critical,
}

/// The condition an alert is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    PoolSaturated,
    ValidationFailureRate,
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertKind::PoolSaturated => write!(f, "pool_saturated"),
            AlertKind::ValidationFailureRate => write!(f, "validation_failure_rate"),
        }
    }
}

/// An alert published to subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub severity: AlertSeverity,
    pub kind: AlertKind,
    pub pool: String,
    pub message: String,
    pub raised_at: DateTime<Utc>,
}

impl Alert {
    /// Whether this alert announces that its condition cleared
    pub fn is_recovery(&self) -> bool {
        self.severity == AlertSeverity::Info
    }
}

#[derive(Default)]
struct MonitorState {
    saturated_since: Option<Instant>,
    saturation_alerted: bool,
    validations: VecDeque<(Instant, bool)>,
    validation_alerted: bool,
}

/// Watches pool observations and raises latched alerts
///
/// Each condition raises one alert per episode and a recovery alert when it
/// clears.
pub(crate) struct AlertMonitor {
    pool: String,
    config: AlertConfig,
    tx: broadcast::Sender<Alert>,
    state: Mutex<MonitorState>,
}

impl AlertMonitor {
    pub(crate) fn new(pool: &str, config: AlertConfig) -> Self {
        let (tx, _) = broadcast::channel(ALERT_CHANNEL_CAPACITY);
        Self {
            pool: pool.to_string(),
            config,
            tx,
            state: Mutex::new(MonitorState::default()),
        }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<Alert> {
        self.tx.subscribe()
    }

    /// Record the current number of waiting callers.
    pub(crate) fn observe_waiting(&self, waiting: usize, now: Instant) {
        let mut state = self.state.lock();
        if waiting > self.config.waiting_threshold {
            let since = *state.saturated_since.get_or_insert(now);
            let sustained = now.saturating_duration_since(since);
            if !state.saturation_alerted && sustained >= self.config.saturation_window() {
                state.saturation_alerted = true;
                self.emit(
                    AlertSeverity::Warning,
                    AlertKind::PoolSaturated,
                    format!(
                        "{} callers waiting for a connection for {}ms",
                        waiting,
                        sustained.as_millis()
                    ),
                );
            }
        } else {
            state.saturated_since = None;
            if state.saturation_alerted {
                state.saturation_alerted = false;
                self.emit(
                    AlertSeverity::Info,
                    AlertKind::PoolSaturated,
                    "waiting callers back under threshold".to_string(),
                );
            }
        }
    }

    /// Record the outcome of one validation.
    pub(crate) fn observe_validation(&self, valid: bool, now: Instant) {
        let mut state = self.state.lock();
        state.validations.push_back((now, valid));
        let window = self.config.validation_window();
        while let Some(&(at, _)) = state.validations.front() {
            if now.saturating_duration_since(at) > window {
                state.validations.pop_front();
            } else {
                break;
            }
        }

        let samples = state.validations.len();
        if samples < self.config.min_validation_samples {
            return;
        }
        let failures = state.validations.iter().filter(|(_, ok)| !ok).count();
        let rate = failures as f64 / samples as f64;

        if rate > self.config.validation_failure_rate {
            if !state.validation_alerted {
                state.validation_alerted = true;
                self.emit(
                    AlertSeverity::Critical,
                    AlertKind::ValidationFailureRate,
                    format!(
                        "{} of the last {} validations failed ({:.0}%)",
                        failures,
                        samples,
                        rate * 100.0
                    ),
                );
            }
        } else if state.validation_alerted {
            state.validation_alerted = false;
            self.emit(
                AlertSeverity::Info,
                AlertKind::ValidationFailureRate,
                format!("validation failure rate recovered to {:.0}%", rate * 100.0),
            );
        }
    }

    fn emit(&self, severity: AlertSeverity, kind: AlertKind, message: String) {
        match severity {
            AlertSeverity::Critical => {
                tracing::error!(pool = %self.pool, kind = %kind, "{}", message)
            }
            AlertSeverity::Warning => {
                tracing::warn!(pool = %self.pool, kind = %kind, "{}", message)
            }
            AlertSeverity::Info => tracing::info!(pool = %self.pool, kind = %kind, "{}", message),
        }

        let alert = Alert {
            severity,
            kind,
            pool: self.pool.clone(),
            message,
            raised_at: Utc::now(),
        };
        // No subscribers is fine.
        let _ = self.tx.send(alert);
    }
}
