//! Validation policy applied before a connection is handed out

use std::time::Duration;

use tokio::time::Instant;

use super::ping::ping_connection;
use crate::pool::{PhysicalConnection, ValidationState};

/// Decides when to probe a connection and records the outcome on it.
#[derive(Debug, Clone)]
pub struct HealthValidator {
    validation_timeout: Duration,
    skip_window: Duration,
}

impl HealthValidator {
    /// Create a validator.
    ///
    /// * `validation_timeout` - upper bound for a single probe
    /// * `skip_window` - connections used more recently than this are trusted
    pub fn new(validation_timeout: Duration, skip_window: Duration) -> Self {
        Self {
            validation_timeout,
            skip_window,
        }
    }

    pub fn validation_timeout(&self) -> Duration {
        self.validation_timeout
    }

    pub fn skip_window(&self) -> Duration {
        self.skip_window
    }

    /// Whether `connection` must be probed before it is handed out.
    ///
    /// A connection that has never been handed out is always probed. After
    /// that, the probe is skipped while the connection is still inside the
    /// freshness window.
    pub fn needs_validation(&self, connection: &PhysicalConnection, now: Instant) -> bool {
        !connection.has_been_handed_out() || connection.idle_for(now) > self.skip_window
    }

    /// Probe `connection` and store the result on it.
    ///
    /// Any failure, including a timeout or an already closed handle, yields
    /// [`ValidationState::Invalid`].
    pub async fn validate(&self, connection: &mut PhysicalConnection) -> ValidationState {
        let outcome = match ping_connection(connection.handle().as_ref(), self.validation_timeout)
            .await
        {
            Ok(latency) => {
                tracing::trace!(
                    connection_id = connection.id(),
                    latency_us = latency.as_micros() as u64,
                    "connection validated"
                );
                ValidationState::Valid
            }
            Err(e) => {
                tracing::debug!(
                    connection_id = connection.id(),
                    error = %e,
                    "connection failed validation"
                );
                ValidationState::Invalid
            }
        };
        connection.set_validation(outcome);
        outcome
    }
}
