//! Connector wrapper that retries transient open failures

use std::sync::Arc;
use std::time::Duration;

use reservoir_core::{Connection, Connector, Result};
use tokio::time::Instant;

use super::ConnectRetryConfig;

/// A connector that retries retryable open failures with backoff
///
/// Only errors for which [`reservoir_core::ReservoirError::is_retryable`] holds are retried.
/// The last error is surfaced once the attempts are used up, or as soon as
/// the next delay would end past the caller's deadline.
pub struct RetryingConnector {
    inner: Arc<dyn Connector>,
    policy: ConnectRetryConfig,
}

impl RetryingConnector {
    pub fn new(inner: Arc<dyn Connector>, config: &ConnectRetryConfig) -> Self {
        Self {
            inner,
            policy: config.clone(),
        }
    }

    /// Delay before retry `retry` (zero-based) under this connector's policy
    pub fn retry_delay(&self, retry: u32) -> Duration {
        self.policy.retry_delay(retry)
    }

    /// Description of the wrapped connector's target
    pub fn describe(&self) -> String {
        self.inner.describe()
    }

    /// Open a connection, retrying transient failures.
    pub async fn open(&self, deadline: Option<Instant>) -> Result<Arc<dyn Connection>> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let err = match self.inner.open().await {
                Ok(conn) => {
                    if attempt > 1 {
                        tracing::info!(
                            database = %self.inner.describe(),
                            attempt,
                            "connection opened after retry"
                        );
                    }
                    return Ok(conn);
                }
                Err(e) => e,
            };

            if !err.is_retryable() || attempt >= self.policy.max_attempts().max(1) {
                tracing::warn!(
                    database = %self.inner.describe(),
                    attempt,
                    error = %err,
                    "failed to open connection"
                );
                return Err(err);
            }

            let delay = self.policy.retry_delay(attempt - 1);
            if let Some(deadline) = deadline {
                if Instant::now() + delay >= deadline {
                    tracing::debug!(
                        database = %self.inner.describe(),
                        attempt,
                        error = %err,
                        "no time left to retry connection"
                    );
                    return Err(err);
                }
            }

            tracing::debug!(
                database = %self.inner.describe(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "retrying connection"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
