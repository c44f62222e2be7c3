//! Bounded liveness probe
//!
//! Runs the driver's cheapest round-trip under a timeout and measures the
//! response time.

use std::time::Duration;

use reservoir_core::Connection;
use tokio::time::Instant;

/// Result of a ping operation
pub type PingResult = std::result::Result<Duration, PingError>;

/// Error that can occur during a ping operation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PingError {
    /// The connection is closed
    #[error("Connection is closed")]
    ConnectionClosed,
    /// The round-trip failed
    #[error("Ping failed: {0}")]
    Failed(String),
    /// Ping did not complete in time
    #[error("Ping timed out after {0:?}")]
    Timeout(Duration),
}

/// Ping a connection to check if it's alive.
///
/// Executes [`Connection::ping`] bounded by `timeout` and returns the
/// round-trip time.
///
/// # Returns
///
/// * `Ok(Duration)` - The round-trip time if the ping succeeded
/// * `Err(PingError)` - If the connection is closed, the probe failed or it
///   did not finish within `timeout`
pub async fn ping_connection(conn: &dyn Connection, timeout: Duration) -> PingResult {
    if conn.is_closed() {
        return Err(PingError::ConnectionClosed);
    }

    let start = Instant::now();
    match tokio::time::timeout(timeout, conn.ping()).await {
        Ok(Ok(())) => Ok(start.elapsed()),
        Ok(Err(e)) => Err(PingError::Failed(e.to_string())),
        Err(_) => Err(PingError::Timeout(timeout)),
    }
}
