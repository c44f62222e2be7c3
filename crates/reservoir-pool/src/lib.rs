//! Reservoir Pool - Connection pooling for database connections
//!
//! This crate owns the physical connections opened through a
//! [`reservoir_core::Connector`] and lends them out to callers. It handles
//! bounded growth, fair FIFO waiting, health validation before hand-out,
//! background eviction of stale connections, connect retries and alerting.
//!
//! # Example
//!
//! ```ignore
//! use reservoir_pool::{Pool, PoolConfig};
//!
//! let config = PoolConfig::new(1, 10).with_connection_timeout_ms(5_000);
//! let pool = Pool::new(config, connector)?;
//!
//! let conn = pool.acquire().await?;
//! conn.execute("UPDATE accounts SET active = 1").await?;
//! // Connection returned to pool on drop
//! ```

pub mod health;
pub mod metrics;
pub mod pool;
mod reaper;
pub mod reconnect;

#[cfg(test)]
mod testing;

pub use health::{HealthValidator, PingError, PingResult, ping_connection};
pub use metrics::{
    Alert, AlertConfig, AlertKind, AlertSeverity, MetricsSnapshot, PoolMetrics, WaitBucket,
    WaitTimeDistribution,
};
pub use pool::{
    LeaseState, PhysicalConnection, Pool, PoolConfig, PoolStats, PooledConnection,
    ValidationState,
};
pub use reconnect::{ConnectRetryConfig, RetryingConnector};
pub use reservoir_core::{Connection, Connector, ReservoirError, Result};
