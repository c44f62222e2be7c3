//! Connection pooling for database connections
//!
//! This module provides the pool core: a bounded set of physical connections
//! split into idle and leased partitions, a FIFO wait queue for callers that
//! arrive while the pool is saturated, and the lease guard handed to callers.
//!
//! # Example
//!
//! ```ignore
//! use reservoir_pool::pool::{Pool, PoolConfig};
//!
//! let config = PoolConfig::new(1, 20)
//!     .with_connection_timeout_ms(5000)
//!     .with_idle_timeout_ms(300_000);
//!
//! let pool = Pool::new(config, connector)?;
//! let conn = pool.acquire().await?;
//! // Use connection...
//! // Connection returned to pool on drop
//! ```

mod config;
mod connection;
mod gate;
mod lease;
#[allow(clippy::module_inception)]
mod pool;
mod state;
mod stats;


pub use config::PoolConfig;
pub use connection::{LeaseState, PhysicalConnection, ValidationState};
pub use lease::PooledConnection;
pub use pool::Pool;
pub use stats::PoolStats;

pub(crate) use pool::{Shared, SlotReservation};
pub(crate) use state::PoolState;
