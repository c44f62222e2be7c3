//! Bounded retry for opening physical connections
//!
//! Transient connect failures are retried with exponential backoff and
//! jitter. Retrying stops after a fixed number of attempts or when the next
//! delay would run past the caller's deadline.
//!
//! # Example
//!
//! ```ignore
//! use reservoir_pool::reconnect::{ConnectRetryConfig, RetryingConnector};
//!
//! let retry = ConnectRetryConfig::default().with_max_attempts(5);
//! let connector = RetryingConnector::new(Arc::new(my_connector), &retry);
//! let handle = connector.open(Some(deadline)).await?;
//! ```

mod config;
mod connector;

#[cfg(test)]
mod tests;

pub use config::ConnectRetryConfig;
pub use connector::RetryingConnector;
