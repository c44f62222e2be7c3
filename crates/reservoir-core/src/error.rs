//! Error types for Reservoir

use std::time::Duration;

use thiserror::Error;

/// Core error type for Reservoir operations
#[derive(Error, Debug)]
pub enum ReservoirError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Connect error: {0}")]
    Connect(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Timed out waiting for connection (timeout: {0:?})")]
    Timeout(Duration),

    #[error("Pool is closed")]
    PoolClosed,

    #[error("Query error: {0}")]
    Query(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReservoirError {
    /// Whether retrying the failed operation may succeed.
    ///
    /// Connect and IO failures are usually transient; configuration errors and
    /// a closed pool are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ReservoirError::Connect(_) | ReservoirError::Io(_) | ReservoirError::Timeout(_)
        )
    }

    /// Whether this error means the pool can no longer serve requests.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ReservoirError::Configuration(_) | ReservoirError::PoolClosed
        )
    }
}

impl From<toml::de::Error> for ReservoirError {
    fn from(err: toml::de::Error) -> Self {
        ReservoirError::Configuration(err.to_string())
    }
}

/// Result type alias for Reservoir operations
pub type Result<T> = std::result::Result<T, ReservoirError>;
