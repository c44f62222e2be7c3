//! Health validation for pooled connections
//!
//! This module provides the bounded liveness probe and the policy that decides
//! when a connection must be probed before it is handed out.
//!
//! # Example
//!
//! ```ignore
//! use reservoir_pool::health::{ping_connection, HealthValidator};
//!
//! // One-off probe
//! let latency = ping_connection(handle.as_ref(), Duration::from_secs(1)).await?;
//!
//! // Pool policy
//! let validator = HealthValidator::new(Duration::from_secs(5), Duration::from_millis(500));
//! if validator.needs_validation(&connection, Instant::now()) {
//!     validator.validate(&mut connection).await;
//! }
//! ```

mod ping;
mod validator;


pub use ping::{PingError, PingResult, ping_connection};
pub use validator::HealthValidator;
