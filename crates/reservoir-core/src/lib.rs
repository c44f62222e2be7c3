//! Reservoir Core - Driver-facing abstractions for the connection pool
//!
//! This crate provides the traits and types that the pool and every driver
//! adapter depend on. It defines:
//!
//! - `Connection` - A live physical connection to a database
//! - `Connector` - The factory that opens physical connections
//! - `ReservoirError` - The error taxonomy shared by the whole workspace

mod connection;
mod error;

pub use connection::*;
pub use error::*;
