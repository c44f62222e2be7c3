//! SQLite connector for the Reservoir pool

mod connection;
mod connector;

pub use connection::SqliteConnection;
pub use connector::SqliteConnector;
