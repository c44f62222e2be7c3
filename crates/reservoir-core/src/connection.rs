//! Connection and connector traits

use std::sync::Arc;

use async_trait::async_trait;

use crate::Result;

/// A live physical connection to a database
///
/// Implementations wrap a driver handle. The pool shares the handle through an
/// `Arc` so that shutdown can signal a close to connections that are currently
/// leased, so every method takes `&self`.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the driver name (e.g., "sqlite", "postgresql", "mysql")
    fn driver_name(&self) -> &str;

    /// Execute a statement and return the number of affected rows
    async fn execute(&self, sql: &str) -> Result<u64>;

    /// Run the cheapest round-trip the driver supports.
    ///
    /// The default implementation executes `SELECT 1`.
    async fn ping(&self) -> Result<()> {
        if self.is_closed() {
            return Err(crate::ReservoirError::Validation(
                "connection is closed".into(),
            ));
        }
        self.execute("SELECT 1").await.map(|_| ())
    }

    /// Close the connection
    ///
    /// Must be idempotent: the pool may signal a close to a leased connection
    /// during shutdown and close it again when the lease is released.
    async fn close(&self) -> Result<()>;

    /// Check if the connection is closed
    fn is_closed(&self) -> bool;
}

/// Factory for physical connections
///
/// This is the adapter between the pool and a database driver.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a new physical connection
    async fn open(&self) -> Result<Arc<dyn Connection>>;

    /// Short description of the target, used in logs. Must not contain secrets.
    fn describe(&self) -> String {
        "database".to_string()
    }
}

#[async_trait]
impl<T: Connector> Connector for Arc<T> {
    async fn open(&self) -> Result<Arc<dyn Connection>> {
        (**self).open().await
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
