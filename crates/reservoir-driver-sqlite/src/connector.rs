//! SQLite connector

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reservoir_core::{Connection, Connector, ReservoirError, Result};
use rusqlite::{Connection as RusqliteConnection, OpenFlags};

use crate::SqliteConnection;

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    File(PathBuf),
    Memory,
}

/// Opens SQLite connections for a pool
///
/// File databases are opened in WAL mode so pooled connections can read while
/// another one writes. Every in-memory connection gets its own private
/// database.
#[derive(Debug, Clone)]
pub struct SqliteConnector {
    target: Target,
    busy_timeout: Duration,
}

impl SqliteConnector {
    /// Connector for a database file, created on first open if missing
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            target: Target::File(path.into()),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }

    /// Connector for private in-memory databases
    pub fn in_memory() -> Self {
        Self {
            target: Target::Memory,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }

    /// How long a statement waits on a locked database before failing
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn busy_timeout(&self) -> Duration {
        self.busy_timeout
    }

    fn open_blocking(target: &Target, busy_timeout: Duration) -> Result<RusqliteConnection> {
        let conn = match target {
            Target::Memory => RusqliteConnection::open_in_memory().map_err(|e| {
                ReservoirError::Connect(format!("Failed to open in-memory database: {}", e))
            })?,
            Target::File(path) => {
                check_parent_exists(path)?;
                let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_CREATE
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX;
                let conn = RusqliteConnection::open_with_flags(path, flags).map_err(|e| {
                    ReservoirError::Connect(format!(
                        "Failed to open SQLite database at '{}': {}",
                        path.display(),
                        e
                    ))
                })?;
                conn.pragma_update(None, "journal_mode", "WAL")
                    .map_err(|e| ReservoirError::Connect(format!("Failed to set journal mode: {}", e)))?;
                conn.pragma_update(None, "synchronous", "NORMAL").map_err(|e| {
                    ReservoirError::Connect(format!("Failed to set synchronous mode: {}", e))
                })?;
                conn
            }
        };

        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(|e| ReservoirError::Connect(format!("Failed to enable foreign keys: {}", e)))?;
        conn.busy_timeout(busy_timeout)
            .map_err(|e| ReservoirError::Connect(format!("Failed to set busy timeout: {}", e)))?;
        Ok(conn)
    }
}

/// A missing directory will not appear by retrying, so it is a configuration
/// error rather than a connect error.
fn check_parent_exists(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        return Err(ReservoirError::Configuration(format!(
            "Parent directory does not exist: {}",
            parent.display()
        )));
    }
    Ok(())
}

#[async_trait]
impl Connector for SqliteConnector {
    #[tracing::instrument(skip(self), fields(database = %self.describe()))]
    async fn open(&self) -> Result<Arc<dyn Connection>> {
        let target = self.target.clone();
        let busy_timeout = self.busy_timeout;
        let conn = tokio::task::spawn_blocking(move || Self::open_blocking(&target, busy_timeout))
            .await
            .map_err(|e| ReservoirError::Connect(format!("SQLite open task failed: {}", e)))??;

        tracing::debug!("SQLite connection opened");
        Ok(Arc::new(SqliteConnection::new(conn)))
    }

    fn describe(&self) -> String {
        match &self.target {
            Target::File(path) => format!("sqlite://{}", path.display()),
            Target::Memory => "sqlite::memory:".to_string(),
        }
    }
}
