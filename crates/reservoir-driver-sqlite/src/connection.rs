//! SQLite connection implementation

use async_trait::async_trait;
use parking_lot::Mutex;
use reservoir_core::{Connection, ReservoirError, Result};
use rusqlite::Connection as RusqliteConnection;

/// A single SQLite database handle
///
/// The handle is dropped on [`Connection::close`]; later calls fail instead of
/// reopening the file.
pub struct SqliteConnection {
    conn: Mutex<Option<RusqliteConnection>>,
}

impl SqliteConnection {
    pub(crate) fn new(conn: RusqliteConnection) -> Self {
        Self {
            conn: Mutex::new(Some(conn)),
        }
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&RusqliteConnection) -> rusqlite::Result<T>,
    ) -> Result<T> {
        let guard = self.conn.lock();
        let conn = guard
            .as_ref()
            .ok_or_else(|| ReservoirError::Query("connection is closed".into()))?;
        f(conn).map_err(|e| ReservoirError::Query(e.to_string()))
    }
}

#[async_trait]
impl Connection for SqliteConnection {
    fn driver_name(&self) -> &str {
        "sqlite"
    }

    async fn execute(&self, sql: &str) -> Result<u64> {
        tracing::debug!(sql = %sql, "executing SQLite statement");
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            if stmt.column_count() > 0 {
                // Statements that return rows report how many they produced.
                let mut rows = stmt.query([])?;
                let mut count = 0u64;
                while rows.next()?.is_some() {
                    count += 1;
                }
                Ok(count)
            } else {
                stmt.execute([]).map(|affected| affected as u64)
            }
        })
    }

    async fn ping(&self) -> Result<()> {
        let guard = self.conn.lock();
        let conn = guard
            .as_ref()
            .ok_or_else(|| ReservoirError::Validation("connection is closed".into()))?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map(|_| ())
            .map_err(|e| ReservoirError::Validation(e.to_string()))
    }

    async fn close(&self) -> Result<()> {
        let Some(conn) = self.conn.lock().take() else {
            return Ok(());
        };
        tracing::debug!("closing SQLite connection");
        conn.close()
            .map_err(|(_, e)| ReservoirError::Query(format!("Failed to close connection: {}", e)))
    }

    fn is_closed(&self) -> bool {
        self.conn.lock().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_connection() -> SqliteConnection {
        SqliteConnection::new(RusqliteConnection::open_in_memory().unwrap())
    }

    #[tokio::test]
    async fn test_execute_reports_affected_rows() {
        let conn = memory_connection();
        conn.execute("CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT)")
            .await
            .unwrap();
        conn.execute("INSERT INTO items (name) VALUES ('a'), ('b'), ('c')")
            .await
            .unwrap();

        let updated = conn
            .execute("UPDATE items SET name = 'z' WHERE id > 1")
            .await
            .unwrap();
        assert_eq!(updated, 2);

        let selected = conn.execute("SELECT * FROM items").await.unwrap();
        assert_eq!(selected, 3);
    }

    #[tokio::test]
    async fn test_ping_and_close() {
        let conn = memory_connection();
        assert!(conn.ping().await.is_ok());
        assert!(!conn.is_closed());

        conn.close().await.unwrap();
        assert!(conn.is_closed());
        // Idempotent
        conn.close().await.unwrap();

        assert!(matches!(
            conn.ping().await,
            Err(ReservoirError::Validation(_))
        ));
        assert!(matches!(
            conn.execute("SELECT 1").await,
            Err(ReservoirError::Query(_))
        ));
    }

    #[tokio::test]
    async fn test_bad_sql_is_query_error() {
        let conn = memory_connection();
        let err = conn.execute("SELEC nonsense").await.unwrap_err();
        assert!(matches!(err, ReservoirError::Query(_)));
        assert_eq!(conn.driver_name(), "sqlite");
    }
}
