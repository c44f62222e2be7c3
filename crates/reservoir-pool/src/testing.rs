//! Mock driver shared by the unit tests

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reservoir_core::{Connection, Connector, ReservoirError, Result};

/// Initialize logging for tests if not already initialized
pub(crate) fn init_test_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive("reservoir_pool=debug".parse().unwrap()),
            )
            .with_test_writer()
            .finish();

        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

/// Mock connection that records pings and can be told to fail or hang
pub(crate) struct MockConnection {
    pub(crate) id: u64,
    closed: AtomicBool,
    pings: AtomicUsize,
    closes: AtomicUsize,
    fail: AtomicBool,
    hang: AtomicBool,
    ping_delay: Mutex<Duration>,
    fail_all: Arc<AtomicBool>,
}

impl MockConnection {
    fn new(id: u64, fail_all: Arc<AtomicBool>) -> Self {
        Self {
            id,
            closed: AtomicBool::new(false),
            pings: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
            hang: AtomicBool::new(false),
            ping_delay: Mutex::new(Duration::ZERO),
            fail_all,
        }
    }

    pub(crate) fn standalone(id: u64) -> Self {
        Self::new(id, Arc::new(AtomicBool::new(false)))
    }

    pub(crate) fn pings(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    pub(crate) fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub(crate) fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn set_hanging(&self, hang: bool) {
        self.hang.store(hang, Ordering::SeqCst);
    }

    /// Make each `SELECT 1` take `delay` before answering.
    pub(crate) fn set_ping_delay(&self, delay: Duration) {
        *self.ping_delay.lock() = delay;
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn driver_name(&self) -> &str {
        "mock"
    }

    async fn execute(&self, sql: &str) -> Result<u64> {
        if self.is_closed() {
            return Err(ReservoirError::Query("connection is closed".into()));
        }
        if sql == "SELECT 1" {
            self.pings.fetch_add(1, Ordering::SeqCst);
            let delay = *self.ping_delay.lock();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
        if self.hang.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.fail.load(Ordering::SeqCst) || self.fail_all.load(Ordering::SeqCst) {
            return Err(ReservoirError::Query("server has gone away".into()));
        }
        Ok(0)
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Mock connector that counts opens and can inject failures and latency
#[derive(Default)]
pub(crate) struct MockConnector {
    next_id: AtomicU64,
    attempts: AtomicUsize,
    failures_remaining: AtomicUsize,
    always_fail: AtomicBool,
    open_delay: Mutex<Duration>,
    fail_pings: Arc<AtomicBool>,
    connections: Mutex<Vec<Arc<MockConnection>>>,
}

impl MockConnector {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of connections successfully opened
    pub(crate) fn opened(&self) -> usize {
        self.connections.lock().len()
    }

    /// Number of open attempts, including failed ones
    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub(crate) fn fail_next(&self, count: usize) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    pub(crate) fn set_always_fail(&self, fail: bool) {
        self.always_fail.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn set_open_delay(&self, delay: Duration) {
        *self.open_delay.lock() = delay;
    }

    /// Make every connection, existing and future, fail its pings.
    pub(crate) fn set_pings_failing(&self, fail: bool) {
        self.fail_pings.store(fail, Ordering::SeqCst);
    }

    /// The mock behind a handle given out by the pool
    pub(crate) fn mock_for(&self, handle: &Arc<dyn Connection>) -> Arc<MockConnection> {
        let target = Arc::as_ptr(handle) as *const ();
        self.connections
            .lock()
            .iter()
            .find(|conn| Arc::as_ptr(conn) as *const () == target)
            .cloned()
            .expect("unknown mock connection")
    }

    pub(crate) fn closed_count(&self) -> usize {
        self.connections
            .lock()
            .iter()
            .filter(|conn| conn.is_closed())
            .count()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self) -> Result<Arc<dyn Connection>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let delay = *self.open_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.always_fail.load(Ordering::SeqCst) {
            return Err(ReservoirError::Connect("connection refused".into()));
        }
        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(ReservoirError::Connect("connection refused".into()));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let conn = Arc::new(MockConnection::new(id, Arc::clone(&self.fail_pings)));
        self.connections.lock().push(Arc::clone(&conn));
        Ok(conn)
    }

    fn describe(&self) -> String {
        "mock://test".to_string()
    }
}
