//! Connection pool implementation

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use reservoir_core::{Connection, Connector, ReservoirError, Result};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::config::PoolConfig;
use super::connection::{PhysicalConnection, ValidationState};
use super::gate::{Handoff, WaitGuard};
use super::lease::PooledConnection;
use super::state::PoolState;
use super::stats::PoolStats;
use crate::health::HealthValidator;
use crate::metrics::{Alert, AlertMonitor, MetricsSnapshot, PoolMetrics};
use crate::reaper;
use crate::reconnect::RetryingConnector;

/// State shared between pool handles, leases, waiters and the reaper
pub(crate) struct Shared {
    pub(crate) config: PoolConfig,
    pub(crate) connector: RetryingConnector,
    pub(crate) validator: HealthValidator,
    pub(crate) state: Mutex<PoolState>,
    pub(crate) metrics: PoolMetrics,
    pub(crate) alerts: AlertMonitor,
    pub(crate) shutdown: CancellationToken,
    next_connection_id: AtomicU64,
}

/// Capacity reserved for one connection that is being opened
///
/// Dropping an unfulfilled reservation gives the capacity back, so a caller
/// that gives up mid-open cannot shrink the pool.
pub(crate) struct SlotReservation<'a> {
    shared: &'a Arc<Shared>,
    armed: bool,
}

impl<'a> SlotReservation<'a> {
    /// Adopt a slot already counted in `PoolState::pending`.
    pub(crate) fn adopt(shared: &'a Arc<Shared>) -> Self {
        Self {
            shared,
            armed: true,
        }
    }

    /// Turn the reservation into a lease for `connection`.
    fn fulfill(mut self, connection: PhysicalConnection) -> Result<PooledConnection> {
        self.armed = false;
        let mut state = self.shared.state.lock();
        state.pending -= 1;
        if state.closed {
            self.shared.free_slot_locked(&mut state);
            drop(state);
            self.shared
                .close_in_background(connection.id(), Arc::clone(connection.handle()), "pool closed");
            return Err(ReservoirError::PoolClosed);
        }
        state.record_lease(&connection, Instant::now());
        drop(state);
        Ok(PooledConnection::new(connection, Arc::clone(self.shared)))
    }

    /// Turn the reservation into an idle connection, or a handoff to the
    /// oldest waiter.
    pub(crate) fn install_idle(mut self, connection: PhysicalConnection) {
        self.armed = false;
        let mut state = self.shared.state.lock();
        state.pending -= 1;
        if state.closed {
            drop(state);
            self.shared
                .close_in_background(connection.id(), Arc::clone(connection.handle()), "pool closed");
            return;
        }
        self.shared
            .return_idle_locked(&mut state, connection, Instant::now());
    }
}

impl Drop for SlotReservation<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.shared.state.lock();
            state.pending -= 1;
            self.shared.free_slot_locked(&mut state);
        }
    }
}

enum Step {
    Reuse(PooledConnection),
    Grow,
    Wait(u64, tokio::sync::oneshot::Receiver<Handoff>),
}

impl Shared {
    fn next_id(&self) -> u64 {
        self.next_connection_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Acquire a connection, waiting at most until `deadline`.
    ///
    /// `timeout` is only reported back in the timeout error.
    pub(crate) async fn acquire_until(
        self: &Arc<Self>,
        deadline: Instant,
        timeout: Duration,
    ) -> Result<PooledConnection> {
        let mut fresh_failures = 0u32;
        loop {
            let step = {
                let mut state = self.state.lock();
                if state.closed {
                    return Err(ReservoirError::PoolClosed);
                }
                let now = Instant::now();
                if now >= deadline {
                    return Err(ReservoirError::Timeout(timeout));
                }
                if let Some(connection) = self.checkout_idle_locked(&mut state, now) {
                    Step::Reuse(PooledConnection::new(connection, Arc::clone(self)))
                } else if state.total() < self.config.max_pool_size() {
                    state.pending += 1;
                    Step::Grow
                } else {
                    let (id, rx) = state.waiters.enqueue(now);
                    self.alerts.observe_waiting(state.waiters.len(), now);
                    Step::Wait(id, rx)
                }
            };

            match step {
                Step::Reuse(lease) => {
                    if let Some(lease) = self.admit(lease).await {
                        return Ok(lease);
                    }
                }
                Step::Grow => {
                    let reservation = SlotReservation::adopt(self);
                    let connection = self.open_connection(Some(deadline), timeout).await?;
                    let lease = reservation.fulfill(connection)?;
                    if let Some(lease) = self.admit(lease).await {
                        return Ok(lease);
                    }
                    fresh_failures += 1;
                    self.pause_after_fresh_failure(fresh_failures, deadline)
                        .await;
                }
                Step::Wait(id, rx) => {
                    let mut guard = WaitGuard::new(Arc::clone(self), id, rx);
                    match guard.wait(deadline).await {
                        None => {
                            tracing::debug!(
                                pool = %self.config.name(),
                                timeout_ms = timeout.as_millis() as u64,
                                "timed out waiting for a connection"
                            );
                            return Err(ReservoirError::Timeout(timeout));
                        }
                        Some(Handoff::Closed) => return Err(ReservoirError::PoolClosed),
                        Some(Handoff::Connection(connection)) => {
                            let lease = PooledConnection::new(connection, Arc::clone(self));
                            if let Some(lease) = self.admit(lease).await {
                                return Ok(lease);
                            }
                        }
                        Some(Handoff::Slot) => {
                            let reservation = SlotReservation::adopt(self);
                            match self.open_connection(Some(deadline), timeout).await {
                                Ok(connection) => {
                                    let lease = reservation.fulfill(connection)?;
                                    if let Some(lease) = self.admit(lease).await {
                                        return Ok(lease);
                                    }
                                    fresh_failures += 1;
                                    self.pause_after_fresh_failure(fresh_failures, deadline)
                                        .await;
                                }
                                Err(ReservoirError::Timeout(t)) => {
                                    return Err(ReservoirError::Timeout(t));
                                }
                                Err(e) => {
                                    // Absorbed: the slot goes back to the pool and
                                    // this caller retries within its deadline.
                                    tracing::warn!(
                                        pool = %self.config.name(),
                                        error = %e,
                                        "failed to open replacement connection"
                                    );
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    /// Back off after a newly opened connection failed validation.
    async fn pause_after_fresh_failure(&self, failures: u32, deadline: Instant) {
        let delay = self.connector.retry_delay(failures.saturating_sub(1));
        tokio::time::sleep_until((Instant::now() + delay).min(deadline)).await;
    }

    /// Take the most recently used idle connection that has not expired.
    ///
    /// Expired entries found on the way are destroyed.
    fn checkout_idle_locked(
        &self,
        state: &mut PoolState,
        now: Instant,
    ) -> Option<PhysicalConnection> {
        while let Some(mut connection) = state.pop_most_recently_used() {
            if connection.is_expired(self.config.max_lifetime(), now) {
                connection.mark_closed();
                self.close_in_background(
                    connection.id(),
                    Arc::clone(connection.handle()),
                    "max lifetime exceeded",
                );
                self.free_slot_locked(state);
                continue;
            }
            state.record_lease(&connection, now);
            return Some(connection);
        }
        None
    }

    /// Apply hand-out policy: lifetime check, then validation unless fresh.
    async fn admit(&self, mut lease: PooledConnection) -> Option<PooledConnection> {
        let now = Instant::now();
        if lease.physical().is_expired(self.config.max_lifetime(), now) {
            lease.discard("max lifetime exceeded");
            return None;
        }

        if self.validator.needs_validation(lease.physical(), now) {
            let outcome = self.validator.validate(lease.physical_mut()).await;
            let valid = outcome == ValidationState::Valid;
            self.metrics.record_validation(valid);
            self.alerts.observe_validation(valid, Instant::now());
            if !valid {
                lease.discard("validation failed");
                return None;
            }
        }

        // Validation may have outlasted the remaining lifetime.
        let now = Instant::now();
        if lease.physical().is_expired(self.config.max_lifetime(), now) {
            lease.discard("max lifetime exceeded");
            return None;
        }

        lease.physical_mut().mark_leased(now);
        Some(lease)
    }

    /// Open a physical connection through the retrying connector.
    pub(crate) async fn open_connection(
        &self,
        deadline: Option<Instant>,
        timeout: Duration,
    ) -> Result<PhysicalConnection> {
        let opened = match deadline {
            Some(deadline) => {
                match tokio::time::timeout_at(deadline, self.connector.open(Some(deadline))).await
                {
                    Ok(result) => result,
                    Err(_) => Err(ReservoirError::Timeout(timeout)),
                }
            }
            None => self.connector.open(None).await,
        };

        match opened {
            Ok(handle) => {
                let connection = PhysicalConnection::new(self.next_id(), handle, Instant::now());
                self.metrics.record_created();
                tracing::debug!(
                    pool = %self.config.name(),
                    connection_id = connection.id(),
                    "opened connection"
                );
                Ok(connection)
            }
            Err(e) => {
                self.metrics.record_connect_failure();
                Err(e)
            }
        }
    }

    /// One unit of capacity became free: hand it to the oldest waiter.
    pub(crate) fn free_slot_locked(&self, state: &mut PoolState) {
        if state.closed || state.waiters.is_empty() {
            return;
        }
        state.pending += 1;
        if state.waiters.offer(Handoff::Slot, Instant::now()).is_err() {
            state.pending -= 1;
        }
        self.alerts
            .observe_waiting(state.waiters.len(), Instant::now());
    }

    /// Put a healthy connection back: straight to the oldest waiter if there
    /// is one, otherwise onto the idle set as most recently used.
    pub(crate) fn return_idle_locked(
        &self,
        state: &mut PoolState,
        mut connection: PhysicalConnection,
        now: Instant,
    ) {
        connection.mark_idle(now);
        let id = connection.id();
        let handle = Arc::clone(connection.handle());

        match state.waiters.offer(Handoff::Connection(connection), now) {
            Ok(waited) => {
                state.leased.insert(
                    id,
                    super::state::LeaseRecord {
                        handle,
                        leased_at: now,
                        leak_reported: false,
                    },
                );
                tracing::trace!(
                    pool = %self.config.name(),
                    connection_id = id,
                    waited_ms = waited.as_millis() as u64,
                    "handed connection to waiter"
                );
                self.alerts.observe_waiting(state.waiters.len(), now);
            }
            Err(Handoff::Connection(connection)) => state.idle.push(connection),
            Err(_) => {}
        }
    }

    /// Return whatever an abandoned waiter had been handed.
    pub(crate) fn reclaim_locked(&self, state: &mut PoolState, handoff: Handoff) {
        match handoff {
            Handoff::Connection(mut connection) => {
                state.leased.remove(&connection.id());
                if state.closed || connection.is_broken() {
                    connection.mark_closed();
                    self.close_in_background(
                        connection.id(),
                        Arc::clone(connection.handle()),
                        "abandoned handoff",
                    );
                    self.free_slot_locked(state);
                } else {
                    let last_used = connection.last_used_at();
                    self.return_idle_locked(state, connection, last_used);
                }
            }
            Handoff::Slot => {
                state.pending -= 1;
                self.free_slot_locked(state);
            }
            Handoff::Closed => {}
        }
    }

    /// Called when a lease is dropped.
    pub(crate) fn release(&self, mut connection: PhysicalConnection) {
        let now = Instant::now();
        let mut state = self.state.lock();
        state.leased.remove(&connection.id());

        if state.closed {
            drop(state);
            connection.mark_closed();
            self.close_in_background(connection.id(), Arc::clone(connection.handle()), "pool closed");
            return;
        }

        let reason = if connection.is_broken() {
            Some("connection invalid")
        } else if connection.is_expired(self.config.max_lifetime(), now) {
            Some("max lifetime exceeded")
        } else {
            None
        };

        match reason {
            Some(reason) => {
                connection.mark_closed();
                self.free_slot_locked(&mut state);
                drop(state);
                self.close_in_background(connection.id(), Arc::clone(connection.handle()), reason);
            }
            None => self.return_idle_locked(&mut state, connection, now),
        }
    }

    /// Destroy a leased connection instead of returning it.
    pub(crate) fn discard(&self, mut connection: PhysicalConnection, reason: &'static str) {
        connection.mark_closed();
        {
            let mut state = self.state.lock();
            state.leased.remove(&connection.id());
            self.free_slot_locked(&mut state);
        }
        self.close_in_background(connection.id(), Arc::clone(connection.handle()), reason);
    }

    /// Drop a leased connection from the books without closing it.
    pub(crate) fn forget(&self, connection: &PhysicalConnection) {
        let mut state = self.state.lock();
        state.leased.remove(&connection.id());
        self.free_slot_locked(&mut state);
        tracing::debug!(
            pool = %self.config.name(),
            connection_id = connection.id(),
            "connection detached from pool"
        );
    }

    /// Close a physical connection on a background task.
    pub(crate) fn close_in_background(
        &self,
        id: u64,
        handle: Arc<dyn Connection>,
        reason: &'static str,
    ) {
        self.metrics.record_closed();
        tracing::debug!(
            pool = %self.config.name(),
            connection_id = id,
            reason,
            "closing connection"
        );
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let pool = self.config.name().to_string();
                runtime.spawn(async move {
                    if let Err(e) = handle.close().await {
                        tracing::warn!(pool = %pool, connection_id = id, error = %e, "failed to close connection");
                    }
                });
            }
            Err(_) => {
                tracing::debug!(connection_id = id, "no runtime available, dropping connection");
            }
        }
    }

    pub(crate) async fn shutdown(&self) {
        let (idle, leased, woken) = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            let woken = state.waiters.close_all();
            let idle: Vec<PhysicalConnection> = state.idle.drain(..).collect();
            let leased: Vec<(u64, Arc<dyn Connection>)> = state
                .leased
                .iter()
                .map(|(id, record)| (*id, Arc::clone(&record.handle)))
                .collect();
            (idle, leased, woken)
        };
        self.shutdown.cancel();

        tracing::info!(
            pool = %self.config.name(),
            idle = idle.len(),
            leased = leased.len(),
            waiters = woken,
            "shutting down pool"
        );

        for mut connection in idle {
            connection.mark_closed();
            self.metrics.record_closed();
            if let Err(e) = connection.handle().close().await {
                tracing::warn!(connection_id = connection.id(), error = %e, "failed to close idle connection");
            }
        }

        // Leased connections get a close signal now; their slots are settled
        // when the leases are dropped.
        for (id, handle) in leased {
            if let Err(e) = handle.close().await {
                tracing::warn!(connection_id = id, error = %e, "failed to close leased connection");
            }
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// A connection pool that manages a set of database connections
///
/// The pool maintains a configurable number of connections and provides
/// them to callers on demand. Connections are automatically returned
/// to the pool when the `PooledConnection` wrapper is dropped.
///
/// `Pool` is a cheap handle; clone it to share the pool between tasks.
#[derive(Clone)]
pub struct Pool {
    shared: Arc<Shared>,
}

impl Pool {
    /// Create a new connection pool with the given configuration and connector
    ///
    /// Validates the configuration and starts the background reaper, whose
    /// first sweep primes the pool up to `min_idle`. Must be called from
    /// within a Tokio runtime.
    #[tracing::instrument(skip_all, fields(pool = %config.name()))]
    pub fn new<C: Connector>(config: PoolConfig, connector: C) -> Result<Self> {
        config.validate()?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            ReservoirError::Configuration("Pool must be created inside a Tokio runtime".into())
        })?;

        let connector: Arc<dyn Connector> = Arc::new(connector);
        let shared = Arc::new(Shared {
            connector: RetryingConnector::new(connector, config.connect_retry()),
            validator: HealthValidator::new(
                config.validation_timeout(),
                config.validation_skip_window(),
            ),
            state: Mutex::new(PoolState::default()),
            metrics: PoolMetrics::new(),
            alerts: AlertMonitor::new(config.name(), config.alerts().clone()),
            shutdown: CancellationToken::new(),
            next_connection_id: AtomicU64::new(0),
            config,
        });

        reaper::spawn(&runtime, &shared);

        tracing::info!(
            database = %shared.connector.describe(),
            max_pool_size = shared.config.max_pool_size(),
            min_idle = shared.config.min_idle(),
            "connection pool created"
        );
        Ok(Self { shared })
    }

    /// Get a connection from the pool
    ///
    /// This will:
    /// 1. Reuse the most recently used idle connection, validating it first
    /// 2. If none is idle and the pool is below its maximum, open a new one
    /// 3. Otherwise wait in FIFO order for a released connection
    ///
    /// Returns [`ReservoirError::Timeout`] once the configured connection
    /// timeout elapses, and [`ReservoirError::PoolClosed`] after shutdown.
    pub async fn acquire(&self) -> Result<PooledConnection> {
        self.acquire_timeout(self.shared.config.connection_timeout())
            .await
    }

    /// Get a connection, waiting at most `timeout` instead of the configured
    /// connection timeout.
    pub async fn acquire_timeout(&self, timeout: Duration) -> Result<PooledConnection> {
        let started = Instant::now();
        let deadline = started + timeout;
        let result = self.shared.acquire_until(deadline, timeout).await;

        let elapsed = started.elapsed();
        match &result {
            Ok(_) => self.shared.metrics.record_acquired(elapsed),
            Err(ReservoirError::Timeout(_)) => self.shared.metrics.record_timeout(elapsed),
            Err(_) => {}
        }
        result
    }

    /// Get current pool statistics
    pub fn snapshot(&self) -> PoolStats {
        self.shared.state.lock().stats()
    }

    /// Get counters and the wait-time distribution
    pub fn metrics(&self) -> MetricsSnapshot {
        let stats = self.snapshot();
        self.shared.metrics.snapshot(stats)
    }

    /// Subscribe to saturation and validation alerts
    pub fn subscribe_alerts(&self) -> broadcast::Receiver<Alert> {
        self.shared.alerts.subscribe()
    }

    /// Get the pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Check if the pool has been shut down
    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    #[cfg(test)]
    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    /// Run one eviction and replenishment sweep now.
    pub async fn run_housekeeping(&self) {
        reaper::sweep(&self.shared).await;
    }

    /// Shut the pool down
    ///
    /// Wakes every waiter with [`ReservoirError::PoolClosed`], closes all idle
    /// connections, signals a close to leased ones and stops the reaper.
    /// Calling it again is a no-op.
    #[tracing::instrument(skip(self), fields(pool = %self.shared.config.name()))]
    pub async fn shutdown(&self) {
        self.shared.shutdown().await;
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("name", &self.shared.config.name())
            .field("stats", &self.snapshot())
            .finish()
    }
}
