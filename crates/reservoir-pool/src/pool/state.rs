//! Mutable pool state guarded by the pool lock

use std::collections::HashMap;
use std::sync::Arc;

use reservoir_core::Connection;
use tokio::time::Instant;

use super::connection::PhysicalConnection;
use super::gate::WaitQueue;
use super::stats::PoolStats;

/// A connection currently outside the idle set
pub(crate) struct LeaseRecord {
    pub(crate) handle: Arc<dyn Connection>,
    pub(crate) leased_at: Instant,
    pub(crate) leak_reported: bool,
}

/// Everything the pool lock protects
///
/// `idle` is ordered by return time: the most recently used connection sits
/// at the end. `pending` counts capacity reserved for opens in flight; it is
/// part of the total so concurrent growth cannot overshoot the maximum.
#[derive(Default)]
pub(crate) struct PoolState {
    pub(crate) idle: Vec<PhysicalConnection>,
    pub(crate) leased: HashMap<u64, LeaseRecord>,
    pub(crate) pending: usize,
    pub(crate) waiters: WaitQueue,
    pub(crate) closed: bool,
}

impl PoolState {
    /// Connections counted against the pool size, including reserved opens
    pub(crate) fn total(&self) -> usize {
        self.idle.len() + self.leased.len() + self.pending
    }

    pub(crate) fn stats(&self) -> PoolStats {
        PoolStats::new(
            self.total(),
            self.idle.len(),
            self.leased.len(),
            self.waiters.len(),
        )
        .with_pending(self.pending)
    }

    /// Record that `conn` left the idle set.
    pub(crate) fn record_lease(&mut self, conn: &PhysicalConnection, now: Instant) {
        self.leased.insert(
            conn.id(),
            LeaseRecord {
                handle: Arc::clone(conn.handle()),
                leased_at: now,
                leak_reported: false,
            },
        );
    }

    /// Pop the most recently used idle connection.
    pub(crate) fn pop_most_recently_used(&mut self) -> Option<PhysicalConnection> {
        self.idle.pop()
    }

    /// Remove the idle connections whose ids are listed.
    pub(crate) fn take_idle(&mut self, ids: &[u64]) -> Vec<PhysicalConnection> {
        let (taken, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.idle)
            .into_iter()
            .partition(|conn| ids.contains(&conn.id()));
        self.idle = kept;
        taken
    }
}
