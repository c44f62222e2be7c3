//! Point-in-time pool counts

use serde::{Deserialize, Serialize};

/// Counts read under the pool lock by [`Pool::snapshot`](super::Pool::snapshot)
///
/// `total` includes connections still being opened, so
/// `total == idle + active + pending` and never exceeds the configured
/// maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    total: usize,
    idle: usize,
    /// Leased to callers, including handoffs not yet picked up
    active: usize,
    /// Callers queued in the acquisition gate
    waiting: usize,
    /// Capacity reserved for opens in flight
    #[serde(default)]
    pending: usize,
}

impl PoolStats {
    pub fn new(total: usize, idle: usize, active: usize, waiting: usize) -> Self {
        Self {
            total,
            idle,
            active,
            waiting,
            pending: 0,
        }
    }

    pub fn with_pending(mut self, pending: usize) -> Self {
        self.pending = pending;
        self
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn idle(&self) -> usize {
        self.idle
    }

    pub fn active(&self) -> usize {
        self.active
    }

    pub fn waiting(&self) -> usize {
        self.waiting
    }

    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Share of counted connections that are leased, 0.0 for an empty pool
    pub fn utilization(&self) -> f64 {
        match self.total {
            0 => 0.0,
            total => self.active as f64 / total as f64,
        }
    }

    /// No idle connection is left to hand out
    pub fn is_full(&self) -> bool {
        self.total > 0 && self.idle == 0
    }
}

impl Default for PoolStats {
    fn default() -> Self {
        Self::new(0, 0, 0, 0)
    }
}
