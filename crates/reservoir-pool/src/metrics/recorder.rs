//! Counters and wait-time histogram

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pool::PoolStats;

/// Upper bounds of the wait-time buckets in milliseconds. A final bucket
/// catches everything slower.
const WAIT_BUCKETS_MS: [u64; 10] = [1, 5, 10, 25, 50, 100, 250, 500, 1000, 5000];

/// Counters for a connection pool
///
/// All updates are relaxed atomic increments; readers get a consistent view
/// per counter, not across counters.
#[derive(Debug)]
pub struct PoolMetrics {
    connections_created: AtomicU64,
    connections_closed: AtomicU64,
    acquisitions: AtomicU64,
    timeouts: AtomicU64,
    validations: AtomicU64,
    validation_failures: AtomicU64,
    connect_failures: AtomicU64,
    wait_counts: [AtomicU64; WAIT_BUCKETS_MS.len() + 1],
    wait_sum_ms: AtomicU64,
}

impl PoolMetrics {
    pub fn new() -> Self {
        Self {
            connections_created: AtomicU64::new(0),
            connections_closed: AtomicU64::new(0),
            acquisitions: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            validations: AtomicU64::new(0),
            validation_failures: AtomicU64::new(0),
            connect_failures: AtomicU64::new(0),
            wait_counts: std::array::from_fn(|_| AtomicU64::new(0)),
            wait_sum_ms: AtomicU64::new(0),
        }
    }

    pub fn record_created(&self) {
        self.connections_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connect_failure(&self) {
        self.connect_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful acquisition and how long it waited.
    pub fn record_acquired(&self, waited: Duration) {
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        self.record_wait(waited);
    }

    /// Record an acquisition that hit its deadline.
    pub fn record_timeout(&self, waited: Duration) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
        self.record_wait(waited);
    }

    pub fn record_validation(&self, valid: bool) {
        self.validations.fetch_add(1, Ordering::Relaxed);
        if !valid {
            self.validation_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn record_wait(&self, waited: Duration) {
        let ms = waited.as_millis() as u64;
        self.wait_sum_ms.fetch_add(ms, Ordering::Relaxed);
        let index = WAIT_BUCKETS_MS
            .iter()
            .position(|&bound| ms <= bound)
            .unwrap_or(WAIT_BUCKETS_MS.len());
        self.wait_counts[index].fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the counters alongside the given pool statistics.
    pub fn snapshot(&self, stats: PoolStats) -> MetricsSnapshot {
        let buckets = self
            .wait_counts
            .iter()
            .enumerate()
            .map(|(i, count)| WaitBucket {
                le_ms: WAIT_BUCKETS_MS.get(i).copied(),
                count: count.load(Ordering::Relaxed),
            })
            .collect::<Vec<_>>();
        let count = buckets.iter().map(|b| b.count).sum();

        MetricsSnapshot {
            stats,
            connections_created: self.connections_created.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            acquisitions: self.acquisitions.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            validations: self.validations.load(Ordering::Relaxed),
            validation_failures: self.validation_failures.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
            wait_time: WaitTimeDistribution {
                buckets,
                count,
                sum_ms: self.wait_sum_ms.load(Ordering::Relaxed),
            },
        }
    }
}

impl Default for PoolMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// One histogram bucket; `le_ms` is `None` for the overflow bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitBucket {
    pub le_ms: Option<u64>,
    pub count: u64,
}

/// Distribution of time callers spent in `acquire`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitTimeDistribution {
    pub buckets: Vec<WaitBucket>,
    pub count: u64,
    pub sum_ms: u64,
}

impl WaitTimeDistribution {
    /// Average wait in milliseconds
    pub fn average_ms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum_ms as f64 / self.count as f64
        }
    }

    /// Upper bound of the bucket holding the `p`th percentile (0-100).
    ///
    /// Returns `None` when there are no samples or the percentile falls in
    /// the overflow bucket.
    pub fn percentile(&self, p: f64) -> Option<u64> {
        if self.count == 0 {
            return None;
        }
        let target = ((self.count as f64) * p / 100.0).ceil().max(1.0) as u64;
        let mut cumulative = 0u64;
        for bucket in &self.buckets {
            cumulative += bucket.count;
            if cumulative >= target {
                return bucket.le_ms;
            }
        }
        None
    }
}

/// Point-in-time view of pool counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub stats: PoolStats,
    pub connections_created: u64,
    pub connections_closed: u64,
    pub acquisitions: u64,
    pub timeouts: u64,
    pub validations: u64,
    pub validation_failures: u64,
    pub connect_failures: u64,
    pub wait_time: WaitTimeDistribution,
}

impl MetricsSnapshot {
    /// Fraction of validations that failed since the pool started
    pub fn validation_failure_rate(&self) -> f64 {
        if self.validations == 0 {
            0.0
        } else {
            self.validation_failures as f64 / self.validations as f64
        }
    }
}
