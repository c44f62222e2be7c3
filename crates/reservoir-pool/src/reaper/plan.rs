//! Eviction planning

use std::time::Duration;

use tokio::time::Instant;

use crate::pool::PhysicalConnection;

/// Why an idle connection is evicted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EvictionReason {
    MaxLifetime,
    IdleTimeout,
}

impl EvictionReason {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            EvictionReason::MaxLifetime => "max lifetime exceeded",
            EvictionReason::IdleTimeout => "idle timeout",
        }
    }
}

/// Choose which idle connections to evict.
///
/// Connections past `max_lifetime` are always evicted. Connections idle for
/// longer than `idle_timeout` are evicted oldest-idle first, but only while
/// more than `min_idle` idle connections would remain.
pub(crate) fn plan_eviction(
    idle: &[PhysicalConnection],
    now: Instant,
    idle_timeout: Duration,
    max_lifetime: Duration,
    min_idle: usize,
) -> Vec<(u64, EvictionReason)> {
    let mut evict: Vec<(u64, EvictionReason)> = idle
        .iter()
        .filter(|conn| conn.is_expired(max_lifetime, now))
        .map(|conn| (conn.id(), EvictionReason::MaxLifetime))
        .collect();

    let mut stale: Vec<&PhysicalConnection> = idle
        .iter()
        .filter(|conn| !conn.is_expired(max_lifetime, now) && conn.idle_for(now) > idle_timeout)
        .collect();
    stale.sort_by_key(|conn| conn.last_used_at());

    let mut remaining = idle.len() - evict.len();
    for conn in stale {
        if remaining <= min_idle {
            break;
        }
        evict.push((conn.id(), EvictionReason::IdleTimeout));
        remaining -= 1;
    }
    evict
}
