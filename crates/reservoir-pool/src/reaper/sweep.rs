//! One housekeeping pass

use std::sync::Arc;

use tokio::time::Instant;

use super::plan::{EvictionReason, plan_eviction};
use crate::pool::{PhysicalConnection, PoolState, Shared, SlotReservation};

/// Evict stale idle connections, report leaks, then replenish to `min_idle`.
pub(crate) async fn sweep(shared: &Arc<Shared>) {
    let now = Instant::now();
    let evicted = {
        let mut state = shared.state.lock();
        if state.closed {
            return;
        }

        let plan = plan_eviction(
            &state.idle,
            now,
            shared.config.idle_timeout(),
            shared.config.max_lifetime(),
            shared.config.min_idle(),
        );
        let ids: Vec<u64> = plan.iter().map(|(id, _)| *id).collect();
        let taken = state.take_idle(&ids);
        for _ in &taken {
            shared.free_slot_locked(&mut state);
        }

        report_leaks_locked(shared, &mut state, now);
        shared.alerts.observe_waiting(state.waiters.len(), now);

        taken
            .into_iter()
            .map(|conn| {
                let reason = plan
                    .iter()
                    .find(|(id, _)| *id == conn.id())
                    .map(|(_, reason)| *reason)
                    .unwrap_or(EvictionReason::IdleTimeout);
                (conn, reason)
            })
            .collect::<Vec<(PhysicalConnection, EvictionReason)>>()
    };

    if !evicted.is_empty() {
        tracing::debug!(
            pool = %shared.config.name(),
            count = evicted.len(),
            "evicting idle connections"
        );
    }
    for (mut conn, reason) in evicted {
        conn.mark_closed();
        shared.metrics.record_closed();
        tracing::debug!(
            pool = %shared.config.name(),
            connection_id = conn.id(),
            reason = reason.as_str(),
            "closing connection"
        );
        if let Err(e) = conn.handle().close().await {
            tracing::warn!(connection_id = conn.id(), error = %e, "failed to close connection");
        }
    }

    replenish(shared).await;
}

/// Re-evaluate saturation between sweeps, so a queue that stops changing
/// still raises its alert once the window has passed.
pub(crate) fn check_saturation(shared: &Shared) {
    let state = shared.state.lock();
    shared
        .alerts
        .observe_waiting(state.waiters.len(), Instant::now());
}

fn report_leaks_locked(shared: &Shared, state: &mut PoolState, now: Instant) {
    let Some(threshold) = shared.config.leak_detection_threshold() else {
        return;
    };
    for (id, record) in state.leased.iter_mut() {
        let held = now.saturating_duration_since(record.leased_at);
        if !record.leak_reported && held > threshold {
            record.leak_reported = true;
            tracing::warn!(
                pool = %shared.config.name(),
                connection_id = *id,
                held_ms = held.as_millis() as u64,
                "connection held longer than leak detection threshold"
            );
        }
    }
}

/// Open connections until `min_idle` idle ones exist or the pool is full.
async fn replenish(shared: &Arc<Shared>) {
    loop {
        {
            let mut state = shared.state.lock();
            if state.closed
                || state.idle.len() + state.pending >= shared.config.min_idle()
                || state.total() >= shared.config.max_pool_size()
            {
                return;
            }
            state.pending += 1;
        }

        let reservation = SlotReservation::adopt(shared);
        let timeout = shared.config.connection_timeout();
        match shared
            .open_connection(Some(Instant::now() + timeout), timeout)
            .await
        {
            Ok(conn) => reservation.install_idle(conn),
            Err(e) => {
                tracing::warn!(
                    pool = %shared.config.name(),
                    error = %e,
                    "failed to replenish idle connections"
                );
                return;
            }
        }
    }
}
