//! Reaper task lifecycle

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::time::MissedTickBehavior;

use super::sweep::{check_saturation, sweep};
use crate::pool::Shared;

/// Start the reaper for `shared` on `runtime`.
///
/// The task holds only a weak reference, so it ends when the last pool handle
/// is dropped, and it stops immediately when the shutdown token is cancelled.
/// The first tick fires right away, which primes the pool to `min_idle`.
/// Saturation is re-checked twice per alert window.
pub(crate) fn spawn(runtime: &Handle, shared: &Arc<Shared>) {
    let weak = Arc::downgrade(shared);
    let token = shared.shutdown.clone();
    let period = shared.config.housekeeping_interval();
    let saturation_period =
        (shared.config.alerts().saturation_window() / 2).max(Duration::from_millis(1));
    let pool = shared.config.name().to_string();

    runtime.spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut saturation = tokio::time::interval(saturation_period);
        saturation.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = saturation.tick() => {
                    let Some(shared) = weak.upgrade() else {
                        break;
                    };
                    check_saturation(&shared);
                }
                _ = interval.tick() => {
                    let Some(shared) = weak.upgrade() else {
                        break;
                    };
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = sweep(&shared) => {}
                    }
                }
            }
        }

        tracing::debug!(pool = %pool, "reaper stopped");
    });
}
