//! Background eviction of stale idle connections
//!
//! The reaper runs on the pool's housekeeping interval. Each sweep destroys
//! idle connections that outlived `max_lifetime` or sat unused longer than
//! `idle_timeout`, reports leases held past the leak threshold, and then
//! opens fresh connections until `min_idle` is met again. Between sweeps the
//! same task re-checks the wait queue against the saturation alert window.

mod plan;
mod sweep;
mod task;


pub(crate) use sweep::{check_saturation, sweep};
pub(crate) use task::spawn;
