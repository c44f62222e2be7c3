//! Pool metrics and alerting
//!
//! [`PoolMetrics`] keeps lock-free counters and a wait-time histogram that
//! the pool updates on every state transition. The alert monitor watches the
//! waiting count and the validation failure rate and publishes [`Alert`]s on
//! a broadcast channel when either stays above its threshold.

mod alert;
mod recorder;


pub(crate) use alert::AlertMonitor;
pub use alert::{Alert, AlertConfig, AlertKind, AlertSeverity};
pub use recorder::{MetricsSnapshot, PoolMetrics, WaitBucket, WaitTimeDistribution};
