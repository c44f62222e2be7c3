//! Physical connection bookkeeping

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reservoir_core::Connection;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Result of the most recent liveness probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationState {
    /// Never probed since creation
    Unvalidated,
    /// Last probe succeeded
    Valid,
    /// Last probe failed, or the caller reported the connection broken
    Invalid,
}

/// Where a physical connection currently lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaseState {
    /// Held by the pool, available for hand-out
    Idle,
    /// Lent to a caller
    Leased,
    /// Destroyed; the handle must not be used again
    Closed,
}

/// A driver connection together with the metadata the pool tracks for it
pub struct PhysicalConnection {
    id: u64,
    handle: Arc<dyn Connection>,
    created_at: Instant,
    last_used_at: Instant,
    validation: ValidationState,
    lease: LeaseState,
    handed_out: bool,
}

impl PhysicalConnection {
    pub(crate) fn new(id: u64, handle: Arc<dyn Connection>, now: Instant) -> Self {
        Self {
            id,
            handle,
            created_at: now,
            last_used_at: now,
            validation: ValidationState::Unvalidated,
            lease: LeaseState::Idle,
            handed_out: false,
        }
    }

    /// Pool-unique identifier
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Shared driver handle
    pub fn handle(&self) -> &Arc<dyn Connection> {
        &self.handle
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn last_used_at(&self) -> Instant {
        self.last_used_at
    }

    pub fn validation(&self) -> ValidationState {
        self.validation
    }

    pub fn lease(&self) -> LeaseState {
        self.lease
    }

    /// Whether the connection has been lent out at least once
    pub fn has_been_handed_out(&self) -> bool {
        self.handed_out
    }

    /// Time since the connection was opened
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }

    /// Time since the connection was last returned or handed out
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_used_at)
    }

    /// Whether the connection has outlived `max_lifetime`
    pub fn is_expired(&self, max_lifetime: Duration, now: Instant) -> bool {
        self.age(now) > max_lifetime
    }

    /// Whether the connection must be destroyed instead of reused
    pub(crate) fn is_broken(&self) -> bool {
        self.validation == ValidationState::Invalid || self.handle.is_closed()
    }

    pub(crate) fn set_validation(&mut self, state: ValidationState) {
        self.validation = state;
    }

    pub(crate) fn mark_leased(&mut self, now: Instant) {
        self.lease = LeaseState::Leased;
        self.last_used_at = now;
        self.handed_out = true;
    }

    pub(crate) fn mark_idle(&mut self, now: Instant) {
        self.lease = LeaseState::Idle;
        self.last_used_at = now;
    }

    pub(crate) fn mark_closed(&mut self) {
        self.lease = LeaseState::Closed;
    }
}

impl fmt::Debug for PhysicalConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhysicalConnection")
            .field("id", &self.id)
            .field("driver", &self.handle.driver_name())
            .field("created_at", &self.created_at)
            .field("last_used_at", &self.last_used_at)
            .field("validation", &self.validation)
            .field("lease", &self.lease)
            .field("handed_out", &self.handed_out)
            .finish()
    }
}
