//! Lease guard handed to callers

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use reservoir_core::Connection;

use super::connection::{PhysicalConnection, ValidationState};
use super::pool::Shared;

/// A connection borrowed from the pool
///
/// When dropped, the connection is automatically returned to the pool. A
/// connection marked invalid, or one that has outlived the pool's maximum
/// lifetime, is destroyed instead and its slot offered to the next waiter.
pub struct PooledConnection {
    connection: Option<PhysicalConnection>,
    shared: Arc<Shared>,
}

impl PooledConnection {
    pub(crate) fn new(connection: PhysicalConnection, shared: Arc<Shared>) -> Self {
        Self {
            connection: Some(connection),
            shared,
        }
    }

    fn inner(&self) -> &PhysicalConnection {
        self.connection.as_ref().expect("connection taken")
    }

    pub(crate) fn physical_mut(&mut self) -> &mut PhysicalConnection {
        self.connection.as_mut().expect("connection taken")
    }

    /// Pool-unique connection id
    pub fn id(&self) -> u64 {
        self.inner().id()
    }

    /// Pool bookkeeping for this connection
    pub fn physical(&self) -> &PhysicalConnection {
        self.inner()
    }

    /// Get the underlying connection as an Arc
    pub fn handle(&self) -> &Arc<dyn Connection> {
        self.inner().handle()
    }

    /// Report the connection as broken so that release destroys it.
    pub fn mark_invalid(&mut self) {
        self.physical_mut().set_validation(ValidationState::Invalid);
    }

    /// Return the connection to the pool now.
    pub fn release(self) {}

    /// Take the connection out of the pool permanently.
    ///
    /// The slot is freed immediately; closing the returned handle becomes the
    /// caller's responsibility.
    pub fn detach(mut self) -> Arc<dyn Connection> {
        let connection = self.connection.take().expect("connection taken");
        self.shared.forget(&connection);
        Arc::clone(connection.handle())
    }

    /// Destroy the connection instead of returning it.
    pub(crate) fn discard(mut self, reason: &'static str) {
        if let Some(connection) = self.connection.take() {
            self.shared.discard(connection, reason);
        }
    }
}

impl Deref for PooledConnection {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        self.inner().handle().as_ref()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            self.shared.release(connection);
        }
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("connection", &self.connection)
            .field("pool", &self.shared.config.name())
            .finish()
    }
}
