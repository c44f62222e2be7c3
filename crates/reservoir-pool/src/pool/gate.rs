//! Acquisition gate: the FIFO queue of callers waiting for a connection
//!
//! Each waiter owns the receiving half of a oneshot channel. Releases,
//! replenishment and shutdown deliver a [`Handoff`] to the longest-waiting
//! entry while holding the pool lock, and a waiter whose deadline elapses
//! takes the same lock to remove its own entry. Whichever side gets the lock
//! first decides the outcome, so a waiter can never both time out and be
//! handed a connection.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;

use super::connection::PhysicalConnection;
use super::pool::Shared;

/// What a waiter receives when it is woken
#[derive(Debug)]
pub(crate) enum Handoff {
    /// A released connection, already counted as leased to the waiter
    Connection(PhysicalConnection),
    /// A reserved slot; the waiter must open a new connection itself
    Slot,
    /// The pool shut down
    Closed,
}

struct Waiter {
    id: u64,
    enqueued_at: Instant,
    tx: oneshot::Sender<Handoff>,
}

/// FIFO queue of pending acquisitions
#[derive(Default)]
pub(crate) struct WaitQueue {
    entries: VecDeque<Waiter>,
    next_id: u64,
}

impl WaitQueue {
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append a waiter at the back of the queue.
    pub(crate) fn enqueue(&mut self, now: Instant) -> (u64, oneshot::Receiver<Handoff>) {
        let (tx, rx) = oneshot::channel();
        self.next_id += 1;
        let id = self.next_id;
        self.entries.push_back(Waiter {
            id,
            enqueued_at: now,
            tx,
        });
        (id, rx)
    }

    /// Remove a waiter by id. Returns false if it was already dequeued.
    pub(crate) fn remove(&mut self, id: u64) -> bool {
        match self.entries.iter().position(|w| w.id == id) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Deliver `handoff` to the longest-waiting live waiter.
    ///
    /// Returns how long that waiter had been queued, or gives the handoff back
    /// if nobody could take it.
    pub(crate) fn offer(
        &mut self,
        mut handoff: Handoff,
        now: Instant,
    ) -> std::result::Result<Duration, Handoff> {
        while let Some(waiter) = self.entries.pop_front() {
            match waiter.tx.send(handoff) {
                Ok(()) => return Ok(now.saturating_duration_since(waiter.enqueued_at)),
                // Receiver went away without cleaning up; try the next one.
                Err(returned) => handoff = returned,
            }
        }
        Err(handoff)
    }

    /// Wake every waiter with [`Handoff::Closed`]. Returns how many were woken.
    pub(crate) fn close_all(&mut self) -> usize {
        let mut woken = 0;
        for waiter in self.entries.drain(..) {
            if waiter.tx.send(Handoff::Closed).is_ok() {
                woken += 1;
            }
        }
        woken
    }
}

/// A caller's place in the wait queue
///
/// If the acquiring future is dropped while queued, the guard removes the
/// entry, and returns anything already delivered to it to the pool.
pub(crate) struct WaitGuard {
    shared: Arc<Shared>,
    id: u64,
    rx: oneshot::Receiver<Handoff>,
    settled: bool,
}

impl WaitGuard {
    pub(crate) fn new(shared: Arc<Shared>, id: u64, rx: oneshot::Receiver<Handoff>) -> Self {
        Self {
            shared,
            id,
            rx,
            settled: false,
        }
    }

    /// Wait for a handoff until `deadline`. `None` means the deadline won.
    pub(crate) async fn wait(&mut self, deadline: Instant) -> Option<Handoff> {
        let received = tokio::time::timeout_at(deadline, &mut self.rx).await;
        self.settled = true;

        match received {
            Ok(Ok(handoff)) => Some(handoff),
            // The queue was dropped along with the pool state.
            Ok(Err(_)) => Some(Handoff::Closed),
            Err(_) => {
                let mut state = self.shared.state.lock();
                if state.waiters.remove(self.id) {
                    self.shared
                        .alerts
                        .observe_waiting(state.waiters.len(), Instant::now());
                    return None;
                }
                drop(state);
                // Dequeued before we got the lock: the handoff is already in
                // the channel because senders deliver under the same lock.
                self.rx.try_recv().ok()
            }
        }
    }
}

impl Drop for WaitGuard {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut state = self.shared.state.lock();
        if state.waiters.remove(self.id) {
            return;
        }
        if let Ok(handoff) = self.rx.try_recv() {
            self.shared.reclaim_locked(&mut state, handoff);
        }
    }
}
