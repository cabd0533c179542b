//! Ordered multicast observer registry.
//!
//! Device adapters subscribe to two event streams on every transport:
//! connection-state changes and inbound messages.  [`ObserverSet`] replaces
//! the source system's `+=`-style multicast delegate fields with an explicit
//! ordered collection of callbacks: every currently-registered observer is
//! invoked exactly once per event, synchronously, in registration order.
//!
//! # Threading
//!
//! `emit` runs on whichever thread produced the event — a reader task for
//! inbound messages, a connect path for state changes, a poll loop for poll
//! results.  Observer code must therefore treat its own mutable state as
//! accessed from multiple threads.
//!
//! The registry snapshots the observer list under its lock and invokes the
//! callbacks *outside* it, so an observer may subscribe or unsubscribe
//! (including itself) from within its own callback without deadlocking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Handle returned by [`ObserverSet::subscribe`], used to unsubscribe later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Observer<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// An ordered, thread-safe collection of event observers.
pub struct ObserverSet<T> {
    observers: Mutex<Vec<(u64, Observer<T>)>>,
    next_id: AtomicU64,
}

impl<T> ObserverSet<T> {
    pub fn new() -> Self {
        Self {
            observers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Registers `observer` and returns its subscription handle.
    ///
    /// Observers are invoked in registration order.
    pub fn subscribe(&self, observer: impl Fn(&T) + Send + Sync + 'static) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut list = self.observers.lock().expect("observer list poisoned");
        list.push((id, Arc::new(observer)));
        SubscriptionId(id)
    }

    /// Removes the observer registered under `id`.
    ///
    /// Returns `false` when the id was already removed (idempotent).
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut list = self.observers.lock().expect("observer list poisoned");
        let before = list.len();
        list.retain(|(oid, _)| *oid != id.0);
        list.len() != before
    }

    /// Invokes every currently-registered observer with `event`, in
    /// registration order, on the calling thread.
    pub fn emit(&self, event: &T) {
        // Snapshot under the lock, invoke outside it.
        let snapshot: Vec<Observer<T>> = {
            let list = self.observers.lock().expect("observer list poisoned");
            list.iter().map(|(_, obs)| Arc::clone(obs)).collect()
        };
        for observer in snapshot {
            observer(event);
        }
    }

    /// Number of registered observers.
    pub fn len(&self) -> usize {
        self.observers.lock().expect("observer list poisoned").len()
    }

    /// Returns `true` when no observer is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for ObserverSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for ObserverSet<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverSet")
            .field("observers", &self.len())
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
