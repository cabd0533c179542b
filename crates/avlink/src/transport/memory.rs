//! In-process transport test double.
//!
//! Device adapters (and this crate's own lifecycle tests) need to exercise
//! connect/queue/flush/idle logic without sockets or hardware on the bench.
//! `MemoryTransport` implements the full [`TransportClient`] surface with
//! scripted connect behavior, a record of everything sent, and hooks to
//! inject inbound messages and state transitions as if a peer produced
//! them.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use avlink_core::{ConnectionState, Payload, SubscriptionId, TransportError};

use super::{LinkCore, MessageObserver, StateObserver, TransportClient};

/// What `connect()` does on a [`MemoryTransport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectBehavior {
    /// `Connecting → Connected` immediately.
    Succeed,
    /// `Connecting → Error` immediately; `connect` returns `ConnectFailed`.
    Fail,
    /// Stays in `Connecting` until the test calls
    /// [`complete_connect`](MemoryTransport::complete_connect) — models a
    /// slow-waking device.
    Manual,
}

/// Scriptable in-memory transport.
pub struct MemoryTransport {
    core: Arc<LinkCore>,
    behavior: Mutex<ConnectBehavior>,
    sent: Mutex<Vec<Payload>>,
    connect_calls: AtomicUsize,
}

impl MemoryTransport {
    /// A transport whose `connect()` succeeds immediately.
    pub fn new() -> Self {
        Self::with_behavior(ConnectBehavior::Succeed)
    }

    pub fn with_behavior(behavior: ConnectBehavior) -> Self {
        Self {
            core: Arc::new(LinkCore::new("memory")),
            behavior: Mutex::new(behavior),
            sent: Mutex::new(Vec::new()),
            connect_calls: AtomicUsize::new(0),
        }
    }

    /// Changes the scripted connect behavior for subsequent calls.
    pub fn set_behavior(&self, behavior: ConnectBehavior) {
        *self.behavior.lock().expect("behavior lock poisoned") = behavior;
    }

    /// Snapshot of every payload sent so far, in send order.
    pub fn sent(&self) -> Vec<Payload> {
        self.sent.lock().expect("sent lock poisoned").clone()
    }

    /// Number of sends so far.
    pub fn sent_count(&self) -> usize {
        self.sent.lock().expect("sent lock poisoned").len()
    }

    /// Number of `connect()` calls so far.
    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    /// Completes a [`ConnectBehavior::Manual`] connect attempt.
    pub fn complete_connect(&self) {
        self.core.set_state(ConnectionState::Connected);
    }

    /// Drives the state machine as if the link itself produced the
    /// transition (peer close, I/O failure).
    pub fn force_state(&self, state: ConnectionState) {
        self.core.set_state(state);
    }

    /// Delivers `payload` to message observers as if it arrived on the link.
    pub fn inject_message(&self, payload: Payload) {
        self.core.emit_message(&payload);
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransportClient for MemoryTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        let behavior = *self.behavior.lock().expect("behavior lock poisoned");
        self.core.set_state(ConnectionState::Connecting);
        match behavior {
            ConnectBehavior::Succeed => {
                self.core.set_state(ConnectionState::Connected);
                Ok(())
            }
            ConnectBehavior::Fail => {
                self.core.set_state(ConnectionState::Error);
                Err(TransportError::ConnectFailed {
                    target: "memory".to_owned(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::ConnectionRefused,
                        "scripted failure",
                    ),
                })
            }
            ConnectBehavior::Manual => Ok(()),
        }
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.core.set_state(ConnectionState::Disconnected);
        Ok(())
    }

    async fn send(&self, payload: Payload) -> Result<(), TransportError> {
        if !self.core.state().is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.sent.lock().expect("sent lock poisoned").push(payload);
        Ok(())
    }

    fn connection_state(&self) -> ConnectionState {
        self.core.state()
    }

    fn on_state_change(&self, observer: StateObserver) -> SubscriptionId {
        self.core.subscribe_state(observer)
    }

    fn on_message(&self, observer: MessageObserver) -> SubscriptionId {
        self.core.subscribe_message(observer)
    }

    fn unsubscribe_state(&self, id: SubscriptionId) -> bool {
        self.core.unsubscribe_state(id)
    }

    fn unsubscribe_message(&self, id: SubscriptionId) -> bool {
        self.core.unsubscribe_message(id)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
