//! Polymorphic transport clients.
//!
//! A [`TransportClient`] is the capability set every device adapter codes
//! against: connect/disconnect/send over one physical link, plus two
//! multicast event streams — connection-state changes and inbound messages.
//! Variants cover the links the device fleet actually uses:
//!
//! | Variant                     | Link                           |
//! |-----------------------------|--------------------------------|
//! | [`tcp::TcpTransport`]       | stream socket                  |
//! | [`udp::UdpTransport`]       | datagram socket                |
//! | [`serial::SerialTransport`] | RS-232 / RS-485 serial port    |
//! | [`ssh::SshTransport`]       | SSH-2 shell session            |
//! | [`http::HttpTransport`]     | HTTP request/response endpoint |
//! | [`memory::MemoryTransport`] | in-process test double         |
//!
//! The transport layer owns no wire format and never interprets payloads:
//! the inbound delivery unit is whatever the link naturally produces (a read
//! chunk, a datagram, a response body), and adapters layer framing on top.
//!
//! # Events
//!
//! Observers are invoked synchronously on whichever thread produced the
//! event — reader task, connect path, or poll loop — in registration order.
//! Within one transport, inbound messages preserve arrival order; across
//! transports no ordering is guaranteed.

pub mod http;
pub mod memory;
pub mod serial;
pub mod ssh;
pub mod tcp;
pub mod udp;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use avlink_core::{ConnectionState, ObserverSet, Payload, SubscriptionId, TransportError};

/// Observer callback for connection-state changes.
pub type StateObserver = Box<dyn Fn(&ConnectionState) + Send + Sync>;

/// Observer callback for inbound messages.
pub type MessageObserver = Box<dyn Fn(&Payload) + Send + Sync>;

/// Capability set over one physical communication link.
///
/// `send` requires the `Connected` state and fails with
/// [`TransportError::NotConnected`] otherwise — it never silently buffers.
/// The transport performs no automatic reconnection of a dropped link;
/// reconnection policy belongs to the caller (see
/// [`OnDemandSender`](crate::on_demand::OnDemandSender) for one such policy).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransportClient: Send + Sync {
    /// Attempts to open the link, transitioning `Connecting → Connected`.
    async fn connect(&self) -> Result<(), TransportError>;

    /// Closes the link deterministically, transitioning to `Disconnected`.
    async fn disconnect(&self) -> Result<(), TransportError>;

    /// Sends one payload on the open link.
    async fn send(&self, payload: Payload) -> Result<(), TransportError>;

    /// Current lifecycle state of this link.
    fn connection_state(&self) -> ConnectionState;

    /// Registers an observer for connection-state changes.
    fn on_state_change(&self, observer: StateObserver) -> SubscriptionId;

    /// Registers an observer for inbound messages.
    fn on_message(&self, observer: MessageObserver) -> SubscriptionId;

    /// Removes a state-change observer.  Returns `false` if already removed.
    fn unsubscribe_state(&self, id: SubscriptionId) -> bool;

    /// Removes a message observer.  Returns `false` if already removed.
    fn unsubscribe_message(&self, id: SubscriptionId) -> bool;
}

/// State and event plumbing shared by every transport variant.
///
/// Each concrete transport owns one `LinkCore` and routes all state
/// mutations and message deliveries through it.
///
/// # Connection epochs
///
/// Every successful `connect()` mints a new *epoch*.  Background reader
/// contexts capture the epoch they were spawned under and report EOF/errors
/// through [`set_state_if_epoch`](LinkCore::set_state_if_epoch), so a reader
/// left over from a previous connection can never clobber the state of the
/// link that replaced it.
pub(crate) struct LinkCore {
    target: String,
    state: Mutex<ConnectionState>,
    epoch: AtomicU64,
    state_observers: ObserverSet<ConnectionState>,
    message_observers: ObserverSet<Payload>,
}

impl LinkCore {
    pub(crate) fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            state: Mutex::new(ConnectionState::NotAttempted),
            epoch: AtomicU64::new(0),
            state_observers: ObserverSet::new(),
            message_observers: ObserverSet::new(),
        }
    }

    /// Identifier of the peer (host:port, device path, URL) for logging.
    pub(crate) fn target(&self) -> &str {
        &self.target
    }

    pub(crate) fn state(&self) -> ConnectionState {
        *self.state.lock().expect("state lock poisoned")
    }

    /// Transitions to `new`, notifying observers only on an actual change.
    ///
    /// Observers run synchronously on the calling thread, outside the state
    /// lock.
    pub(crate) fn set_state(&self, new: ConnectionState) {
        let changed = {
            let mut state = self.state.lock().expect("state lock poisoned");
            if *state == new {
                false
            } else {
                *state = new;
                true
            }
        };
        if changed {
            debug!(target = %self.target, state = %new, "connection state changed");
            self.state_observers.emit(&new);
        }
    }

    /// Epoch-guarded state transition for background reader contexts.
    ///
    /// Returns `false` (and does nothing) when `epoch` is no longer current.
    pub(crate) fn set_state_if_epoch(&self, epoch: u64, new: ConnectionState) -> bool {
        if self.epoch.load(Ordering::SeqCst) != epoch {
            return false;
        }
        self.set_state(new);
        true
    }

    /// Invalidates all outstanding reader contexts and returns a new epoch.
    pub(crate) fn next_epoch(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Delivers one inbound message to every observer, in registration order.
    pub(crate) fn emit_message(&self, payload: &Payload) {
        self.message_observers.emit(payload);
    }

    /// Epoch-guarded message delivery for background reader contexts.
    pub(crate) fn emit_message_if_epoch(&self, epoch: u64, payload: &Payload) -> bool {
        if self.epoch.load(Ordering::SeqCst) != epoch {
            return false;
        }
        self.emit_message(payload);
        true
    }

    pub(crate) fn subscribe_state(&self, observer: StateObserver) -> SubscriptionId {
        self.state_observers.subscribe(observer)
    }

    pub(crate) fn subscribe_message(&self, observer: MessageObserver) -> SubscriptionId {
        self.message_observers.subscribe(observer)
    }

    pub(crate) fn unsubscribe_state(&self, id: SubscriptionId) -> bool {
        self.state_observers.unsubscribe(id)
    }

    pub(crate) fn unsubscribe_message(&self, id: SubscriptionId) -> bool {
        self.message_observers.unsubscribe(id)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_link_core_starts_not_attempted() {
        let core = LinkCore::new("10.0.40.21:4999");
        assert_eq!(core.state(), ConnectionState::NotAttempted);
        assert_eq!(core.target(), "10.0.40.21:4999");
    }

    #[test]
    fn test_set_state_notifies_only_on_transition() {
        // Arrange
        let core = LinkCore::new("test");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        core.subscribe_state(Box::new(move |state| s.lock().unwrap().push(*state)));

        // Act – a repeated state must not re-fire
        core.set_state(ConnectionState::Connecting);
        core.set_state(ConnectionState::Connecting);
        core.set_state(ConnectionState::Connected);

        // Assert
        assert_eq!(
            seen.lock().unwrap().as_slice(),
            [ConnectionState::Connecting, ConnectionState::Connected]
        );
    }

    #[test]
    fn test_stale_epoch_cannot_change_state_or_deliver() {
        // Arrange – a reader from epoch 1, superseded by epoch 2
        let core = LinkCore::new("test");
        let old_epoch = core.next_epoch();
        core.set_state(ConnectionState::Connected);
        let _new_epoch = core.next_epoch();

        let messages = Arc::new(Mutex::new(Vec::new()));
        let m = Arc::clone(&messages);
        core.subscribe_message(Box::new(move |p| m.lock().unwrap().push(p.clone())));

        // Act
        let state_applied = core.set_state_if_epoch(old_epoch, ConnectionState::Error);
        let msg_applied = core.emit_message_if_epoch(old_epoch, &Payload::from("stale"));

        // Assert – the stale reader is a no-op on both paths
        assert!(!state_applied);
        assert!(!msg_applied);
        assert_eq!(core.state(), ConnectionState::Connected);
        assert!(messages.lock().unwrap().is_empty());
    }

    #[test]
    fn test_current_epoch_delivers() {
        let core = LinkCore::new("test");
        let epoch = core.next_epoch();

        let messages = Arc::new(Mutex::new(Vec::new()));
        let m = Arc::clone(&messages);
        core.subscribe_message(Box::new(move |p| m.lock().unwrap().push(p.clone())));

        assert!(core.emit_message_if_epoch(epoch, &Payload::from("fresh")));
        assert_eq!(
            messages.lock().unwrap().as_slice(),
            [Payload::from("fresh")]
        );
    }

    #[test]
    fn test_unsubscribe_state_observer() {
        let core = LinkCore::new("test");
        let seen = Arc::new(Mutex::new(0u32));
        let s = Arc::clone(&seen);
        let id = core.subscribe_state(Box::new(move |_| *s.lock().unwrap() += 1));

        core.set_state(ConnectionState::Connecting);
        assert!(core.unsubscribe_state(id));
        core.set_state(ConnectionState::Connected);

        assert_eq!(*seen.lock().unwrap(), 1);
        assert!(!core.unsubscribe_state(id), "second removal reports false");
    }
}
