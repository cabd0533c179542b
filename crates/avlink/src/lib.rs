//! Device communication runtime: transports, scheduling, and connection
//! lifecycle for AV hardware integrations.
//!
//! Adapters for projectors, cameras, switchers, and similar controllable
//! devices are built from a handful of shared pieces:
//!
//! - [`transport`] — the [`TransportClient`] trait and its TCP, UDP,
//!   serial, SSH, and HTTP implementations, all reporting through one
//!   state machine and observer surface.
//! - [`task`] — [`ScheduledTask`], the restartable periodic loop behind
//!   every polling concern.
//! - [`keepalive`] — the status poller adapters run on that loop.
//! - [`on_demand`] — [`OnDemandSender`], for devices whose link must be
//!   opened per command burst and closed when idle.
//! - [`handshake`] — scripted post-connect sequences (logins, mode
//!   switches) that run on every reconnect.
//! - [`config`] — the TOML device description and the transport factory.
//!
//! Shared primitives (payloads, states, errors, observers) live in
//! [`avlink_core`] and are re-exported here.

pub mod config;
pub mod handshake;
pub mod keepalive;
pub mod on_demand;
pub mod task;
pub mod transport;

pub use avlink_core::{
    CommunicationState, ConnectionState, ObserverSet, Payload, RecencyCounter, SubscriptionId,
    TransportError,
};

pub use config::{ConfigError, DeviceConfig, TimingConfig, TransportConfig, TransportKind};
pub use handshake::{HandshakeSequence, HandshakeStep};
pub use keepalive::status_poller;
pub use on_demand::{OnDemandConfig, OnDemandSender};
pub use task::{ActionError, ActionFuture, ScheduledTask};
pub use transport::{MessageObserver, StateObserver, TransportClient};
