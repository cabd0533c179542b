//! # avlink-core
//!
//! Shared foundation for AVLink, an integration library that drives
//! heterogeneous AV hardware (cameras, lighting buses, motorized screens,
//! media recorders) over serial, TCP, UDP, SSH, and HTTP links.
//!
//! This crate contains the pieces every device transport and device adapter
//! shares.  It has zero dependencies on sockets, serial ports, or any async
//! runtime — only plain types and std synchronization:
//!
//! - **`state`** – The [`ConnectionState`] lifecycle of a transport link and
//!   the coarser [`CommunicationState`] health signal adapters derive from
//!   send outcomes.
//!
//! - **`payload`** – [`Payload`], the unit of data crossing a link.  Text and
//!   raw bytes are both first-class; neither is encoded as the other.
//!
//! - **`error`** – [`TransportError`], the failure taxonomy shared by all
//!   transport variants.
//!
//! - **`observer`** – [`ObserverSet`], an ordered multicast registry used for
//!   connection-state-changed and message-received events.
//!
//! - **`sequence`** – [`RecencyCounter`], the monotonic token source behind
//!   the idle-disconnect "is this still the latest activity" check.

pub mod error;
pub mod observer;
pub mod payload;
pub mod sequence;
pub mod state;

// Re-export the most-used types at the crate root so callers can write
// `avlink_core::Payload` instead of `avlink_core::payload::Payload`.
pub use error::TransportError;
pub use observer::{ObserverSet, SubscriptionId};
pub use payload::Payload;
pub use sequence::RecencyCounter;
pub use state::{CommunicationState, ConnectionState};
