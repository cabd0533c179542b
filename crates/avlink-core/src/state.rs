//! Connection and communication lifecycle states.
//!
//! Every transport instance owns exactly one [`ConnectionState`] and mutates
//! it only from its own connect/disconnect/I-O paths.  Observers read it
//! through `connection_state()` or receive it in state-change events.
//!
//! [`CommunicationState`] is the coarser signal a *device adapter* derives
//! from send outcomes ("is the device answering me"), and is owned by the
//! adapter, never by the transport.

use serde::{Deserialize, Serialize};

/// Lifecycle phase of a single transport link.
///
/// Transitions:
///
/// ```text
/// Unknown / NotAttempted ──► Connecting ──► Connected
///                                              │
///                        clean peer close ► Disconnected
///                        I/O failure      ► Error
/// ```
///
/// From `Disconnected` or `Error`, `connect()` may be invoked again to
/// attempt `Connecting → Connected`.  The transport layer never reconnects a
/// dropped link on its own — reconnection policy belongs to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No information yet (freshly constructed transport).
    Unknown,
    /// Constructed but `connect()` has never been called.
    NotAttempted,
    /// A connection attempt is in progress.
    Connecting,
    /// The link is open and `send()` is permitted.
    Connected,
    /// The peer closed the link cleanly.
    Disconnected,
    /// The link failed with diagnostic information (I/O error, refused, …).
    Error,
}

impl ConnectionState {
    /// Returns `true` only for [`ConnectionState::Connected`].
    pub fn is_connected(self) -> bool {
        self == ConnectionState::Connected
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Unknown => "unknown",
            ConnectionState::NotAttempted => "not_attempted",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Error => "error",
        };
        f.write_str(s)
    }
}

/// Device-level communication health, derived by adapters from send outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommunicationState {
    /// No information yet.
    Unknown,
    /// No command has been sent to the device.
    NotAttempted,
    /// The most recent exchange succeeded.
    Okay,
    /// The most recent exchange failed.
    Error,
}

impl CommunicationState {
    /// Folds a send outcome into the coarse health signal.
    pub fn from_send_outcome(ok: bool) -> Self {
        if ok {
            CommunicationState::Okay
        } else {
            CommunicationState::Error
        }
    }

    /// Returns `true` only for [`CommunicationState::Okay`].
    pub fn is_okay(self) -> bool {
        self == CommunicationState::Okay
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_connected_reports_is_connected() {
        // Arrange
        let all = [
            ConnectionState::Unknown,
            ConnectionState::NotAttempted,
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Disconnected,
            ConnectionState::Error,
        ];

        // Act / Assert
        for state in all {
            assert_eq!(state.is_connected(), state == ConnectionState::Connected);
        }
    }

    #[test]
    fn test_connection_state_display_is_snake_case() {
        assert_eq!(ConnectionState::NotAttempted.to_string(), "not_attempted");
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
    }

    #[test]
    fn test_connection_state_serde_round_trip() {
        // Arrange
        #[derive(Serialize, Deserialize)]
        struct Wrapper {
            state: ConnectionState,
        }
        let w = Wrapper {
            state: ConnectionState::Connecting,
        };

        // Act
        let text = toml::to_string(&w).expect("serialize");
        let restored: Wrapper = toml::from_str(&text).expect("deserialize");

        // Assert
        assert_eq!(restored.state, ConnectionState::Connecting);
        assert!(text.contains("connecting"), "snake_case on the wire");
    }

    #[test]
    fn test_communication_state_from_send_outcome() {
        assert_eq!(
            CommunicationState::from_send_outcome(true),
            CommunicationState::Okay
        );
        assert_eq!(
            CommunicationState::from_send_outcome(false),
            CommunicationState::Error
        );
    }

    #[test]
    fn test_communication_state_is_okay() {
        assert!(CommunicationState::Okay.is_okay());
        assert!(!CommunicationState::Unknown.is_okay());
        assert!(!CommunicationState::Error.is_okay());
    }
}
