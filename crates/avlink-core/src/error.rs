//! Failure taxonomy shared by all transport variants.

use thiserror::Error;

/// An I/O or lifecycle failure on a transport link.
///
/// Transport errors are never fatal: the transport downgrades its state to
/// [`Error`](crate::ConnectionState::Error) (or reports the failure on the
/// return path) and the caller decides whether and when to retry.  The core
/// imposes no retry or backoff policy.
#[derive(Debug, Error)]
pub enum TransportError {
    /// `send()` was called while the link was not in the `Connected` state.
    ///
    /// Callers that want queue-then-flush behavior must opt into it
    /// explicitly via the on-demand controller; a bare transport never
    /// silently buffers.
    #[error("transport is not connected")]
    NotConnected,

    /// The connection attempt itself failed.
    #[error("failed to connect to {target}: {source}")]
    ConnectFailed {
        target: String,
        #[source]
        source: std::io::Error,
    },

    /// An I/O error on an established link.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A session-layer failure (SSH handshake/auth, HTTP request).
    #[error("session error: {0}")]
    Session(String),

    /// The configured endpoint could not be parsed or resolved.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

impl TransportError {
    /// `true` when the failure means "call `connect()` first".
    pub fn is_not_connected(&self) -> bool {
        matches!(self, TransportError::NotConnected)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
