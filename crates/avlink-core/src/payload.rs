//! The unit of data crossing a transport link.
//!
//! Device protocols in this codebase split roughly in half: line-oriented
//! ASCII command sets (Extron SIS, projector RS-232 dialects) and raw binary
//! framing (VISCA, DyNet, Modbus).  [`Payload`] keeps both first-class so a
//! transport never has to guess an encoding — a `Text` payload is sent as its
//! UTF-8 bytes, a `Binary` payload is sent verbatim.

/// A single outbound command or inbound message on a transport link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// UTF-8 text (line protocols, JSON bodies, CLI commands).
    Text(String),
    /// Raw bytes (binary framing, register writes).
    Binary(Vec<u8>),
}

impl Payload {
    /// The on-the-wire bytes of this payload.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Payload::Text(s) => s.as_bytes(),
            Payload::Binary(b) => b,
        }
    }

    /// Byte length of the payload.
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Returns `true` when the payload carries zero bytes.
    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    /// Builds a payload from inbound bytes, preferring `Text` when the bytes
    /// are valid UTF-8.
    ///
    /// Inbound data has no type tag, so receivers use this to hand adapters
    /// the friendlier representation without ever losing bytes.
    pub fn from_inbound(bytes: &[u8]) -> Self {
        match std::str::from_utf8(bytes) {
            Ok(s) => Payload::Text(s.to_owned()),
            Err(_) => Payload::Binary(bytes.to_vec()),
        }
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Payload::Text(s.to_owned())
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Payload::Text(s)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(b: Vec<u8>) -> Self {
        Payload::Binary(b)
    }
}

impl From<&[u8]> for Payload {
    fn from(b: &[u8]) -> Self {
        Payload::Binary(b.to_vec())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
