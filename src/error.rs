//! Error types for the session engine.
//!
//! Three layers, each a `thiserror` enum:
//!
//! - [`CodecError`] - a frame could not be encoded or decoded
//! - [`TransportError`] - the socket failed to open or to accept a frame
//! - [`SessionError`] - what application code sees from `connect()` / `call()`
//!
//! Transport and codec failures are never surfaced to callers directly: the
//! connection manager treats both as a lost connection and reconnects.

use thiserror::Error;

/// Failure encoding or decoding a frame.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Serializing a message to JSON failed.
    #[error("Failed to serialize message: {0}")]
    Serialize(#[source] serde_json::Error),
    /// The decoded bytes were not valid JSON.
    #[error("Failed to deserialize message: {0}")]
    Deserialize(#[source] serde_json::Error),
    /// Gzip encoding failed.
    #[error("Compression failed: {0}")]
    Compress(#[source] std::io::Error),
    /// Gzip decoding failed (corrupt frame or wrong cipher key).
    #[error("Decompression failed: {0}")]
    Decompress(#[source] std::io::Error),
    /// The JSON was well-formed but did not match the shape its
    /// discriminant promises.
    #[error("Malformed '{kind}' message: {reason}")]
    Malformed {
        /// Discriminant of the offending message.
        kind: String,
        /// What was wrong with it.
        reason: String,
    },
    /// The discriminant is not part of the protocol vocabulary.
    ///
    /// Unlike every other variant this is not fatal: the frame is dropped.
    #[error("Unknown message kind: {0}")]
    UnknownKind(String),
}

impl CodecError {
    /// Whether this error should tear the connection down.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::UnknownKind(_))
    }
}

/// Socket-level failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The connection could not be established.
    #[error("Connection failed: {0}")]
    Open(String),
    /// A frame could not be written.
    #[error("Send failed: {0}")]
    Send(String),
    /// The transport is already closed.
    #[error("Transport closed")]
    Closed,
}

/// Errors returned to application code.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The socket failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// A frame could not be encoded or decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// A call was issued before the handshake completed and the session is
    /// configured to fail fast instead of queueing.
    #[error("Handshake incomplete: connection is not ready for calls")]
    HandshakeIncomplete,
    /// The connection dropped while the call was in flight.
    #[error("Connection reset before a response arrived")]
    ConnectionReset,
    /// The peer answered the call with `success: false`.
    #[error("Remote call failed: {0}")]
    Remote(serde_json::Value),
    /// The session was shut down.
    #[error("Session closed")]
    Closed,
    /// The configuration is unusable.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_kind_is_not_fatal() {
        assert!(!CodecError::UnknownKind("presence".into()).is_fatal());
        let malformed = CodecError::Malformed {
            kind: "event".into(),
            reason: "missing field `event`".into(),
        };
        assert!(malformed.is_fatal());
    }

    #[test]
    fn test_remote_error_display_includes_payload() {
        let err = SessionError::Remote(serde_json::json!({"code": 403}));
        assert_eq!(err.to_string(), r#"Remote call failed: {"code":403}"#);
    }

    #[test]
    fn test_transport_error_converts() {
        let err: SessionError = TransportError::Send("broken pipe".into()).into();
        assert_eq!(err.to_string(), "Send failed: broken pipe");
    }
}
