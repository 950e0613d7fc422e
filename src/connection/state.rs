//! Connection state machine values.

use tokio::sync::watch;

/// Lifecycle of the connection manager.
///
/// ```text
/// Disconnected ──connect──► Connecting ──open──► AwaitingHandshake ──handshake──► Ready
///      ▲                        ▲                      │                           │
///      │                        └──── 5s delay ◄───────┴──── close / error ◄───────┘
///      └── Closing ◄── shutdown (from any state)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No transport; either never started or waiting out the reconnect delay.
    #[default]
    Disconnected,
    /// Opening a transport.
    Connecting,
    /// Transport open; handshake sent, waiting for the session and challenge.
    AwaitingHandshake,
    /// Handshake complete; calls are sent immediately.
    Ready,
    /// Shutting down.
    Closing,
}

impl ConnectionState {
    /// Whether calls can be written right now.
    #[must_use]
    pub fn is_ready(self) -> bool {
        self == Self::Ready
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::AwaitingHandshake => "awaiting_handshake",
            Self::Ready => "ready",
            Self::Closing => "closing",
        };
        f.write_str(name)
    }
}

/// Watch channel carrying the current state.
pub(crate) type SharedConnectionState = watch::Sender<ConnectionState>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_and_display() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
        assert_eq!(ConnectionState::AwaitingHandshake.to_string(), "awaiting_handshake");
        assert!(ConnectionState::Ready.is_ready());
        assert!(!ConnectionState::Connecting.is_ready());
    }
}
