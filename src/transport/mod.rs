//! Transport seam between the connection manager and the socket.
//!
//! The manager never touches a socket type directly. It asks a
//! [`Connector`] to open a [`Transport`] (the "open" signal is the returned
//! `Ok`), writes [`Frame`]s through it, and reads [`TransportEvent`]s from
//! it until the transport reports an error or close.
//!
//! # Implementations
//!
//! - [`ws::WsConnector`] - WebSocket via `tokio-tungstenite`
//! - [`memory::MemoryConnector`] - in-process loopback for tests and embedding

pub mod memory;
pub mod ws;

use async_trait::async_trait;

use crate::error::TransportError;

pub use memory::{memory_transport, MemoryConnector, MemoryListener, PeerLink};
pub use ws::WsConnector;

/// A single transmittable frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Binary frame (compressed + XOR-ed payloads).
    Binary(Vec<u8>),
    /// UTF-8 text frame (plain JSON payloads).
    Text(String),
}

impl Frame {
    /// Raw bytes of the frame, regardless of kind.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Binary(bytes) => bytes,
            Self::Text(text) => text.into_bytes(),
        }
    }

    /// Length of the payload in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Binary(bytes) => bytes.len(),
            Self::Text(text) => text.len(),
        }
    }

    /// Whether the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Signal emitted by an open transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A frame arrived.
    Message(Frame),
    /// The socket reported an error; the transport is unusable afterwards.
    Error(String),
    /// The socket closed, with a human-readable reason.
    Closed(String),
}

/// Opens transports to a URL.
#[async_trait]
pub trait Connector: Send + Sync + std::fmt::Debug {
    /// Open a new transport. Returning `Ok` is the "open" signal.
    async fn open(&self, url: &str) -> Result<Box<dyn Transport>, TransportError>;
}

/// An open, binary-safe, full-duplex connection.
#[async_trait]
pub trait Transport: Send + std::fmt::Debug {
    /// Write one frame.
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError>;

    /// Wait for the next signal.
    ///
    /// Must be cancel-safe: it is polled inside `tokio::select!`. After an
    /// `Error` or `Closed` event the transport is not polled again.
    async fn next_event(&mut self) -> TransportEvent;

    /// Close the connection. Idempotent.
    async fn close(&mut self);
}
