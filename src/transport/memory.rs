//! In-process loopback transport.
//!
//! [`memory_transport`] returns a connected ([`MemoryConnector`],
//! [`MemoryListener`]) pair. Every `open()` on the connector hands the
//! listener a [`PeerLink`] representing the remote side of that connection,
//! so a test (or an embedding host) can play the peer: read the frames the
//! session sends, push frames back, and drop or fail the connection.
//!
//! ```ignore
//! let (connector, mut listener) = memory_transport();
//! let session = Session::new(config, Arc::new(connector), RoomRegistry::new())?;
//! let connecting = session.connect();
//! let mut peer = listener.accept().await.unwrap();
//! let hello = peer.recv().await;
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{Connector, Frame, Transport, TransportEvent};
use crate::error::TransportError;

/// Create a connected connector/listener pair.
#[must_use]
pub fn memory_transport() -> (MemoryConnector, MemoryListener) {
    let (accept_tx, accept_rx) = mpsc::unbounded_channel();
    let refuse = Arc::new(AtomicBool::new(false));
    (
        MemoryConnector {
            accept_tx,
            refuse: Arc::clone(&refuse),
        },
        MemoryListener { accept_rx, refuse },
    )
}

/// Client half: opens loopback transports.
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    accept_tx: mpsc::UnboundedSender<PeerLink>,
    refuse: Arc<AtomicBool>,
}

/// Server half: receives one [`PeerLink`] per opened transport.
#[derive(Debug)]
pub struct MemoryListener {
    accept_rx: mpsc::UnboundedReceiver<PeerLink>,
    refuse: Arc<AtomicBool>,
}

impl MemoryListener {
    /// Wait for the next connection. Returns `None` once every connector is dropped.
    pub async fn accept(&mut self) -> Option<PeerLink> {
        self.accept_rx.recv().await
    }

    /// Make subsequent `open()` calls fail (simulates an unreachable peer).
    pub fn set_refusing(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }
}

/// Remote side of one loopback connection.
#[derive(Debug)]
pub struct PeerLink {
    from_client: mpsc::UnboundedReceiver<Frame>,
    to_client: mpsc::UnboundedSender<TransportEvent>,
}

impl PeerLink {
    /// Next frame the client sent. `None` once the client closed its side.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.from_client.recv().await
    }

    /// Non-blocking variant of [`PeerLink::recv`].
    pub fn try_recv(&mut self) -> Option<Frame> {
        self.from_client.try_recv().ok()
    }

    /// Deliver a frame to the client. Returns `false` if the client side is gone.
    pub fn send(&self, frame: Frame) -> bool {
        self.to_client.send(TransportEvent::Message(frame)).is_ok()
    }

    /// Report a transport error to the client.
    pub fn fail(&self, info: impl Into<String>) {
        let _ = self.to_client.send(TransportEvent::Error(info.into()));
    }

    /// Close the connection from the peer side.
    pub fn close(self, reason: impl Into<String>) {
        let _ = self.to_client.send(TransportEvent::Closed(reason.into()));
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn open(&self, _url: &str) -> Result<Box<dyn Transport>, TransportError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(TransportError::Open("connection refused".to_string()));
        }

        let (client_tx, from_client) = mpsc::unbounded_channel();
        let (to_client, client_rx) = mpsc::unbounded_channel();

        self.accept_tx
            .send(PeerLink {
                from_client,
                to_client,
            })
            .map_err(|_| TransportError::Open("listener dropped".to_string()))?;

        Ok(Box::new(MemoryTransport {
            outbound: Some(client_tx),
            inbound: client_rx,
        }))
    }
}

/// Client side of one loopback connection.
#[derive(Debug)]
struct MemoryTransport {
    outbound: Option<mpsc::UnboundedSender<Frame>>,
    inbound: mpsc::UnboundedReceiver<TransportEvent>,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        let Some(tx) = self.outbound.as_ref() else {
            return Err(TransportError::Closed);
        };
        tx.send(frame)
            .map_err(|_| TransportError::Send("peer dropped".to_string()))
    }

    async fn next_event(&mut self) -> TransportEvent {
        self.inbound
            .recv()
            .await
            .unwrap_or_else(|| TransportEvent::Closed("peer dropped".to_string()))
    }

    async fn close(&mut self) {
        self.outbound = None;
        self.inbound.close();
    }
}
