//! Shared helpers: a scripted peer on the far side of the memory transport.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use std::sync::Arc;

use realtime_rpc::codec::Codec;
use realtime_rpc::protocol::{CallRequest, Message, TypedMessage};
use realtime_rpc::transport::{memory_transport, Frame, MemoryListener, PeerLink};
use realtime_rpc::{RoomRegistry, Session, SessionConfig};
use serde_json::{json, Value};

/// Keepalive far enough out that paused-time auto-advance never reaches it.
pub const QUIET_KEEPALIVE_SECS: u64 = 86_400;

pub fn test_config() -> SessionConfig {
    let mut config = SessionConfig::new("mem://realtime");
    config.keepalive_interval_secs = QUIET_KEEPALIVE_SECS;
    config
}

pub fn start(config: SessionConfig) -> (Session, MemoryListener) {
    start_with_rooms(config, RoomRegistry::new())
}

pub fn start_with_rooms(config: SessionConfig, rooms: RoomRegistry) -> (Session, MemoryListener) {
    let (connector, listener) = memory_transport();
    let session = Session::new(config, Arc::new(connector), rooms).unwrap();
    (session, listener)
}

/// The remote end of one connection.
pub struct Peer {
    pub link: PeerLink,
    codec: Codec,
}

impl Peer {
    pub fn new(link: PeerLink, config: &SessionConfig) -> Self {
        Self {
            link,
            codec: Codec::from_config(config).unwrap(),
        }
    }

    pub async fn accept(listener: &mut MemoryListener, config: &SessionConfig) -> Self {
        let link = listener.accept().await.expect("connector dropped");
        Self::new(link, config)
    }

    pub async fn recv(&mut self) -> Message {
        let frame = self.link.recv().await.expect("client closed the connection");
        self.codec.decode(frame).unwrap()
    }

    pub fn try_recv(&mut self) -> Option<Message> {
        self.link
            .try_recv()
            .map(|frame| self.codec.decode(frame).unwrap())
    }

    pub fn send(&self, message: &Message) {
        assert!(self.link.send(self.codec.encode(message).unwrap()));
    }

    pub fn send_raw(&self, frame: Frame) {
        assert!(self.link.send(frame));
    }

    /// Read the opening handshake request and role declaration.
    pub async fn expect_hello(&mut self) -> Message {
        let hello = self.recv().await;
        assert_eq!(self.recv().await, Message::role("user"));
        hello
    }

    pub fn assign_session(&self, id: &str, secret: &str) {
        self.send(&Message::event(
            "session.new",
            json!({"id": id, "secret": secret}),
            None,
        ));
    }

    pub fn challenge(&self, n: i64) {
        self.send(&Message::event("rand.check", json!(n), None));
    }

    pub async fn expect_answer(&mut self) -> Value {
        match self.recv().await {
            Message::ChallengeAnswer { answer } => answer,
            other => panic!("expected challenge answer, got {other:?}"),
        }
    }

    /// Full fresh handshake: session `s1`/`k1`, challenge 41.
    pub async fn handshake(&mut self) {
        assert_eq!(self.expect_hello().await, Message::session_new());
        self.assign_session("s1", "k1");
        self.challenge(41);
        assert_eq!(self.expect_answer().await, json!(42));
    }

    pub async fn recv_call(&mut self) -> CallRequest {
        match self.recv().await {
            Message::Typed(TypedMessage::Call(call)) => call,
            other => panic!("expected call, got {other:?}"),
        }
    }

    pub fn event(&self, name: &str, payload: Value, room: Option<&str>) {
        self.send(&Message::event(name, payload, room.map(str::to_string)));
    }
}

/// Connect `session` and run a fresh handshake on the far side.
pub async fn connect(session: &Session, listener: &mut MemoryListener, config: &SessionConfig) -> Peer {
    let (ready, peer) = tokio::join!(session.connect(), async {
        let mut peer = Peer::accept(listener, config).await;
        peer.handshake().await;
        peer
    });
    ready.unwrap();
    peer
}
