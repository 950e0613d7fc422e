//! Realtime RPC - a persistent session engine over one obfuscated socket.
//!
//! A [`Session`] keeps a single full-duplex connection to a peer alive,
//! multiplexing three kinds of traffic over it: correlated request/response
//! calls, server-pushed events, and room-scoped events.
//!
//! # Architecture
//!
//! - **Codec** - JSON, then gzip, then a repeating-key XOR (or plain JSON text)
//! - **Connection manager** - state machine, two-part handshake, fixed-delay
//!   reconnect and keepalive, running as one tokio task
//! - **Correlator** - outstanding calls keyed by correlation id
//! - **Dispatcher** - global and per-room listener fan-out
//!
//! # Modules
//!
//! - [`codec`] - frame encoding and decoding
//! - [`connection`] - [`Session`], [`CallHandle`] and [`ConnectionState`]
//! - [`correlator`] - pending call table
//! - [`dispatch`] - listeners and rooms
//! - [`transport`] - socket seam (WebSocket and in-memory)
//! - [`config`] - configuration loading

pub mod codec;
pub mod connection;
pub mod correlator;
pub mod dispatch;
pub mod protocol;
pub mod transport;

pub mod config;
pub mod constants;
pub mod error;

// Re-export commonly used types
pub use codec::Codec;
pub use config::{PendingPolicy, SessionConfig};
pub use connection::{CallHandle, ConnectionState, Session};
pub use dispatch::{Event, ListenerId, Room, RoomRegistry};
pub use error::{CodecError, SessionError, TransportError};
pub use protocol::Message;
pub use transport::{Connector, Frame, Transport, TransportEvent};
