//! Protocol and timing constants for the realtime session engine.
//!
//! This module centralizes the magic numbers and reserved names shared by
//! the codec, the connection manager and the dispatcher. Constants are
//! grouped by domain with documentation explaining their purpose.
//!
//! # Categories
//!
//! - **Timing**: Reconnect delay and keepalive cadence
//! - **Codec**: Default cipher key and compression level
//! - **Protocol**: Discriminants and reserved event names on the wire
//! - **Local events**: Names of notifications raised by the engine itself

use std::time::Duration;

// ============================================================================
// Timing
// ============================================================================

/// Fixed delay between a lost connection and the next connect attempt.
///
/// There is no backoff: failures are retried indefinitely at this interval.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Interval between keepalive calls.
///
/// The keepalive timer starts when the session is constructed and keeps
/// ticking across reconnects.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(10);

/// Method name (before namespacing) of the keepalive call.
pub const KEEPALIVE_METHOD: &str = "ping";

// ============================================================================
// Codec
// ============================================================================

/// Default repeating XOR key applied to compressed frames.
pub const DEFAULT_CIPHER_KEY: &str = "pan-light";

/// Default gzip compression level (0-9).
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Largest decompressed frame accepted from the peer (16 MiB).
pub const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

// ============================================================================
// Protocol
// ============================================================================

/// Role declared to the peer after the session handshake.
///
/// Also used as the namespace prefix for outbound application calls.
pub const DEFAULT_ROLE: &str = "user";

/// Event carrying a freshly assigned `{id, secret}` session.
pub const EVENT_SESSION_ASSIGNED: &str = "session.new";

/// Event carrying the numeric liveness challenge.
pub const EVENT_LIVENESS_CHALLENGE: &str = "rand.check";

/// Key of the challenge answer record.
pub const CHALLENGE_ANSWER_KEY: &str = "rand.back";

/// Server-pushed keepalive event, logged at trace level only.
pub const EVENT_PING: &str = "ping";

/// Result value of a successful keepalive call.
pub const KEEPALIVE_RESULT: &str = "pong";

// ============================================================================
// Local events
// ============================================================================

/// Prefix under which remote events are registered in the global registry.
pub const REMOTE_EVENT_PREFIX: &str = "$remote.";

/// Raised (locally) when a room is created on demand.
pub const LOCAL_ROOM_CREATED: &str = "room.new";

/// Raised (locally) when the transport closes.
pub const LOCAL_CONNECTION_CLOSED: &str = "realtime.closed";

/// Raised (locally) when the transport reports an error.
pub const LOCAL_CONNECTION_ERROR: &str = "rt.error";
