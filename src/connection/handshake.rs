//! Two-part handshake tracking.
//!
//! After the transport opens the peer pushes two events, in either order:
//!
//! - `session.new` with `{id, secret}` (skipped when resuming a known session)
//! - `rand.check` with a number that must be answered with `{"rand.back": n + 1}`
//!
//! The connection is ready once both parts are done. [`Handshake`] reports
//! that transition exactly once per connection attempt.

use serde::Deserialize;
use serde_json::{json, Value};

/// Session identity assigned by the peer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub(crate) struct SessionCredentials {
    pub id: String,
    pub secret: String,
}

impl SessionCredentials {
    /// Parse a `session.new` payload.
    pub fn from_payload(payload: &Value) -> Option<Self> {
        Self::deserialize(payload).ok()
    }
}

/// Handshake progress for one connection attempt.
#[derive(Debug)]
pub(crate) struct Handshake {
    session_known: bool,
    challenge_answered: bool,
    completed: bool,
}

impl Handshake {
    /// Start tracking. `resuming` marks the session half as already satisfied.
    pub fn new(resuming: bool) -> Self {
        Self {
            session_known: resuming,
            challenge_answered: false,
            completed: false,
        }
    }

    /// Record a session assignment. Returns `true` if this completed the handshake.
    pub fn session_assigned(&mut self) -> bool {
        self.session_known = true;
        self.check()
    }

    /// Record a challenge answer. Returns `true` if this completed the handshake.
    pub fn challenge_answered(&mut self) -> bool {
        self.challenge_answered = true;
        self.check()
    }

    fn check(&mut self) -> bool {
        if self.completed || !self.session_known || !self.challenge_answered {
            return false;
        }
        self.completed = true;
        true
    }
}

/// `challenge + 1`, preserving integer vs float. `None` if not a number.
pub(crate) fn answer_challenge(challenge: &Value) -> Option<Value> {
    if let Some(n) = challenge.as_i64() {
        Some(json!(n.wrapping_add(1)))
    } else if let Some(n) = challenge.as_u64() {
        Some(json!(n.wrapping_add(1)))
    } else {
        challenge.as_f64().map(|n| json!(n + 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_either_order_completes_once() {
        let mut hs = Handshake::new(false);
        assert!(!hs.session_assigned());
        assert!(hs.challenge_answered());
        assert!(!hs.challenge_answered());

        let mut hs = Handshake::new(false);
        assert!(!hs.challenge_answered());
        assert!(hs.session_assigned());
        assert!(!hs.session_assigned());
    }

    #[test]
    fn test_resume_needs_only_challenge() {
        let mut hs = Handshake::new(true);
        assert!(hs.challenge_answered());
        assert!(!hs.session_assigned());
    }

    #[test]
    fn test_answer_challenge() {
        assert_eq!(answer_challenge(&json!(41)), Some(json!(42)));
        assert_eq!(answer_challenge(&json!(-1)), Some(json!(0)));
        assert_eq!(answer_challenge(&json!(i64::MAX)), Some(json!(i64::MIN)));
        assert_eq!(answer_challenge(&json!(u64::MAX)), Some(json!(0u64)));
        assert_eq!(answer_challenge(&json!(0.5)), Some(json!(1.5)));
        assert_eq!(answer_challenge(&json!("41")), None);
        assert_eq!(answer_challenge(&Value::Null), None);
    }

    #[test]
    fn test_credentials_from_payload() {
        let creds = SessionCredentials::from_payload(&json!({"id": "s1", "secret": "k"})).unwrap();
        assert_eq!(creds.id, "s1");
        assert!(SessionCredentials::from_payload(&json!({"id": "s1"})).is_none());
    }
}
