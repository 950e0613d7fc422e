//! Logical wire messages.
//!
//! Every frame decodes to exactly one [`Message`]. Most records carry a
//! `type` discriminant; two handshake records (`{role}` and `{"rand.back"}`)
//! are keyed by their single field instead:
//!
//! ```text
//! {"type":"session.new"}
//! {"type":"session.resume","sessionId":"..","sessionSecret":".."}
//! {"role":"user"}
//! {"rand.back":42}
//! {"type":"call","method":"user.ping","param":{},"id":"cb.."}
//! {"type":"call.result","id":"cb..","success":true,"result":"pong"}
//! {"type":"event","event":"chat","payload":{..},"room":"lobby"}
//! ```
//!
//! Decoding fails closed: a record whose shape does not match any variant
//! is an error, never an untyped map forwarded to listeners.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::constants::CHALLENGE_ANSWER_KEY;
use crate::error::CodecError;

/// Discriminant values of typed records.
pub mod kind {
    /// Request a fresh session.
    pub const SESSION_NEW: &str = "session.new";
    /// Resume a previously assigned session.
    pub const SESSION_RESUME: &str = "session.resume";
    /// Correlated request.
    pub const CALL: &str = "call";
    /// Response to a correlated request.
    pub const CALL_RESULT: &str = "call.result";
    /// Server-pushed event.
    pub const EVENT: &str = "event";
}

/// One logical protocol message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Message {
    /// A record with a `type` discriminant.
    Typed(TypedMessage),
    /// Role declaration sent after the session handshake.
    Role {
        /// Declared role (`"user"`).
        role: String,
    },
    /// Answer to a liveness challenge.
    ChallengeAnswer {
        /// `challenge + 1`.
        #[serde(rename = "rand.back")]
        answer: Value,
    },
}

/// Records discriminated by their `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TypedMessage {
    /// Ask the peer for a new session.
    #[serde(rename = "session.new")]
    SessionNew,
    /// Ask the peer to resume an existing session.
    #[serde(rename = "session.resume", rename_all = "camelCase")]
    SessionResume {
        /// Previously assigned session id.
        session_id: String,
        /// Previously assigned session secret.
        session_secret: String,
    },
    /// Correlated request.
    #[serde(rename = "call")]
    Call(CallRequest),
    /// Response to a correlated request.
    #[serde(rename = "call.result")]
    CallResult(CallResult),
    /// Server-pushed event, optionally scoped to a room.
    #[serde(rename = "event")]
    Event(EventMessage),
}

/// Outbound call record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRequest {
    /// Namespaced method name (`user.<name>`).
    pub method: String,
    /// Call parameters.
    #[serde(default)]
    pub param: Value,
    /// Correlation id.
    pub id: String,
}

/// Inbound call result record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallResult {
    /// Correlation id of the originating call.
    pub id: String,
    /// Whether `result` (true) or `error` (false) is meaningful.
    pub success: bool,
    /// Result payload on success.
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error payload on failure.
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

/// A field that is on the wire is `Some`, even when it holds `null`.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Inbound event record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    /// Event name.
    pub event: String,
    /// Event payload (`null` when absent).
    #[serde(default)]
    pub payload: Value,
    /// Room the event is addressed to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
}

impl Message {
    /// Build a `session.new` request.
    #[must_use]
    pub fn session_new() -> Self {
        Self::Typed(TypedMessage::SessionNew)
    }

    /// Build a `session.resume` request.
    #[must_use]
    pub fn session_resume(session_id: impl Into<String>, session_secret: impl Into<String>) -> Self {
        Self::Typed(TypedMessage::SessionResume {
            session_id: session_id.into(),
            session_secret: session_secret.into(),
        })
    }

    /// Build a role declaration.
    #[must_use]
    pub fn role(role: impl Into<String>) -> Self {
        Self::Role { role: role.into() }
    }

    /// Build a call record.
    #[must_use]
    pub fn call(method: impl Into<String>, param: Value, id: impl Into<String>) -> Self {
        Self::Typed(TypedMessage::Call(CallRequest {
            method: method.into(),
            param,
            id: id.into(),
        }))
    }

    /// Build an event record.
    #[must_use]
    pub fn event(event: impl Into<String>, payload: Value, room: Option<String>) -> Self {
        Self::Typed(TypedMessage::Event(EventMessage {
            event: event.into(),
            payload,
            room,
        }))
    }

    /// Build a successful call result.
    #[must_use]
    pub fn call_ok(id: impl Into<String>, result: Value) -> Self {
        Self::Typed(TypedMessage::CallResult(CallResult {
            id: id.into(),
            success: true,
            result: Some(result),
            error: None,
        }))
    }

    /// Build a failed call result.
    #[must_use]
    pub fn call_err(id: impl Into<String>, error: Value) -> Self {
        Self::Typed(TypedMessage::CallResult(CallResult {
            id: id.into(),
            success: false,
            result: None,
            error: Some(error),
        }))
    }

    /// Short name for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Typed(TypedMessage::SessionNew) => kind::SESSION_NEW,
            Self::Typed(TypedMessage::SessionResume { .. }) => kind::SESSION_RESUME,
            Self::Typed(TypedMessage::Call(_)) => kind::CALL,
            Self::Typed(TypedMessage::CallResult(_)) => kind::CALL_RESULT,
            Self::Typed(TypedMessage::Event(_)) => kind::EVENT,
            Self::Role { .. } => "role",
            Self::ChallengeAnswer { .. } => CHALLENGE_ANSWER_KEY,
        }
    }

    /// Classify a parsed JSON record.
    ///
    /// Unknown `type` values yield [`CodecError::UnknownKind`]; a known
    /// discriminant with the wrong fields yields [`CodecError::Malformed`].
    pub fn from_value(value: Value) -> Result<Self, CodecError> {
        let Value::Object(map) = value else {
            return Err(CodecError::Malformed {
                kind: "<non-object>".to_string(),
                reason: format!("expected a JSON object, got {}", value_type(&value)),
            });
        };

        if let Some(discriminant) = map.get("type") {
            let Some(kind) = discriminant.as_str() else {
                return Err(CodecError::Malformed {
                    kind: "<invalid>".to_string(),
                    reason: "`type` is not a string".to_string(),
                });
            };
            return match kind {
                kind::SESSION_NEW
                | kind::SESSION_RESUME
                | kind::CALL
                | kind::CALL_RESULT
                | kind::EVENT => {
                    let kind = kind.to_string();
                    serde_json::from_value::<TypedMessage>(Value::Object(map))
                        .map(Self::Typed)
                        .map_err(|e| CodecError::Malformed {
                            kind,
                            reason: e.to_string(),
                        })
                }
                other => Err(CodecError::UnknownKind(other.to_string())),
            };
        }

        Self::from_untyped(map)
    }

    fn from_untyped(mut map: Map<String, Value>) -> Result<Self, CodecError> {
        if let Some(answer) = map.remove(CHALLENGE_ANSWER_KEY) {
            return Ok(Self::ChallengeAnswer { answer });
        }
        match map.remove("role") {
            Some(Value::String(role)) => Ok(Self::Role { role }),
            Some(_) => Err(CodecError::Malformed {
                kind: "role".to_string(),
                reason: "`role` is not a string".to_string(),
            }),
            None => {
                let keys: Vec<&str> = map.keys().map(String::as_str).collect();
                Err(CodecError::UnknownKind(format!("untyped record {keys:?}")))
            }
        }
    }
}

fn value_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn classify(value: Value) -> Result<Message, CodecError> {
        Message::from_value(value)
    }

    #[test]
    fn test_handshake_wire_shapes() {
        assert_eq!(
            serde_json::to_value(Message::session_new()).unwrap(),
            json!({"type": "session.new"})
        );
        assert_eq!(
            serde_json::to_value(Message::session_resume("s1", "hunter2")).unwrap(),
            json!({"type": "session.resume", "sessionId": "s1", "sessionSecret": "hunter2"})
        );
        assert_eq!(
            serde_json::to_value(Message::role("user")).unwrap(),
            json!({"role": "user"})
        );
        assert_eq!(
            serde_json::to_value(Message::ChallengeAnswer { answer: json!(8) }).unwrap(),
            json!({"rand.back": 8})
        );
    }

    #[test]
    fn test_call_wire_shape() {
        let msg = Message::call("user.join", json!({"room": "r1"}), "cb1");
        assert_eq!(
            serde_json::to_value(msg).unwrap(),
            json!({"type": "call", "method": "user.join", "param": {"room": "r1"}, "id": "cb1"})
        );
    }

    #[test]
    fn test_classify_event_with_room() {
        let msg = classify(json!({"type": "event", "event": "x", "payload": 1, "room": "r1"})).unwrap();
        assert_eq!(msg, Message::event("x", json!(1), Some("r1".into())));
    }

    #[test]
    fn test_classify_event_without_payload() {
        let msg = classify(json!({"type": "event", "event": "tick"})).unwrap();
        assert_eq!(msg, Message::event("tick", Value::Null, None));
    }

    #[test]
    fn test_classify_call_result_failure() {
        let msg = classify(json!({"type": "call.result", "id": "cb9", "success": false, "error": "denied"})).unwrap();
        assert_eq!(msg, Message::call_err("cb9", json!("denied")));
    }

    #[test]
    fn test_classify_call_result_null_vs_absent() {
        let explicit = classify(json!({"type": "call.result", "id": "cb1", "success": true, "result": null})).unwrap();
        assert_eq!(explicit, Message::call_ok("cb1", Value::Null));

        let Message::Typed(TypedMessage::CallResult(absent)) =
            classify(json!({"type": "call.result", "id": "cb2", "success": true})).unwrap()
        else {
            panic!("expected call result");
        };
        assert_eq!(absent.result, None);
        assert_eq!(absent.error, None);
    }

    #[test]
    fn test_classify_unknown_type_is_not_malformed() {
        let err = classify(json!({"type": "presence", "who": "bob"})).unwrap_err();
        assert!(matches!(err, CodecError::UnknownKind(ref k) if k == "presence"));
    }

    #[test]
    fn test_classify_known_type_missing_fields_is_malformed() {
        let err = classify(json!({"type": "call.result", "success": true})).unwrap_err();
        assert!(matches!(err, CodecError::Malformed { ref kind, .. } if kind == "call.result"));
    }

    #[test]
    fn test_classify_untyped_records() {
        assert_eq!(classify(json!({"role": "user"})).unwrap(), Message::role("user"));
        assert_eq!(
            classify(json!({"rand.back": 3})).unwrap(),
            Message::ChallengeAnswer { answer: json!(3) }
        );
        assert!(matches!(
            classify(json!({"hello": "world"})).unwrap_err(),
            CodecError::UnknownKind(_)
        ));
    }

    #[test]
    fn test_classify_non_object_is_malformed() {
        assert!(matches!(
            classify(json!([1, 2, 3])).unwrap_err(),
            CodecError::Malformed { .. }
        ));
    }
}
