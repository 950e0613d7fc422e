//! Transport codec: logical [`Message`] <-> transmittable [`Frame`].
//!
//! # Pipeline
//!
//! ```text
//! encode:  Message ──json──► bytes ──gzip──► bytes ──xor(key)──► Frame::Binary
//! decode:  Frame   ──xor(key)──► bytes ──gunzip──► bytes ──json──► Message
//! ```
//!
//! With `encrypt = false` the codec is plain: the JSON text is sent as
//! [`Frame::Text`] and neither compression nor the cipher is applied.
//!
//! Encoding and decoding are pure; `decode(encode(m)) == m` for every
//! message `m`.

pub mod cipher;
pub mod compression;

use std::sync::Arc;

use crate::config::SessionConfig;
use crate::error::{CodecError, SessionError};
use crate::protocol::Message;
use crate::transport::Frame;

pub use cipher::XorCipher;
pub use compression::{Compressor, Gzip};

/// Obfuscation layer applied after serialization.
#[derive(Debug, Clone)]
enum Layer {
    /// JSON text frames.
    Plain,
    /// Compressed then XOR-ed binary frames.
    Obfuscated {
        compressor: Arc<dyn Compressor>,
        cipher: XorCipher,
    },
}

/// Symmetric frame codec.
#[derive(Debug, Clone)]
pub struct Codec {
    layer: Layer,
}

impl Codec {
    /// Codec that gzips and XORs with `key`.
    pub fn obfuscated(key: &str) -> Result<Self, SessionError> {
        Self::with_compressor(key, Arc::new(Gzip::default()))
    }

    /// Codec using a caller-supplied compressor.
    pub fn with_compressor(key: &str, compressor: Arc<dyn Compressor>) -> Result<Self, SessionError> {
        Ok(Self {
            layer: Layer::Obfuscated {
                compressor,
                cipher: XorCipher::new(key)?,
            },
        })
    }

    /// Codec that sends JSON text frames untouched.
    #[must_use]
    pub fn plain() -> Self {
        Self { layer: Layer::Plain }
    }

    /// Build the codec a session configuration asks for.
    pub fn from_config(config: &SessionConfig) -> Result<Self, SessionError> {
        if config.encrypt {
            Self::with_compressor(
                &config.cipher_key,
                Arc::new(Gzip::new(config.compression_level).with_limit(config.max_frame_bytes)),
            )
        } else {
            Ok(Self::plain())
        }
    }

    /// Whether frames are compressed and XOR-ed.
    #[must_use]
    pub fn is_obfuscated(&self) -> bool {
        matches!(self.layer, Layer::Obfuscated { .. })
    }

    /// Encode a message into a frame.
    pub fn encode(&self, message: &Message) -> Result<Frame, CodecError> {
        match &self.layer {
            Layer::Plain => serde_json::to_string(message)
                .map(Frame::Text)
                .map_err(CodecError::Serialize),
            Layer::Obfuscated { compressor, cipher } => {
                let json = serde_json::to_vec(message).map_err(CodecError::Serialize)?;
                let mut bytes = compressor.compress(&json)?;
                cipher.apply(&mut bytes);
                Ok(Frame::Binary(bytes))
            }
        }
    }

    /// Decode a frame into a message.
    ///
    /// Text and binary frames are both accepted; which pipeline runs is
    /// decided by the codec, not by the frame kind.
    pub fn decode(&self, frame: Frame) -> Result<Message, CodecError> {
        let json = match &self.layer {
            Layer::Plain => frame.into_bytes(),
            Layer::Obfuscated { compressor, cipher } => {
                let mut bytes = frame.into_bytes();
                cipher.apply(&mut bytes);
                compressor.decompress(&bytes)?
            }
        };
        let value: serde_json::Value =
            serde_json::from_slice(&json).map_err(CodecError::Deserialize)?;
        Message::from_value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn samples() -> Vec<Message> {
        vec![
            Message::session_new(),
            Message::session_resume("sid", "secret"),
            Message::role("user"),
            Message::ChallengeAnswer { answer: json!(1_000_001) },
            Message::call("user.ping", json!({}), "cb17000000001"),
            Message::call_ok("cb1", json!("pong")),
            Message::call_err("cb2", json!({"reason": "nope"})),
            Message::call_ok("cb3", serde_json::Value::Null),
            Message::call_err("cb4", serde_json::Value::Null),
            Message::event("chat", json!({"text": "héllo"}), Some("lobby".into())),
            Message::event("tick", serde_json::Value::Null, None),
        ]
    }

    #[test]
    fn test_obfuscated_roundtrip() {
        let codec = Codec::obfuscated("pan-light").unwrap();
        for msg in samples() {
            let frame = codec.encode(&msg).unwrap();
            assert!(matches!(frame, Frame::Binary(_)));
            assert_eq!(codec.decode(frame).unwrap(), msg);
        }
    }

    #[test]
    fn test_plain_roundtrip() {
        let codec = Codec::plain();
        for msg in samples() {
            let frame = codec.encode(&msg).unwrap();
            assert!(matches!(frame, Frame::Text(_)));
            assert_eq!(codec.decode(frame).unwrap(), msg);
        }
    }

    #[test]
    fn test_obfuscated_frame_is_xored_gzip() {
        let codec = Codec::obfuscated("pan-light").unwrap();
        let Frame::Binary(mut bytes) = codec.encode(&Message::session_new()).unwrap() else {
            panic!("expected binary frame");
        };
        XorCipher::new("pan-light").unwrap().apply(&mut bytes);
        let json = Gzip::default().decompress(&bytes).unwrap();
        assert_eq!(json, br#"{"type":"session.new"}"#);
    }

    #[test]
    fn test_wrong_key_fails_decompression() {
        let sender = Codec::obfuscated("pan-light").unwrap();
        let receiver = Codec::obfuscated("other-key").unwrap();
        let frame = sender.encode(&Message::role("user")).unwrap();
        assert!(matches!(
            receiver.decode(frame).unwrap_err(),
            CodecError::Decompress(_)
        ));
    }

    #[test]
    fn test_oversized_frame_rejected_by_configured_limit() {
        let mut config = SessionConfig::new("ws://x");
        config.max_frame_bytes = 1024;
        let codec = Codec::from_config(&config).unwrap();

        let big = Message::event("flood", json!("a".repeat(8 * 1024)), None);
        let frame = Codec::obfuscated("pan-light").unwrap().encode(&big).unwrap();
        let err = codec.decode(frame).unwrap_err();
        assert!(matches!(err, CodecError::Decompress(_)));
        assert!(err.is_fatal());

        let small = Message::event("tick", json!(1), None);
        assert_eq!(codec.decode(codec.encode(&small).unwrap()).unwrap(), small);
    }

    #[test]
    fn test_plain_garbage_fails_deserialization() {
        let err = Codec::plain()
            .decode(Frame::Text("not json".into()))
            .unwrap_err();
        assert!(matches!(err, CodecError::Deserialize(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_unknown_kind_surfaces_through_decode() {
        let codec = Codec::plain();
        let err = codec
            .decode(Frame::Text(r#"{"type":"presence"}"#.into()))
            .unwrap_err();
        assert!(!err.is_fatal());
    }
}
