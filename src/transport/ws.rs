//! WebSocket transport.
//!
//! Thin wrapper around `tokio-tungstenite` implementing [`Connector`] and
//! [`Transport`]. Control frames never reach the connection manager:
//! tungstenite queues the pong for every ping it reads, and a close frame
//! becomes [`TransportEvent::Closed`].

// Rust guideline compliant 2026-02

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite;

use super::{Connector, Frame, Transport, TransportEvent};
use crate::config::SessionConfig;
use crate::error::TransportError;

/// Concrete WebSocket stream type (avoids repeating the 6-line generic everywhere).
type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Opens WebSocket transports, optionally with extra request headers.
#[derive(Debug, Clone, Default)]
pub struct WsConnector {
    headers: Vec<(String, String)>,
}

impl WsConnector {
    /// Create a connector with no extra headers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header sent with every handshake request.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Connector carrying the headers from `config`.
    #[must_use]
    pub fn from_config(config: &SessionConfig) -> Self {
        config
            .headers
            .iter()
            .fold(Self::new(), |connector, (name, value)| connector.header(name, value))
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self, url: &str) -> Result<Box<dyn Transport>, TransportError> {
        use tungstenite::client::IntoClientRequest;

        let ws_url = http_to_ws_scheme(url);
        let mut request = ws_url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::Open(format!("invalid WebSocket URL {ws_url}: {e}")))?;

        for (name, value) in &self.headers {
            let header_name = tungstenite::http::HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::Open(format!("invalid header name {name}: {e}")))?;
            let header_value = tungstenite::http::HeaderValue::from_str(value)
                .map_err(|e| TransportError::Open(format!("invalid header value for {name}: {e}")))?;
            request.headers_mut().insert(header_name, header_value);
        }

        let (stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| TransportError::Open(format!("WebSocket connect failed: {e}")))?;

        log::debug!("[Realtime] WebSocket open: {}", ws_url);
        Ok(Box::new(WsTransport {
            stream,
            closed: false,
        }))
    }
}

/// An open WebSocket connection.
struct WsTransport {
    stream: WsStream,
    closed: bool,
}

impl std::fmt::Debug for WsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsTransport")
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let message = match frame {
            Frame::Binary(bytes) => tungstenite::Message::Binary(bytes.into()),
            Frame::Text(text) => tungstenite::Message::Text(text.into()),
        };
        self.stream
            .send(message)
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn next_event(&mut self) -> TransportEvent {
        loop {
            let event = match self.stream.next().await {
                Some(Ok(message)) => inbound(message),
                Some(Err(e)) => Some(TransportEvent::Error(format!("WebSocket read error: {e}"))),
                None => Some(TransportEvent::Closed("stream ended".to_string())),
            };
            let Some(event) = event else { continue };
            if !matches!(event, TransportEvent::Message(_)) {
                self.closed = true;
            }
            return event;
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.stream.close(None).await {
            log::debug!("[Realtime] WebSocket close failed: {}", e);
        }
    }
}

/// Map one received WebSocket message to a transport event.
///
/// Control frames yield `None`; tungstenite has already queued the pong
/// for a ping and flushes it with the next read or write.
fn inbound(message: tungstenite::Message) -> Option<TransportEvent> {
    match message {
        tungstenite::Message::Binary(data) => Some(TransportEvent::Message(Frame::Binary(data.to_vec()))),
        tungstenite::Message::Text(text) => Some(TransportEvent::Message(Frame::Text(text.to_string()))),
        tungstenite::Message::Ping(_)
        | tungstenite::Message::Pong(_)
        | tungstenite::Message::Frame(_) => None,
        tungstenite::Message::Close(close_frame) => {
            let (code, reason) = close_frame
                .map(|cf| (u16::from(cf.code), cf.reason.to_string()))
                .unwrap_or((1005, String::new()));
            Some(TransportEvent::Closed(format!("code {code}: {reason}")))
        }
    }
}

/// Convert an HTTP(S) URL to WS(S) scheme.
///
/// Passes `ws://` and `wss://` through unchanged.
#[must_use]
pub fn http_to_ws_scheme(url: &str) -> String {
    if url.starts_with("wss://") || url.starts_with("ws://") {
        url.to_string()
    } else {
        url.replace("https://", "wss://")
            .replace("http://", "ws://")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_to_ws_scheme_https() {
        assert_eq!(
            http_to_ws_scheme("https://example.com/realtime"),
            "wss://example.com/realtime"
        );
    }

    #[test]
    fn test_http_to_ws_scheme_http() {
        assert_eq!(
            http_to_ws_scheme("http://localhost:8080/ws"),
            "ws://localhost:8080/ws"
        );
    }

    #[test]
    fn test_http_to_ws_scheme_passthrough() {
        assert_eq!(http_to_ws_scheme("wss://example.com"), "wss://example.com");
        assert_eq!(http_to_ws_scheme("ws://example.com"), "ws://example.com");
    }

    #[test]
    fn test_control_frames_produce_no_event() {
        assert!(inbound(tungstenite::Message::Ping(vec![1, 2, 3].into())).is_none());
        assert!(inbound(tungstenite::Message::Pong(Vec::new().into())).is_none());
    }

    #[test]
    fn test_inbound_data_and_close() {
        assert!(matches!(
            inbound(tungstenite::Message::Binary(vec![9].into())),
            Some(TransportEvent::Message(Frame::Binary(ref b))) if b == &[9]
        ));
        assert!(matches!(
            inbound(tungstenite::Message::Text("hi".into())),
            Some(TransportEvent::Message(Frame::Text(ref t))) if t == "hi"
        ));
        assert!(matches!(
            inbound(tungstenite::Message::Close(None)),
            Some(TransportEvent::Closed(ref reason)) if reason == "code 1005: "
        ));
    }

    #[test]
    fn test_connector_from_config_headers() {
        let mut config = SessionConfig::new("wss://example.com/rt");
        config.headers.insert("Authorization".into(), "Bearer t0k".into());
        config.headers.insert("X-Client".into(), "realtime".into());

        let connector = WsConnector::from_config(&config);
        assert_eq!(
            connector.headers,
            vec![
                ("Authorization".to_string(), "Bearer t0k".to_string()),
                ("X-Client".to_string(), "realtime".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_config_header_reaches_handshake_request() {
        let mut config = SessionConfig::new("ws://127.0.0.1:1");
        config.headers.insert("bad header".into(), "x".into());
        let err = WsConnector::from_config(&config)
            .open(&config.url)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Open(ref msg) if msg.contains("header")));
    }

    #[tokio::test]
    async fn test_open_invalid_url_fails() {
        let err = WsConnector::new().open("not a url").await.unwrap_err();
        assert!(matches!(err, TransportError::Open(_)));
    }

    #[tokio::test]
    async fn test_open_invalid_header_fails() {
        let connector = WsConnector::new().header("bad header", "x");
        let err = connector.open("ws://127.0.0.1:1").await.unwrap_err();
        assert!(matches!(err, TransportError::Open(ref msg) if msg.contains("header")));
    }
}
