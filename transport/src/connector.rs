//! Opening physical connections.
//!
//! The [`Connector`] trait hides how a connection to the backend is made.
//! [`WebSocketConnector`] dials a WebSocket endpoint with `tokio-tungstenite`
//! and exchanges JSON text frames; tests plug in an in-memory connector.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use futures::{Sink, SinkExt, Stream, StreamExt, future};
use tokio_tungstenite::tungstenite::Message;

use crate::error::TransportError;
use crate::frame::Frame;

/// Outbound half of a connection.
pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = TransportError> + Send>>;

/// Inbound half of a connection.
///
/// Yields `Err(TransportError::Codec(_))` for single malformed frames (the
/// connection stays usable) and ends, or yields another error, when the
/// connection is gone.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, TransportError>> + Send>>;

/// A freshly opened connection.
pub struct Connection {
    /// Outbound frames
    pub sink: FrameSink,
    /// Inbound frames
    pub stream: FrameStream,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}

/// Opens connections to one backend endpoint.
///
/// Dyn-compatible so the channel can hold an `Arc<dyn Connector>`.
pub trait Connector: Send + Sync {
    /// Endpoint description for logs.
    fn endpoint(&self) -> &str;

    /// Open a new connection.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ConnectFailed`] if the endpoint can not be
    /// reached.
    fn connect(&self) -> Pin<Box<dyn Future<Output = Result<Connection, TransportError>> + Send + '_>>;
}

/// WebSocket connector built on `tokio-tungstenite`.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
    connect_timeout: Duration,
}

impl WebSocketConnector {
    /// Create a connector for `url` (`ws://` or `wss://`).
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Set the handshake timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    fn connect_failed(&self, reason: impl Into<String>) -> TransportError {
        TransportError::ConnectFailed {
            endpoint: self.url.clone(),
            reason: reason.into(),
        }
    }
}

impl Connector for WebSocketConnector {
    fn endpoint(&self) -> &str {
        &self.url
    }

    fn connect(&self) -> Pin<Box<dyn Future<Output = Result<Connection, TransportError>> + Send + '_>> {
        Box::pin(async move {
            let (ws_stream, response) = tokio::time::timeout(
                self.connect_timeout,
                tokio_tungstenite::connect_async(self.url.as_str()),
            )
            .await
            .map_err(|_| self.connect_failed("handshake timed out"))?
            .map_err(|e| self.connect_failed(e.to_string()))?;

            tracing::debug!(
                url = %self.url,
                status = %response.status(),
                "WebSocket handshake completed"
            );

            let (write, read) = ws_stream.split();

            let sink = write
                .sink_map_err(TransportError::from)
                .with(|frame: Frame| future::ready(frame.encode().map(Message::Text)));

            let stream = read.filter_map(|message| future::ready(decode_message(message)));

            Ok(Connection {
                sink: Box::pin(sink),
                stream: Box::pin(stream),
            })
        })
    }
}

/// Map one WebSocket message to an inbound frame.
///
/// Control frames are answered by tungstenite itself and are skipped here.
fn decode_message(
    message: Result<Message, tokio_tungstenite::tungstenite::Error>,
) -> Option<Result<Frame, TransportError>> {
    match message {
        Ok(Message::Text(text)) => Some(Frame::decode(&text)),
        Ok(Message::Binary(bytes)) => Some(
            std::str::from_utf8(&bytes)
                .map_err(|e| TransportError::Codec(e.to_string()))
                .and_then(Frame::decode),
        ),
        Ok(Message::Close(_)) => Some(Err(TransportError::Closed)),
        Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => None,
        Err(e) => Some(Err(TransportError::from(e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_messages_decode_to_frames() {
        let decoded = decode_message(Ok(Message::Text(r#"{"type":"logOut"}"#.to_string())));
        let frame = decoded.unwrap().unwrap();
        assert_eq!(frame.message_type, "logOut");
    }

    #[test]
    fn binary_messages_decode_as_utf8_json() {
        let decoded = decode_message(Ok(Message::Binary(br#"{"type":"getUsers"}"#.to_vec())));
        assert_eq!(decoded.unwrap().unwrap().message_type, "getUsers");
    }

    #[test]
    fn control_frames_are_skipped() {
        assert!(decode_message(Ok(Message::Ping(vec![1]))).is_none());
        assert!(decode_message(Ok(Message::Pong(vec![]))).is_none());
    }

    #[test]
    fn close_ends_the_connection() {
        let decoded = decode_message(Ok(Message::Close(None)));
        assert_eq!(decoded, Some(Err(TransportError::Closed)));
    }

    #[tokio::test]
    async fn unreachable_endpoint_fails_to_connect() {
        let connector = WebSocketConnector::new("ws://127.0.0.1:1/socket")
            .with_connect_timeout(Duration::from_millis(500));

        let err = connector.connect().await.unwrap_err();

        assert!(matches!(err, TransportError::ConnectFailed { .. }));
        assert_eq!(connector.endpoint(), "ws://127.0.0.1:1/socket");
    }
}
