//! In-memory connector with a scripted server side.
//!
//! [`MemoryConnector`] plugs into a `TransportChannel` like the WebSocket
//! connector does. Its [`FakeBackend`] handle plays the server: it reads the
//! frames the client sends, replies to requests, pushes uncorrelated frames,
//! drops the connection and refuses connects.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use caption_client_transport::{Connection, Connector, Frame, MessageType, TransportError};
use futures::channel::mpsc;
use futures::{FutureExt, SinkExt, StreamExt};
use serde_json::Value;
use tokio::task::JoinHandle;

const ENDPOINT: &str = "memory://backend";

/// How long `expect_request` waits before failing the test.
const EXPECT_TIMEOUT: Duration = Duration::from_secs(5);

type ServerSide = mpsc::UnboundedSender<Result<Frame, TransportError>>;

struct Shared {
    /// Sender half of the live connection's inbound stream
    current: Mutex<Option<ServerSide>>,
    /// Every connection writes into this one queue
    outbound_tx: mpsc::UnboundedSender<Frame>,
    outbound_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Frame>>,
    refuse_connects: AtomicUsize,
    connections: AtomicUsize,
}

/// Connector that opens in-memory connections to a [`FakeBackend`].
#[derive(Clone)]
pub struct MemoryConnector {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for MemoryConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryConnector")
            .field("connections", &self.shared.connections.load(Ordering::SeqCst))
            .finish()
    }
}

impl MemoryConnector {
    /// A connector and the backend it connects to.
    #[must_use]
    pub fn pair() -> (Self, FakeBackend) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded();
        let shared = Arc::new(Shared {
            current: Mutex::new(None),
            outbound_tx,
            outbound_rx: tokio::sync::Mutex::new(outbound_rx),
            refuse_connects: AtomicUsize::new(0),
            connections: AtomicUsize::new(0),
        });
        (
            Self {
                shared: Arc::clone(&shared),
            },
            FakeBackend { shared },
        )
    }
}

impl Connector for MemoryConnector {
    fn endpoint(&self) -> &str {
        ENDPOINT
    }

    fn connect(&self) -> Pin<Box<dyn Future<Output = Result<Connection, TransportError>> + Send + '_>> {
        Box::pin(async move {
            let refused = self
                .shared
                .refuse_connects
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if refused {
                return Err(TransportError::ConnectFailed {
                    endpoint: ENDPOINT.to_string(),
                    reason: "connection refused".to_string(),
                });
            }

            let (inbound_tx, inbound_rx) = mpsc::unbounded();
            *self
                .shared
                .current
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(inbound_tx);
            self.shared.connections.fetch_add(1, Ordering::SeqCst);

            let sink = self
                .shared
                .outbound_tx
                .clone()
                .sink_map_err(|_| TransportError::Connection("backend gone".to_string()));

            Ok(Connection {
                sink: Box::pin(sink),
                stream: Box::pin(inbound_rx),
            })
        })
    }
}

/// Server side of a [`MemoryConnector`].
#[derive(Clone)]
pub struct FakeBackend {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for FakeBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeBackend")
            .field("connected", &self.is_connected())
            .field("connections", &self.connection_count())
            .finish()
    }
}

impl FakeBackend {
    /// Number of connections accepted so far.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.shared.connections.load(Ordering::SeqCst)
    }

    /// Whether a client connection is currently open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.shared
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Refuse the next `count` connection attempts.
    pub fn refuse_connects(&self, count: usize) {
        self.shared.refuse_connects.store(count, Ordering::SeqCst);
    }

    /// Close the live connection from the server side.
    pub fn drop_connection(&self) {
        let current = self
            .shared
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(current);
    }

    /// Next frame sent by the client, in send order.
    pub async fn next_frame(&self) -> Option<Frame> {
        self.shared.outbound_rx.lock().await.next().await
    }

    /// Take an already sent frame without waiting.
    pub fn try_next_frame(&self) -> Option<Frame> {
        self.shared
            .outbound_rx
            .try_lock()
            .ok()
            .and_then(|mut rx| rx.next().now_or_never().flatten())
    }

    /// Wait for the next client frame and check its type.
    ///
    /// # Panics
    ///
    /// Panics if no frame arrives in time or the type differs.
    #[allow(clippy::panic)] // Test helper
    pub async fn expect_request(&self, message_type: MessageType) -> Frame {
        let frame = tokio::time::timeout(EXPECT_TIMEOUT, self.next_frame())
            .await
            .unwrap_or_else(|_| panic!("no `{message_type}` request within {EXPECT_TIMEOUT:?}"))
            .unwrap_or_else(|| panic!("client gone while waiting for `{message_type}`"));
        assert_eq!(
            frame.known_type(),
            Some(message_type),
            "unexpected request: {frame:?}"
        );
        frame
    }

    /// Deliver a frame to the client. Returns whether a connection took it.
    pub fn push(&self, frame: Frame) -> bool {
        self.shared
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|tx| tx.unbounded_send(Ok(frame)).is_ok())
    }

    /// Deliver a frame that fails to decode.
    pub fn push_malformed(&self, reason: &str) -> bool {
        self.shared
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|tx| {
                tx.unbounded_send(Err(TransportError::Codec(reason.to_string())))
                    .is_ok()
            })
    }

    /// Answer `request` with `code` and `data`.
    ///
    /// # Panics
    ///
    /// Panics if `request` carries no correlation id.
    #[allow(clippy::expect_used)] // Test helper
    pub fn reply(&self, request: &Frame, code: u16, data: Value) -> bool {
        let correlation_id = request
            .correlation_id
            .expect("requests always carry a correlation id");
        self.push(Frame::response(
            request.message_type.clone(),
            correlation_id,
            code,
            data,
        ))
    }

    /// Answer `request` with a failure status and an error message.
    ///
    /// # Panics
    ///
    /// Panics if `request` carries no correlation id.
    #[allow(clippy::expect_used)] // Test helper
    pub fn reply_error(&self, request: &Frame, code: u16, error: &str) -> bool {
        let correlation_id = request
            .correlation_id
            .expect("requests always carry a correlation id");
        self.push(
            Frame::response(
                request.message_type.clone(),
                correlation_id,
                code,
                serde_json::json!({ "error": error }),
            )
            .with_error(error),
        )
    }

    /// Answer every client frame with `script` until the client goes away.
    ///
    /// `script` returns the reply frame, or `None` to leave a request
    /// unanswered.
    pub fn serve<F>(&self, script: F) -> JoinHandle<()>
    where
        F: Fn(&Frame) -> Option<Frame> + Send + 'static,
    {
        let backend = self.clone();
        tokio::spawn(async move {
            while let Some(frame) = backend.next_frame().await {
                if let Some(reply) = script(&frame) {
                    backend.push(reply);
                }
            }
        })
    }
}

/// Build the reply frame for `request` (helper for [`FakeBackend::serve`]).
///
/// Returns `None` if `request` has no correlation id.
#[must_use]
pub fn reply_to(request: &Frame, code: u16, data: Value) -> Option<Frame> {
    request
        .correlation_id
        .map(|id| Frame::response(request.message_type.clone(), id, code, data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use caption_client_transport::CorrelationId;

    #[tokio::test]
    async fn test_connect_counts_and_refusals() {
        let (connector, backend) = MemoryConnector::pair();
        backend.refuse_connects(1);

        assert!(matches!(
            connector.connect().await,
            Err(TransportError::ConnectFailed { .. })
        ));
        assert!(connector.connect().await.is_ok());
        assert_eq!(backend.connection_count(), 1);
        assert!(backend.is_connected());
    }

    #[tokio::test]
    async fn test_frames_flow_both_ways() {
        let (connector, backend) = MemoryConnector::pair();
        let Connection { mut sink, mut stream } = connector.connect().await.unwrap();

        let id = CorrelationId::new();
        sink.send(Frame::request(MessageType::GetBookings, id, Value::Null))
            .await
            .unwrap();
        let request = backend.expect_request(MessageType::GetBookings).await;
        assert!(backend.reply(&request, 200, serde_json::json!({"bookings": []})));

        let response = stream.next().await.unwrap().unwrap();
        assert_eq!(response.correlation_id, Some(id));
        assert_eq!(response.status_code(), 200);
    }

    #[tokio::test]
    async fn test_drop_connection_ends_client_stream() {
        let (connector, backend) = MemoryConnector::pair();
        let mut connection = connector.connect().await.unwrap();

        backend.drop_connection();

        assert!(connection.stream.next().await.is_none());
        assert!(!backend.push(Frame::push("sessionUpdated", Value::Null)));
    }
}
