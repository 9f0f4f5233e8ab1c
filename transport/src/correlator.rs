//! Request/response correlation over the transport channel.
//!
//! # Architecture
//!
//! ```text
//! request(type, payload)
//!   ├─ register PendingRequest { id, type, created_at, responder }
//!   ├─ channel.send(frame with correlationId = id)
//!   └─ await responder (bounded by request_timeout)
//!
//! dispatcher task (one per correlator)
//!   inbound frame ─► pending.remove(correlationId) ─► responder.send(frame)
//! ```
//!
//! # Key Design Points
//!
//! - **At-most-once settlement**: the pending entry is removed before the
//!   responder fires, and timeouts evict the entry they own
//! - **Order independent**: responses are matched by correlation id, not FIFO
//! - **Business failures are values**: non-2xx codes resolve `Ok(Response)`
//!   and the caller branches on [`Response::outcome`]
//! - **Unmatched frames are ignored**: server pushes stay on the raw channel

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use caption_client_core::environment::{Clock, SystemClock};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::channel::{InboundFrames, TransportChannel};
use crate::error::{BusinessError, RequestError};
use crate::frame::{CorrelationId, Frame, MessageType};

/// Correlator configuration.
#[derive(Debug, Clone)]
pub struct CorrelatorConfig {
    /// Deadline for each request
    pub request_timeout: Duration,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl CorrelatorConfig {
    /// Set the request deadline.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// A settled request: the matched response frame, typed.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Request type this response answers
    pub message_type: MessageType,
    /// Echoed correlation id
    pub correlation_id: CorrelationId,
    /// Status code (200 when the backend omitted it)
    pub code: u16,
    /// Payload
    pub data: Value,
    /// Server-supplied error message
    pub error: Option<String>,
}

/// Result of a request from the caller's point of view.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// 2xx response with its payload
    Success(Value),
    /// Non-2xx response
    Failure(BusinessError),
}

impl Response {
    fn from_frame(message_type: MessageType, correlation_id: CorrelationId, frame: Frame) -> Self {
        Self {
            message_type,
            correlation_id,
            code: frame.status_code(),
            data: frame.data,
            error: frame.error,
        }
    }

    /// Whether the status code is 2xx.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code >= 200 && self.code < 300
    }

    /// The server's error message for a failed response.
    ///
    /// Prefers the frame's `error` field, then `data.error` and
    /// `data.message`, and finally a generic message naming the code.
    #[must_use]
    pub fn error_message(&self) -> String {
        self.error
            .clone()
            .or_else(|| string_field(&self.data, "error"))
            .or_else(|| string_field(&self.data, "message"))
            .unwrap_or_else(|| format!("Request failed with status {}", self.code))
    }

    /// Split into success payload or business error.
    #[must_use]
    pub fn outcome(self) -> Outcome {
        if self.is_success() {
            Outcome::Success(self.data)
        } else {
            Outcome::Failure(BusinessError {
                code: self.code,
                message: self.error_message(),
            })
        }
    }

    /// Like [`outcome`](Self::outcome), as a `Result`.
    ///
    /// # Errors
    ///
    /// Returns the [`BusinessError`] for non-2xx codes.
    pub fn into_result(self) -> Result<Value, BusinessError> {
        match self.outcome() {
            Outcome::Success(data) => Ok(data),
            Outcome::Failure(error) => Err(error),
        }
    }
}

fn string_field(data: &Value, key: &str) -> Option<String> {
    data.get(key).and_then(Value::as_str).map(str::to_string)
}

/// One in-flight request.
struct PendingRequest {
    message_type: MessageType,
    created_at: DateTime<Utc>,
    responder: oneshot::Sender<Frame>,
}

/// Read-only view of a pending request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingInfo {
    /// Correlation id of the request
    pub correlation_id: CorrelationId,
    /// Request type
    pub message_type: MessageType,
    /// When the request was registered
    pub created_at: DateTime<Utc>,
}

type PendingMap = Arc<Mutex<HashMap<CorrelationId, PendingRequest>>>;

/// Removes the pending entry when the awaiting future finishes or is dropped.
struct Eviction {
    pending: PendingMap,
    correlation_id: CorrelationId,
}

impl Drop for Eviction {
    fn drop(&mut self) {
        let removed = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.correlation_id);
        if removed.is_some() {
            record_pending(&self.pending);
        }
    }
}

fn record_pending(pending: &PendingMap) {
    let len = pending.lock().unwrap_or_else(PoisonError::into_inner).len();
    #[allow(clippy::cast_precision_loss)]
    metrics::gauge!("correlator.pending").set(len as f64);
}

/// Turns the raw inbound frame stream into one-shot request/response pairs.
///
/// Owns the pending request set. One background dispatcher task per
/// correlator consumes inbound frames and settles matching requests.
pub struct Correlator {
    channel: TransportChannel,
    pending: PendingMap,
    config: CorrelatorConfig,
    clock: Arc<dyn Clock>,
    dispatcher: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for Correlator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Correlator")
            .field("config", &self.config)
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}

impl Correlator {
    /// Create a correlator with the system clock and start its dispatcher.
    ///
    /// Must be called inside a Tokio runtime.
    #[must_use]
    pub fn new(channel: TransportChannel, config: CorrelatorConfig) -> Self {
        Self::with_clock(channel, config, Arc::new(SystemClock))
    }

    /// Create a correlator with an injected clock.
    #[must_use]
    pub fn with_clock(
        channel: TransportChannel,
        config: CorrelatorConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));

        // Subscribe before spawning so no response can slip past.
        let frames = channel.subscribe();
        let dispatcher = tokio::spawn(Self::dispatch_loop(frames, Arc::clone(&pending)));

        Self {
            channel,
            pending,
            config,
            clock,
            dispatcher: Some(dispatcher),
        }
    }

    async fn dispatch_loop(mut frames: InboundFrames, pending: PendingMap) {
        tracing::debug!("Correlator dispatcher started");

        while let Some(frame) = frames.next().await {
            Self::settle(&pending, frame);
        }

        tracing::debug!("Correlator dispatcher stopped");
    }

    fn settle(pending: &PendingMap, frame: Frame) {
        let Some(correlation_id) = frame.correlation_id else {
            tracing::trace!(message_type = %frame.message_type, "Ignoring uncorrelated frame");
            return;
        };

        let entry = pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&correlation_id);

        match entry {
            Some(request) => {
                record_pending(pending);
                tracing::debug!(
                    correlation_id = %correlation_id,
                    message_type = %request.message_type,
                    code = frame.status_code(),
                    "Response matched"
                );
                // The requester may have given up already; nothing to do then.
                let _ = request.responder.send(frame);
            },
            None => {
                metrics::counter!("correlator.response.unmatched").increment(1);
                tracing::trace!(
                    correlation_id = %correlation_id,
                    message_type = %frame.message_type,
                    "Ignoring frame without pending request"
                );
            },
        }
    }

    /// Issue a request and wait for its correlated response.
    ///
    /// # Errors
    ///
    /// - [`RequestError::Transport`] if the frame could not be sent
    /// - [`RequestError::Timeout`] if no response arrived within the deadline
    /// - [`RequestError::Shutdown`] if the correlator shut down meanwhile
    ///
    /// A response with a non-2xx code is `Ok`; inspect it with
    /// [`Response::outcome`].
    #[tracing::instrument(skip(self, message_type, payload), fields(message_type = %message_type))]
    pub async fn request(
        &self,
        message_type: MessageType,
        payload: Value,
    ) -> Result<Response, RequestError> {
        let correlation_id = CorrelationId::new();
        let (responder, receiver) = oneshot::channel();

        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                correlation_id,
                PendingRequest {
                    message_type,
                    created_at: self.clock.now(),
                    responder,
                },
            );
        record_pending(&self.pending);
        let _eviction = Eviction {
            pending: Arc::clone(&self.pending),
            correlation_id,
        };

        metrics::counter!("correlator.request.total", "type" => message_type.as_str())
            .increment(1);
        let started = Instant::now();

        if let Err(error) = self
            .channel
            .send(Frame::request(message_type, correlation_id, payload))
        {
            metrics::counter!("correlator.request.transport_error").increment(1);
            tracing::warn!(correlation_id = %correlation_id, error = %error, "Request not sent");
            return Err(RequestError::Transport(error));
        }

        match tokio::time::timeout(self.config.request_timeout, receiver).await {
            Ok(Ok(frame)) => {
                metrics::histogram!("correlator.request.duration_seconds")
                    .record(started.elapsed().as_secs_f64());
                Ok(Response::from_frame(message_type, correlation_id, frame))
            },
            Ok(Err(_)) => Err(RequestError::Shutdown),
            Err(_) => {
                metrics::counter!("correlator.request.timeout").increment(1);
                tracing::warn!(
                    correlation_id = %correlation_id,
                    timeout_ms = self.config.request_timeout.as_millis(),
                    "Request timed out"
                );
                Err(RequestError::Timeout {
                    message_type: message_type.as_str().to_string(),
                    timeout_ms: u64::try_from(self.config.request_timeout.as_millis())
                        .unwrap_or(u64::MAX),
                })
            },
        }
    }

    /// Number of in-flight requests.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Snapshot of in-flight requests, oldest first.
    #[must_use]
    pub fn pending(&self) -> Vec<PendingInfo> {
        let mut infos: Vec<PendingInfo> = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, request)| PendingInfo {
                correlation_id: *id,
                message_type: request.message_type,
                created_at: request.created_at,
            })
            .collect();
        infos.sort_by_key(|info| info.created_at);
        infos
    }

    /// The channel requests are sent on.
    #[must_use]
    pub const fn channel(&self) -> &TransportChannel {
        &self.channel
    }

    /// Configured request deadline.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        self.config.request_timeout
    }

    /// Stop the dispatcher and fail every in-flight request with
    /// [`RequestError::Shutdown`].
    pub async fn shutdown(mut self) {
        if let Some(handle) = self.dispatcher.take() {
            handle.abort();
            let _ = handle.await;
        }
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Drop for Correlator {
    fn drop(&mut self) {
        if let Some(handle) = self.dispatcher.take() {
            handle.abort();
        }
    }
}
