//! Error types for the transport channel and the correlator.

use thiserror::Error;

/// Errors raised by the transport channel.
///
/// All of them are recoverable: the channel keeps reconnecting in the
/// background and callers may re-issue their request later.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No active connection. `send` never queues while disconnected.
    #[error("Not connected to backend")]
    NotConnected,

    /// Opening the connection failed
    #[error("Failed to connect to {endpoint}: {reason}")]
    ConnectFailed {
        /// Endpoint that was dialled
        endpoint: String,
        /// Underlying failure
        reason: String,
    },

    /// The live connection failed while reading or writing
    #[error("Connection error: {0}")]
    Connection(String),

    /// A frame could not be encoded or decoded
    #[error("Frame codec error: {0}")]
    Codec(String),

    /// The peer closed the connection, or the channel was closed locally
    #[error("Connection closed")]
    Closed,
}

impl From<serde_json::Error> for TransportError {
    fn from(error: serde_json::Error) -> Self {
        Self::Codec(error.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(error: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match error {
            WsError::ConnectionClosed | WsError::AlreadyClosed => Self::Closed,
            other => Self::Connection(other.to_string()),
        }
    }
}

/// Why a correlated request did not produce a response.
///
/// Business failures (non-2xx codes) are not errors at this level; they
/// resolve as a [`Response`](crate::correlator::Response) in an error state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// The frame could not be handed to the transport
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// No matching response arrived before the deadline
    #[error("Request `{message_type}` timed out after {timeout_ms}ms")]
    Timeout {
        /// Wire name of the request type
        message_type: String,
        /// Deadline that elapsed
        timeout_ms: u64,
    },

    /// The correlator shut down before the response arrived
    #[error("Correlator shut down")]
    Shutdown,
}

impl RequestError {
    /// Whether a later re-dispatch by the user may succeed.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout { .. })
    }
}

/// A non-success status code together with the server-supplied message.
///
/// Always surfaced verbatim to the user and never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct BusinessError {
    /// Status code sent by the backend
    pub code: u16,
    /// Message sent by the backend
    pub message: String,
}
