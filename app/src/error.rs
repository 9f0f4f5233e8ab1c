//! Application error types.

use caption_client_transport::{BusinessError, RequestError};
use serde_json::Value;
use thiserror::Error;

/// Shown when a successful login reply carries no token.
pub const MISSING_LOGIN_TOKEN: &str = "The server did not return a login token, please try again";

/// Shown when a viewer asks for the user list.
pub const USERS_ADMIN_ONLY: &str = "Only administrators can list users";

/// Why a backend call did not produce a payload.
///
/// Carried inside response actions, so it is `Clone` and compared
/// structurally like the rest of the action.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The backend answered with a non-success code
    #[error(transparent)]
    Business(#[from] BusinessError),

    /// No answer before the deadline
    #[error("request timed out: {0}")]
    Timeout(String),

    /// The request never reached the backend
    #[error("transport error: {0}")]
    Transport(String),

    /// The client is shutting down
    #[error("client shut down")]
    Shutdown,
}

impl ClientError {
    /// Text shown to the user for this failure.
    ///
    /// Business messages are passed through verbatim.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Business(error) => error.message.clone(),
            Self::Timeout(_) => "The server did not respond in time, please try again".to_string(),
            Self::Transport(_) => "You appear to be offline, please check your connection".to_string(),
            Self::Shutdown => "The client is shutting down".to_string(),
        }
    }

    /// Status code of a business failure.
    #[must_use]
    pub const fn code(&self) -> Option<u16> {
        match self {
            Self::Business(error) => Some(error.code),
            _ => None,
        }
    }

    /// Whether re-dispatching the same command may succeed.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Transport(_))
    }
}

impl From<RequestError> for ClientError {
    fn from(error: RequestError) -> Self {
        match error {
            RequestError::Timeout { .. } => Self::Timeout(error.to_string()),
            RequestError::Transport(inner) => Self::Transport(inner.to_string()),
            RequestError::Shutdown => Self::Shutdown,
        }
    }
}

/// Outcome of one backend call as carried by response actions.
pub type ApiResult = Result<Value, ClientError>;

/// Token persistence failures.
#[derive(Error, Debug)]
pub enum TokenStoreError {
    /// Reading or writing the token file failed
    #[error("token store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use caption_client_transport::TransportError;

    #[test]
    fn test_business_message_is_verbatim() {
        let error = ClientError::from(BusinessError {
            code: 401,
            message: "invalid credentials".to_string(),
        });
        assert_eq!(error.user_message(), "invalid credentials");
        assert_eq!(error.code(), Some(401));
        assert!(!error.is_recoverable());
    }

    #[test]
    fn test_request_errors_map_to_recoverable_failures() {
        let timeout = ClientError::from(RequestError::Timeout {
            message_type: "getBookings".to_string(),
            timeout_ms: 10,
        });
        let offline = ClientError::from(RequestError::Transport(TransportError::NotConnected));

        assert!(matches!(timeout, ClientError::Timeout(_)));
        assert!(offline.is_recoverable());
        assert!(offline.user_message().contains("offline"));
    }
}
