//! Wire frames exchanged with the backend.
//!
//! Every frame is one JSON text message:
//!
//! ```text
//! {"type": "logIn", "correlationId": "…", "data": {…}, "code": 200, "error": "…"}
//! ```
//!
//! Requests carry `type`, `correlationId` and `data`. Responses echo the
//! `correlationId` and add `code` (and `error` on failure). Frames without a
//! correlation id are server pushes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::TransportError;

/// Status code assumed when a response omits `code`.
pub const DEFAULT_STATUS_CODE: u16 = 200;

/// Unique identifier matching a response to its request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Create a new random correlation ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Request types the client issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Email/password login
    LogIn,
    /// End the server session
    LogOut,
    /// Resume a session with a stored token
    ReLogIn,
    /// Fetch the logged-in user's profile and preferences
    GetUserSettings,
    /// Update the logged-in user
    UpdateUser,
    /// Register a new account
    NewUser,
    /// List users (administrators)
    GetUsers,
    /// List bookings
    GetBookings,
    /// Update a booking
    UpdateBooking,
    /// Add a session to a booking
    AddSession,
    /// Update a session
    UpdateSession,
    /// Cancel a session
    CancelSession,
    /// Sessions in a time range
    GetSessionsSummary,
    /// Billing records
    GetBillingList,
    /// Request a password reset email
    StartResetPassword,
    /// Validate a password reset key
    CheckResetPassword,
    /// Set a new password
    ChangePassword,
    /// Payment intent client secret
    GetStripeClientSecret,
}

impl MessageType {
    /// All request types, in declaration order.
    pub const ALL: [Self; 18] = [
        Self::LogIn,
        Self::LogOut,
        Self::ReLogIn,
        Self::GetUserSettings,
        Self::UpdateUser,
        Self::NewUser,
        Self::GetUsers,
        Self::GetBookings,
        Self::UpdateBooking,
        Self::AddSession,
        Self::UpdateSession,
        Self::CancelSession,
        Self::GetSessionsSummary,
        Self::GetBillingList,
        Self::StartResetPassword,
        Self::CheckResetPassword,
        Self::ChangePassword,
        Self::GetStripeClientSecret,
    ];

    /// Wire name of the request type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LogIn => "logIn",
            Self::LogOut => "logOut",
            Self::ReLogIn => "reLogIn",
            Self::GetUserSettings => "getUserSettings",
            Self::UpdateUser => "updateUser",
            Self::NewUser => "newUser",
            Self::GetUsers => "getUsers",
            Self::GetBookings => "getBookings",
            Self::UpdateBooking => "updateBooking",
            Self::AddSession => "addSession",
            Self::UpdateSession => "updateSession",
            Self::CancelSession => "cancelSession",
            Self::GetSessionsSummary => "getSessionsSummary",
            Self::GetBillingList => "getBillingList",
            Self::StartResetPassword => "startResetPassword",
            Self::CheckResetPassword => "checkResetPassword",
            Self::ChangePassword => "changePassword",
            Self::GetStripeClientSecret => "getStripeClientSecret",
        }
    }

    /// Parse a wire name.
    #[must_use]
    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message on the wire.
///
/// `message_type` stays a plain string so unknown server pushes still decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    /// Discriminant tag
    #[serde(rename = "type")]
    pub message_type: String,

    /// Present on requests and on their responses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<CorrelationId>,

    /// Payload
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,

    /// Status code (responses only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,

    /// Server-supplied error message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Frame {
    /// Build an outgoing request frame.
    #[must_use]
    pub fn request(message_type: MessageType, correlation_id: CorrelationId, data: Value) -> Self {
        Self {
            message_type: message_type.as_str().to_string(),
            correlation_id: Some(correlation_id),
            data,
            code: None,
            error: None,
        }
    }

    /// Build a response frame echoing `correlation_id`.
    #[must_use]
    pub fn response(
        message_type: impl Into<String>,
        correlation_id: CorrelationId,
        code: u16,
        data: Value,
    ) -> Self {
        Self {
            message_type: message_type.into(),
            correlation_id: Some(correlation_id),
            data,
            code: Some(code),
            error: None,
        }
    }

    /// Build an uncorrelated server push.
    #[must_use]
    pub fn push(message_type: impl Into<String>, data: Value) -> Self {
        Self {
            message_type: message_type.into(),
            correlation_id: None,
            data,
            code: None,
            error: None,
        }
    }

    /// Attach an error message.
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Status code, defaulting to 200 when the backend omitted it.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        self.code.unwrap_or(DEFAULT_STATUS_CODE)
    }

    /// Parsed request type, if it is one the client knows.
    #[must_use]
    pub fn known_type(&self) -> Option<MessageType> {
        MessageType::from_wire(&self.message_type)
    }

    /// Encode as JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Codec`] if serialization fails.
    pub fn encode(&self) -> Result<String, TransportError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Codec`] for malformed frames.
    pub fn decode(text: &str) -> Result<Self, TransportError> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_frame_uses_camel_case_wire_names() {
        let id = CorrelationId::new();
        let frame = Frame::request(MessageType::GetUserSettings, id, json!({"a": 1}));

        let value: Value = serde_json::from_str(&frame.encode().unwrap()).unwrap();

        assert_eq!(value["type"], "getUserSettings");
        assert_eq!(value["correlationId"], id.to_string());
        assert_eq!(value["data"]["a"], 1);
        assert!(value.get("code").is_none());
        assert!(value.get("error").is_none());
    }

    #[test]
    fn missing_code_defaults_to_success() {
        let frame = Frame::decode(r#"{"type":"logOut","data":{}}"#).unwrap();
        assert_eq!(frame.status_code(), 200);
        assert_eq!(frame.known_type(), Some(MessageType::LogOut));
        assert!(frame.correlation_id.is_none());
    }

    #[test]
    fn unknown_push_types_still_decode() {
        let frame = Frame::decode(r#"{"type":"sessionExpired"}"#).unwrap();
        assert_eq!(frame.message_type, "sessionExpired");
        assert_eq!(frame.known_type(), None);
        assert!(frame.data.is_null());
    }

    #[test]
    fn malformed_frames_are_codec_errors() {
        let err = Frame::decode("{not json").unwrap_err();
        assert!(matches!(err, TransportError::Codec(_)));
    }

    #[test]
    fn every_message_type_round_trips_its_wire_name() {
        for message_type in MessageType::ALL {
            assert_eq!(MessageType::from_wire(message_type.as_str()), Some(message_type));
        }
    }
}
