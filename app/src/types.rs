//! Domain descriptors and request payloads.
//!
//! Descriptors carry the few fields the client keys on (ids, session
//! status) and keep every other server field verbatim in `extra`, so a
//! round trip through the client never loses data the UI may render.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Server fields the client does not interpret.
pub type Extra = Map<String, Value>;

// ============================================================================
// Identifiers
// ============================================================================

/// Backend user id
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Public token identifying a booking
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookingToken(pub String);

impl BookingToken {
    /// Create a booking token
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl fmt::Display for BookingToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Backend session id
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub i64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Descriptors
// ============================================================================

/// Profile and preferences of the logged-in user
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSettings {
    /// User id
    pub user_id: UserId,
    /// Login email
    #[serde(default)]
    pub email: Option<String>,
    /// Preferred IANA time zone
    #[serde(default)]
    pub time_zone: Option<String>,
    /// Remaining fields
    #[serde(flatten)]
    pub extra: Extra,
}

/// An account as listed for administrators
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// User id
    pub user_id: UserId,
    /// Login email
    #[serde(default)]
    pub email: Option<String>,
    /// Remaining fields
    #[serde(flatten)]
    pub extra: Extra,
}

/// A captioning booking
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    /// Booking token
    pub booking_token: BookingToken,
    /// Title shown to viewers
    #[serde(default)]
    pub title: Option<String>,
    /// Sessions of this booking, when the server embeds them
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sessions: Vec<Session>,
    /// Remaining fields
    #[serde(flatten)]
    pub extra: Extra,
}

/// Lifecycle of a session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionStatus {
    /// Scheduled
    #[serde(alias = "future", alias = "FUTURE")]
    Future,
    /// Cancelled before it ran
    #[serde(alias = "cancelled", alias = "CANCELLED")]
    Cancelled,
    /// Already ran
    #[serde(alias = "completed", alias = "COMPLETED")]
    Completed,
}

/// One captioning session
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Session id
    pub session_id: SessionId,
    /// Owning booking
    #[serde(default)]
    pub booking_token: Option<BookingToken>,
    /// Status, when reported
    #[serde(default)]
    pub status: Option<SessionStatus>,
    /// Remaining fields
    #[serde(flatten)]
    pub extra: Extra,
}

/// One billing record
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingRecord {
    /// Record id, when the server provides one
    #[serde(default)]
    pub billing_id: Option<i64>,
    /// Remaining fields
    #[serde(flatten)]
    pub extra: Extra,
}

// ============================================================================
// Request payloads
// ============================================================================

/// Email/password pair
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Login email
    pub email: String,
    /// Password
    pub password: String,
}

impl Credentials {
    /// Create credentials
    #[must_use]
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Registration form
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    /// Login email
    pub email: String,
    /// Password
    pub password: String,
    /// Remaining form fields (name, time zone, ...)
    #[serde(flatten)]
    pub extra: Extra,
}

impl fmt::Debug for NewUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewUser")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("extra", &self.extra)
            .finish()
    }
}

/// Changed booking fields.
///
/// Access flags (`require_passcode`, `require_login`,
/// `authorized_viewers_only`) and `viewer_emails` are sent exactly as
/// given; none is derived from another.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingUpdate {
    /// Booking to update
    pub booking_token: BookingToken,
    /// New title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Audio source details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_details: Option<String>,
    /// Caption display details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption_disp_details: Option<String>,
    /// Time zone override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone_override: Option<String>,
    /// Viewer passcode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking_passcode: Option<String>,
    /// Viewers must enter the passcode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_passcode: Option<bool>,
    /// Viewers must log in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_login: Option<bool>,
    /// Only listed viewers may watch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorized_viewers_only: Option<bool>,
    /// Comma separated viewer emails
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewer_emails: Option<String>,
}

impl Default for BookingToken {
    fn default() -> Self {
        Self(String::new())
    }
}

/// A session to add to a booking
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDraft {
    /// Booking the session belongs to
    pub booking_token: BookingToken,
    /// Schedule and caption fields
    #[serde(flatten)]
    pub fields: Extra,
}

/// Changed session fields
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUpdate {
    /// Session to update
    pub session_id: SessionId,
    /// Changed fields
    #[serde(flatten)]
    pub fields: Extra,
}

/// Time window of the sessions summary, in epoch seconds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRange {
    /// Inclusive start
    pub from_epoch: i64,
    /// Exclusive end
    pub to_epoch: i64,
}

impl SessionRange {
    /// Create a range
    #[must_use]
    pub const fn new(from_epoch: i64, to_epoch: i64) -> Self {
        Self {
            from_epoch,
            to_epoch,
        }
    }
}

/// Extract a list under one of `keys` (or a bare array) from response data.
///
/// # Errors
///
/// Returns the serde error if the list does not deserialize, or a message
/// if no list is present at all.
pub fn list_from<T>(data: &Value, keys: &[&str]) -> Result<Vec<T>, String>
where
    T: for<'de> Deserialize<'de>,
{
    let list = match data {
        Value::Array(_) => data,
        Value::Object(object) => keys
            .iter()
            .find_map(|key| object.get(*key))
            .ok_or_else(|| format!("expected one of {keys:?}"))?,
        Value::Null => return Ok(Vec::new()),
        other => return Err(format!("expected a list, got {other}")),
    };
    serde_json::from_value(list.clone()).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_session_keeps_unknown_fields() {
        let raw = json!({
            "sessionId": 12,
            "status": "Cancelled",
            "startEpoch": 1_700_000_000,
            "captioner": "ada"
        });
        let session: Session = serde_json::from_value(raw.clone()).unwrap();

        assert_eq!(session.session_id, SessionId(12));
        assert_eq!(session.status, Some(SessionStatus::Cancelled));
        assert_eq!(session.extra["captioner"], json!("ada"));
        assert_eq!(serde_json::to_value(&session).unwrap()["startEpoch"], raw["startEpoch"]);
    }

    #[test]
    fn test_status_accepts_lowercase() {
        let status: SessionStatus = serde_json::from_value(json!("future")).unwrap();
        assert_eq!(status, SessionStatus::Future);
    }

    #[test]
    fn test_booking_update_sends_only_given_flags() {
        let update = BookingUpdate {
            booking_token: BookingToken::new("bk-1"),
            viewer_emails: Some("a@b.c".to_string()),
            ..BookingUpdate::default()
        };

        let wire = serde_json::to_value(&update).unwrap();

        assert_eq!(wire, json!({"bookingToken": "bk-1", "viewerEmails": "a@b.c"}));
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let debug = format!("{:?}", Credentials::new("a@b.c", "hunter2"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_list_from_accepts_keyed_or_bare_lists() {
        let keyed: Vec<User> =
            list_from(&json!({"users": [{"userId": 1}]}), &["users"]).unwrap();
        let bare: Vec<User> = list_from(&json!([{"userId": 2}]), &["users"]).unwrap();

        assert_eq!(keyed[0].user_id, UserId(1));
        assert_eq!(bare[0].user_id, UserId(2));
        assert!(list_from::<User>(&json!({"other": []}), &["users"]).is_err());
    }
}
