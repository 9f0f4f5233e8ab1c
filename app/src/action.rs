//! Every action the caption client dispatches.
//!
//! Commands are emitted by the UI (or by follow-up handlers) and turned into
//! backend requests by `RequestEffects`. Each command has a matching
//! `*Response` action carrying the [`ApiResult`] of its request.

use caption_client_transport::MessageType;
use serde_json::Value;

use crate::error::{ApiResult, ClientError};
use crate::types::{
    BookingUpdate, Credentials, Extra, NewUser, SessionDraft, SessionId, SessionRange,
    SessionUpdate,
};

/// Connection status as shown to the user.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
    /// No connection
    #[default]
    Offline,
    /// Opening a connection
    Connecting,
    /// Connected to the backend
    Online,
}

/// Root action type.
#[derive(Clone, Debug, PartialEq)]
pub enum AppAction {
    // ========== Commands ==========
    /// Log in with email and password
    Login(Credentials),
    /// End the session
    Logout,
    /// Resume the session with the stored token
    Relogin,
    /// Load the persisted token (startup)
    RestoreSession,
    /// Fetch the logged-in user's settings
    GetUserSettings,
    /// Update the logged-in user
    UpdateUser(Extra),
    /// Register an account
    NewUser(NewUser),
    /// List users, unless already loaded
    GetUsers,
    /// Force a fresh user list
    ReloadUsers,
    /// List bookings
    GetBookings,
    /// Update a booking
    UpdateBooking(BookingUpdate),
    /// Add a session
    AddSession(SessionDraft),
    /// Update a session
    UpdateSession(SessionUpdate),
    /// Cancel a session
    CancelSession {
        /// Session to cancel
        session_id: SessionId,
    },
    /// Sessions in a time window
    GetSessionsSummary(SessionRange),
    /// Billing records
    GetBillingList,
    /// Send a password reset link
    StartResetPassword {
        /// Account email
        email: String,
    },
    /// Validate a password reset key
    CheckResetPassword {
        /// Key from the reset link
        key: String,
    },
    /// Set a new password, with a reset key or for the logged-in user
    ChangePassword {
        /// Reset key, if any
        key: Option<String>,
        /// New password
        password: String,
    },
    /// Create a payment intent
    GetStripeClientSecret(Extra),

    // ========== Responses ==========
    /// Result of `logIn`
    LogInResponse(ApiResult),
    /// Result of `logOut`
    LogOutResponse(ApiResult),
    /// Result of `reLogIn`
    ReLogInResponse(ApiResult),
    /// Result of `getUserSettings`
    UserSettingsResponse(ApiResult),
    /// Result of `updateUser`
    UpdateUserResponse(ApiResult),
    /// Result of `newUser`
    NewUserResponse(ApiResult),
    /// Result of `getUsers`
    UsersResponse(ApiResult),
    /// Result of `getBookings`
    BookingsResponse(ApiResult),
    /// Result of `updateBooking`
    UpdateBookingResponse(ApiResult),
    /// Result of `addSession`
    AddSessionResponse(ApiResult),
    /// Result of `updateSession`
    UpdateSessionResponse(ApiResult),
    /// Result of `cancelSession`
    CancelSessionResponse(ApiResult),
    /// A sessions summary request was issued with sequence `seq`
    SessionsSummaryRequested {
        /// Sequence number of the request
        seq: u64,
        /// Requested window
        range: SessionRange,
    },
    /// Result of `getSessionsSummary` number `seq`
    SessionsSummaryResponse {
        /// Sequence number of the request
        seq: u64,
        /// Outcome
        result: ApiResult,
    },
    /// Result of `getBillingList`
    BillingListResponse(ApiResult),
    /// Result of `startResetPassword`
    StartResetPasswordResponse(ApiResult),
    /// Result of `checkResetPassword`
    CheckResetPasswordResponse(ApiResult),
    /// Result of `changePassword`
    ChangePasswordResponse(ApiResult),
    /// Result of `getStripeClientSecret`
    StripeClientSecretResponse(ApiResult),

    // ========== Internal ==========
    /// The auth failure was surfaced; return to anonymous
    AuthFailureAcknowledged,
    /// The server ended the session
    SessionReset,
    /// Redirect to a path
    Navigate(String),
    /// Show an informational message
    Notify(String),
    /// Result of loading the persisted token
    TokenLoaded(Option<String>),
    /// The transport changed state
    ConnectionChanged(ConnectionStatus),
    /// An uncorrelated frame from the server
    ServerPush {
        /// Wire type of the frame
        message_type: String,
        /// Payload
        data: Value,
    },
}

impl AppAction {
    /// Backend request a command maps to, if any.
    #[must_use]
    pub const fn request_type(&self) -> Option<MessageType> {
        Some(match self {
            Self::Login(_) => MessageType::LogIn,
            Self::Logout => MessageType::LogOut,
            Self::Relogin => MessageType::ReLogIn,
            Self::GetUserSettings => MessageType::GetUserSettings,
            Self::UpdateUser(_) => MessageType::UpdateUser,
            Self::NewUser(_) => MessageType::NewUser,
            Self::GetUsers => MessageType::GetUsers,
            Self::GetBookings => MessageType::GetBookings,
            Self::UpdateBooking(_) => MessageType::UpdateBooking,
            Self::AddSession(_) => MessageType::AddSession,
            Self::UpdateSession(_) => MessageType::UpdateSession,
            Self::CancelSession { .. } => MessageType::CancelSession,
            Self::GetSessionsSummary(_) => MessageType::GetSessionsSummary,
            Self::GetBillingList => MessageType::GetBillingList,
            Self::StartResetPassword { .. } => MessageType::StartResetPassword,
            Self::CheckResetPassword { .. } => MessageType::CheckResetPassword,
            Self::ChangePassword { .. } => MessageType::ChangePassword,
            Self::GetStripeClientSecret(_) => MessageType::GetStripeClientSecret,
            _ => return None,
        })
    }

    /// The result carried by a response action.
    #[must_use]
    pub const fn response_result(&self) -> Option<&ApiResult> {
        match self {
            Self::LogInResponse(r)
            | Self::LogOutResponse(r)
            | Self::ReLogInResponse(r)
            | Self::UserSettingsResponse(r)
            | Self::UpdateUserResponse(r)
            | Self::NewUserResponse(r)
            | Self::UsersResponse(r)
            | Self::BookingsResponse(r)
            | Self::UpdateBookingResponse(r)
            | Self::AddSessionResponse(r)
            | Self::UpdateSessionResponse(r)
            | Self::CancelSessionResponse(r)
            | Self::BillingListResponse(r)
            | Self::StartResetPasswordResponse(r)
            | Self::CheckResetPasswordResponse(r)
            | Self::ChangePasswordResponse(r)
            | Self::StripeClientSecretResponse(r)
            | Self::SessionsSummaryResponse { result: r, .. } => Some(r),
            _ => None,
        }
    }

    /// The failure carried by a response action.
    #[must_use]
    pub fn failure(&self) -> Option<&ClientError> {
        self.response_result().and_then(|result| result.as_ref().err())
    }

    /// Failed login, re-login or registration, including a login reply
    /// without a token.
    #[must_use]
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            Self::LogInResponse(Err(_)) | Self::ReLogInResponse(Err(_)) | Self::NewUserResponse(Err(_))
        ) || self.is_tokenless_login()
    }

    /// Successful login reply that carries no `loginToken`.
    #[must_use]
    pub fn is_tokenless_login(&self) -> bool {
        match self {
            Self::LogInResponse(Ok(data)) => data.get("loginToken").and_then(Value::as_str).is_none(),
            _ => false,
        }
    }

    /// Actions that end the user's session locally.
    #[must_use]
    pub const fn is_logout(&self) -> bool {
        matches!(self, Self::Logout | Self::SessionReset)
    }

    /// Short name for logs and metrics labels.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Login(_) => "Login",
            Self::Logout => "Logout",
            Self::Relogin => "Relogin",
            Self::RestoreSession => "RestoreSession",
            Self::GetUserSettings => "GetUserSettings",
            Self::UpdateUser(_) => "UpdateUser",
            Self::NewUser(_) => "NewUser",
            Self::GetUsers => "GetUsers",
            Self::ReloadUsers => "ReloadUsers",
            Self::GetBookings => "GetBookings",
            Self::UpdateBooking(_) => "UpdateBooking",
            Self::AddSession(_) => "AddSession",
            Self::UpdateSession(_) => "UpdateSession",
            Self::CancelSession { .. } => "CancelSession",
            Self::GetSessionsSummary(_) => "GetSessionsSummary",
            Self::GetBillingList => "GetBillingList",
            Self::StartResetPassword { .. } => "StartResetPassword",
            Self::CheckResetPassword { .. } => "CheckResetPassword",
            Self::ChangePassword { .. } => "ChangePassword",
            Self::GetStripeClientSecret(_) => "GetStripeClientSecret",
            Self::LogInResponse(_) => "LogInResponse",
            Self::LogOutResponse(_) => "LogOutResponse",
            Self::ReLogInResponse(_) => "ReLogInResponse",
            Self::UserSettingsResponse(_) => "UserSettingsResponse",
            Self::UpdateUserResponse(_) => "UpdateUserResponse",
            Self::NewUserResponse(_) => "NewUserResponse",
            Self::UsersResponse(_) => "UsersResponse",
            Self::BookingsResponse(_) => "BookingsResponse",
            Self::UpdateBookingResponse(_) => "UpdateBookingResponse",
            Self::AddSessionResponse(_) => "AddSessionResponse",
            Self::UpdateSessionResponse(_) => "UpdateSessionResponse",
            Self::CancelSessionResponse(_) => "CancelSessionResponse",
            Self::SessionsSummaryRequested { .. } => "SessionsSummaryRequested",
            Self::SessionsSummaryResponse { .. } => "SessionsSummaryResponse",
            Self::BillingListResponse(_) => "BillingListResponse",
            Self::StartResetPasswordResponse(_) => "StartResetPasswordResponse",
            Self::CheckResetPasswordResponse(_) => "CheckResetPasswordResponse",
            Self::ChangePasswordResponse(_) => "ChangePasswordResponse",
            Self::StripeClientSecretResponse(_) => "StripeClientSecretResponse",
            Self::AuthFailureAcknowledged => "AuthFailureAcknowledged",
            Self::SessionReset => "SessionReset",
            Self::Navigate(_) => "Navigate",
            Self::Notify(_) => "Notify",
            Self::TokenLoaded(_) => "TokenLoaded",
            Self::ConnectionChanged(_) => "ConnectionChanged",
            Self::ServerPush { .. } => "ServerPush",
        }
    }
}
