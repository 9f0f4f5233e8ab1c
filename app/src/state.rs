//! The application state tree.
//!
//! Each field of [`AppState`] is an `Arc` slice owned by exactly one reducer
//! in [`crate::reducers`]. Observers compare slices by reference.

use std::sync::Arc;

use crate::action::ConnectionStatus;
use crate::types::{BillingRecord, Booking, Session, SessionRange, User, UserSettings};

/// Where the user is in the authentication flow.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AuthStatus {
    /// Not logged in
    #[default]
    Anonymous,
    /// A login or re-login is in flight
    Authenticating,
    /// Logged in
    Authenticated,
    /// The last login failed; cleared once the failure was surfaced
    AuthFailed,
}

/// Session of the current user.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UserState {
    /// Authentication flow position
    pub auth: AuthStatus,
    /// Logged in with a valid token
    pub logged: bool,
    /// Viewing as an anonymous guest
    pub anonymous: bool,
    /// Token replayed by `reLogIn`
    pub login_token: Option<String>,
    /// Settings of the logged-in user
    pub user_info: Option<UserSettings>,
    /// The backend asked for a booking passcode
    pub requested_passcode: Option<bool>,
    /// Payment intent secret
    pub stripe_client_secret: Option<String>,
    /// Message of the last authentication failure
    pub last_error: Option<String>,
}

impl UserState {
    /// Whether the user is fully logged in.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self.auth, AuthStatus::Authenticated)
    }
}

/// Bookings of the logged-in user.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BookingsState {
    /// Loaded bookings
    pub items: Vec<Booking>,
    /// A `getBookings` request is in flight
    pub loading: bool,
    /// At least one list was received
    pub loaded: bool,
}

/// Sessions summary for a time window.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionsState {
    /// Window of the latest request
    pub range: Option<SessionRange>,
    /// Sequence number of the latest request; older responses are dropped
    pub latest_request: u64,
    /// Sessions of the latest answered request
    pub items: Vec<Session>,
    /// The latest request is unanswered
    pub loading: bool,
}

/// Billing records.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BillingState {
    /// Loaded records
    pub items: Vec<BillingRecord>,
    /// A request is in flight
    pub loading: bool,
    /// At least one list was received
    pub loaded: bool,
}

/// User list for administrators.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UsersState {
    /// Loaded accounts
    pub items: Vec<User>,
    /// A request is in flight
    pub loading: bool,
    /// The list is current; `GetUsers` is skipped while set
    pub loaded: bool,
}

/// Transport status.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConnectionSlice {
    /// Current status
    pub status: ConnectionStatus,
    /// Number of times the client came online
    pub connects: u32,
}

/// Root state.
#[derive(Clone, Debug, Default)]
pub struct AppState {
    /// Current user session
    pub user: Arc<UserState>,
    /// Bookings
    pub bookings: Arc<BookingsState>,
    /// Sessions summary
    pub sessions: Arc<SessionsState>,
    /// Billing records
    pub billing: Arc<BillingState>,
    /// User list
    pub users: Arc<UsersState>,
    /// Transport status
    pub connection: Arc<ConnectionSlice>,
}

/// Selector functions for `Store::select` / `Store::select_value`.
pub mod selectors {
    use super::{
        AppState, Arc, AuthStatus, BillingState, BookingsState, ConnectionStatus, SessionsState,
        UserState, UsersState,
    };

    /// User slice
    #[must_use]
    pub fn user(state: &AppState) -> Arc<UserState> {
        Arc::clone(&state.user)
    }

    /// Bookings slice
    #[must_use]
    pub fn bookings(state: &AppState) -> Arc<BookingsState> {
        Arc::clone(&state.bookings)
    }

    /// Sessions slice
    #[must_use]
    pub fn sessions(state: &AppState) -> Arc<SessionsState> {
        Arc::clone(&state.sessions)
    }

    /// Billing slice
    #[must_use]
    pub fn billing(state: &AppState) -> Arc<BillingState> {
        Arc::clone(&state.billing)
    }

    /// Users slice
    #[must_use]
    pub fn users(state: &AppState) -> Arc<UsersState> {
        Arc::clone(&state.users)
    }

    /// Authentication status
    #[must_use]
    pub fn auth_status(state: &AppState) -> AuthStatus {
        state.user.auth
    }

    /// Whether the user is logged in
    #[must_use]
    pub fn is_logged(state: &AppState) -> bool {
        state.user.logged
    }

    /// Stored login token
    #[must_use]
    pub fn login_token(state: &AppState) -> Option<String> {
        state.user.login_token.clone()
    }

    /// Connection status
    #[must_use]
    pub fn connection_status(state: &AppState) -> ConnectionStatus {
        state.connection.status
    }
}
