//! Slice reducers and the root reducer.
//!
//! One reducer per slice, scoped onto [`AppState`] by [`root_reducer`].
//! Every reducer leaves its `Arc` untouched for actions it does not handle.

use std::sync::Arc;

use caption_client_core::composition::{BoxedReducer, combine_reducers, scope_reducer};
use caption_client_core::{Reducer, StateInvariantViolation, slice};
use serde::Deserialize;
use serde_json::Value;

use crate::action::{AppAction, ConnectionStatus};
use crate::error::MISSING_LOGIN_TOKEN;
use crate::state::{
    AppState, AuthStatus, BillingState, BookingsState, ConnectionSlice, SessionsState, UserState,
    UsersState,
};
use crate::types::{UserSettings, list_from};

/// Keys under which list responses carry their items.
const BOOKING_KEYS: &[&str] = &["bookings"];
const SESSION_KEYS: &[&str] = &["sessions"];
const BILLING_KEYS: &[&str] = &["billing", "billingList"];
const USER_KEYS: &[&str] = &["users"];

fn parse_list<T>(
    slice_name: &'static str,
    data: &Value,
    keys: &[&str],
) -> Result<Vec<T>, StateInvariantViolation>
where
    T: for<'de> Deserialize<'de>,
{
    list_from(data, keys).map_err(|reason| StateInvariantViolation::new(slice_name, reason))
}

/// Copy the session fields a login-class response may carry.
fn apply_session_data(user: &mut UserState, data: &Value) {
    if let Some(token) = data.get("loginToken").and_then(Value::as_str) {
        user.login_token = Some(token.to_string());
    }
    if let Some(anonymous) = data.get("anonymous").and_then(Value::as_bool) {
        user.anonymous = anonymous;
    }
    if let Some(requested) = data.get("requestedPasscode").and_then(Value::as_bool) {
        user.requested_passcode = Some(requested);
    }
}

/// A token is held and the user is logged in or logging in.
fn in_session(user: &UserState) -> bool {
    user.login_token.is_some()
        && matches!(user.auth, AuthStatus::Authenticating | AuthStatus::Authenticated)
}

/// Fresh user carrying an authentication failure.
fn failed_user(message: String) -> UserState {
    UserState {
        auth: AuthStatus::AuthFailed,
        last_error: Some(message),
        ..UserState::default()
    }
}

// ============================================================================
// User
// ============================================================================

/// Owns the `user` slice and the authentication state machine.
#[derive(Debug, Clone, Copy, Default)]
pub struct UserReducer;

impl Reducer for UserReducer {
    type State = Arc<UserState>;
    type Action = AppAction;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: &Self::Action,
    ) -> Result<(), StateInvariantViolation> {
        match action {
            AppAction::Login(_) | AppAction::NewUser(_) => slice::update(state, |user| {
                user.auth = AuthStatus::Authenticating;
                user.last_error = None;
            }),
            // Replies to a login that is no longer in flight (the user
            // logged out meanwhile) must not bring the session back
            response @ (AppAction::LogInResponse(_)
            | AppAction::ReLogInResponse(_)
            | AppAction::NewUserResponse(_))
                if state.auth != AuthStatus::Authenticating =>
            {
                tracing::debug!(
                    action = response.name(),
                    auth = ?state.auth,
                    "Dropping login reply outside a login"
                );
            },
            tokenless @ AppAction::LogInResponse(Ok(_)) if tokenless.is_tokenless_login() => {
                slice::replace(state, failed_user(MISSING_LOGIN_TOKEN.to_string()));
            },
            AppAction::LogInResponse(Ok(data))
            | AppAction::ReLogInResponse(Ok(data))
            | AppAction::NewUserResponse(Ok(data)) => {
                slice::update(state, |user| {
                    apply_session_data(user, data);
                    user.auth = AuthStatus::Authenticated;
                    user.logged = true;
                    user.last_error = None;
                });
            },
            AppAction::LogInResponse(Err(error))
            | AppAction::ReLogInResponse(Err(error))
            | AppAction::NewUserResponse(Err(error)) => {
                slice::replace(state, failed_user(error.user_message()));
            },
            AppAction::AuthFailureAcknowledged => {
                if state.auth == AuthStatus::AuthFailed {
                    slice::reset(state);
                }
            },
            AppAction::Relogin => {
                if state.login_token.is_some() && state.auth != AuthStatus::Authenticating {
                    slice::update(state, |user| user.auth = AuthStatus::Authenticating);
                }
            },
            AppAction::TokenLoaded(Some(token)) => {
                let token = token.clone();
                slice::update(state, |user| user.login_token = Some(token));
            },
            AppAction::UserSettingsResponse(Ok(_)) | AppAction::StripeClientSecretResponse(Ok(_))
                if !in_session(state) =>
            {
                tracing::debug!(action = action.name(), "Dropping user data outside a session");
            },
            AppAction::UserSettingsResponse(Ok(data)) => {
                let settings = UserSettings::deserialize(data)
                    .map_err(|e| StateInvariantViolation::new("user", e.to_string()))?;
                slice::update(state, |user| {
                    user.user_info = Some(settings);
                    user.logged = true;
                    user.auth = AuthStatus::Authenticated;
                });
            },
            AppAction::StripeClientSecretResponse(Ok(data)) => {
                let secret = ["stripeClientSecret", "clientSecret"]
                    .iter()
                    .find_map(|key| data.get(*key).and_then(Value::as_str))
                    .ok_or_else(|| {
                        StateInvariantViolation::new("user", "missing stripeClientSecret")
                    })?
                    .to_string();
                slice::update(state, |user| user.stripe_client_secret = Some(secret));
            },
            AppAction::Logout | AppAction::SessionReset => slice::reset(state),
            _ => {},
        }
        Ok(())
    }
}

// ============================================================================
// Bookings
// ============================================================================

/// Owns the `bookings` slice.
#[derive(Debug, Clone, Copy, Default)]
pub struct BookingsReducer;

impl Reducer for BookingsReducer {
    type State = Arc<BookingsState>;
    type Action = AppAction;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: &Self::Action,
    ) -> Result<(), StateInvariantViolation> {
        match action {
            AppAction::GetBookings => slice::update(state, |bookings| bookings.loading = true),
            AppAction::BookingsResponse(Ok(data)) => {
                let items = parse_list("bookings", data, BOOKING_KEYS)?;
                slice::replace(
                    state,
                    BookingsState {
                        items,
                        loading: false,
                        loaded: true,
                    },
                );
            },
            AppAction::BookingsResponse(Err(_)) => {
                slice::update(state, |bookings| bookings.loading = false);
            },
            AppAction::Logout | AppAction::SessionReset => slice::reset(state),
            _ => {},
        }
        Ok(())
    }
}

// ============================================================================
// Sessions
// ============================================================================

/// Owns the `sessions` slice.
///
/// Only the response to the latest summary request is applied; earlier
/// ones are dropped when they arrive.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionsReducer;

impl Reducer for SessionsReducer {
    type State = Arc<SessionsState>;
    type Action = AppAction;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: &Self::Action,
    ) -> Result<(), StateInvariantViolation> {
        match action {
            AppAction::SessionsSummaryRequested { seq, range } => {
                let (seq, range) = (*seq, *range);
                slice::update(state, |sessions| {
                    sessions.latest_request = seq;
                    sessions.range = Some(range);
                    sessions.loading = true;
                });
            },
            AppAction::SessionsSummaryResponse { seq, result } => {
                if *seq != state.latest_request {
                    tracing::debug!(
                        seq,
                        latest = state.latest_request,
                        "Dropping superseded sessions summary"
                    );
                    return Ok(());
                }
                match result {
                    Ok(data) => {
                        let items = parse_list("sessions", data, SESSION_KEYS)?;
                        slice::update(state, |sessions| {
                            sessions.items = items;
                            sessions.loading = false;
                        });
                    },
                    Err(_) => slice::update(state, |sessions| sessions.loading = false),
                }
            },
            AppAction::Logout | AppAction::SessionReset => slice::reset(state),
            _ => {},
        }
        Ok(())
    }
}

// ============================================================================
// Billing
// ============================================================================

/// Owns the `billing` slice.
#[derive(Debug, Clone, Copy, Default)]
pub struct BillingReducer;

impl Reducer for BillingReducer {
    type State = Arc<BillingState>;
    type Action = AppAction;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: &Self::Action,
    ) -> Result<(), StateInvariantViolation> {
        match action {
            AppAction::GetBillingList => slice::update(state, |billing| billing.loading = true),
            AppAction::BillingListResponse(Ok(data)) => {
                let items = parse_list("billing", data, BILLING_KEYS)?;
                slice::replace(
                    state,
                    BillingState {
                        items,
                        loading: false,
                        loaded: true,
                    },
                );
            },
            AppAction::BillingListResponse(Err(_)) => {
                slice::update(state, |billing| billing.loading = false);
            },
            AppAction::Logout | AppAction::SessionReset => slice::reset(state),
            _ => {},
        }
        Ok(())
    }
}

// ============================================================================
// Users
// ============================================================================

/// Owns the `users` slice.
#[derive(Debug, Clone, Copy, Default)]
pub struct UsersReducer;

impl Reducer for UsersReducer {
    type State = Arc<UsersState>;
    type Action = AppAction;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: &Self::Action,
    ) -> Result<(), StateInvariantViolation> {
        match action {
            AppAction::GetUsers if !state.loaded => {
                slice::update(state, |users| users.loading = true);
            },
            AppAction::ReloadUsers => slice::update(state, |users| users.loaded = false),
            AppAction::UsersResponse(Ok(data)) => {
                let items = parse_list("users", data, USER_KEYS)?;
                slice::replace(
                    state,
                    UsersState {
                        items,
                        loading: false,
                        loaded: true,
                    },
                );
            },
            AppAction::UsersResponse(Err(_)) => slice::update(state, |users| users.loading = false),
            AppAction::Logout | AppAction::SessionReset => slice::reset(state),
            _ => {},
        }
        Ok(())
    }
}

// ============================================================================
// Connection
// ============================================================================

/// Owns the `connection` slice.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectionReducer;

impl Reducer for ConnectionReducer {
    type State = Arc<ConnectionSlice>;
    type Action = AppAction;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: &Self::Action,
    ) -> Result<(), StateInvariantViolation> {
        match action {
            AppAction::ConnectionChanged(status) if state.status != *status => {
                let status = *status;
                slice::update(state, |connection| {
                    connection.status = status;
                    if status == ConnectionStatus::Online {
                        connection.connects += 1;
                    }
                });
            },
            _ => {},
        }
        Ok(())
    }
}

/// The root reducer: one scoped reducer per slice.
#[must_use]
pub fn root_reducer() -> BoxedReducer<AppState, AppAction> {
    Box::new(combine_reducers(vec![
        Box::new(scope_reducer(
            UserReducer,
            |s: &AppState| &s.user,
            |s: &mut AppState, v| s.user = v,
        )),
        Box::new(scope_reducer(
            BookingsReducer,
            |s: &AppState| &s.bookings,
            |s: &mut AppState, v| s.bookings = v,
        )),
        Box::new(scope_reducer(
            SessionsReducer,
            |s: &AppState| &s.sessions,
            |s: &mut AppState, v| s.sessions = v,
        )),
        Box::new(scope_reducer(
            BillingReducer,
            |s: &AppState| &s.billing,
            |s: &mut AppState, v| s.billing = v,
        )),
        Box::new(scope_reducer(
            UsersReducer,
            |s: &AppState| &s.users,
            |s: &mut AppState, v| s.users = v,
        )),
        Box::new(scope_reducer(
            ConnectionReducer,
            |s: &AppState| &s.connection,
            |s: &mut AppState, v| s.connection = v,
        )),
    ]))
}
