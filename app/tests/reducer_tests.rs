//! Root reducer behaviour across slices.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use caption_client::error::ClientError;
use caption_client::reducers::{BookingsReducer, UserReducer};
use caption_client::state::{AppState, BookingsState, UserState};
use caption_client::types::{BookingToken, SessionRange};
use caption_client::{AppAction, AuthStatus, ConnectionStatus, root_reducer};
use caption_client_testing::ReducerTest;
use caption_client_testing::assertions::{assert_replaced_slice, assert_same_slice};
use caption_client_transport::BusinessError;
use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;

// ============================================================================
// Fixtures
// ============================================================================

fn logged_in() -> AppState {
    AppState {
        user: Arc::new(UserState {
            auth: AuthStatus::Authenticated,
            logged: true,
            login_token: Some("abc".to_string()),
            ..UserState::default()
        }),
        bookings: Arc::new(BookingsState {
            loaded: true,
            ..BookingsState::default()
        }),
        ..AppState::default()
    }
}

fn rejected(message: &str) -> ClientError {
    ClientError::Business(BusinessError {
        code: 401,
        message: message.to_string(),
    })
}

/// Actions no reducer owns.
fn unowned_action() -> impl Strategy<Value = AppAction> {
    prop_oneof![
        "[a-z/]{0,12}".prop_map(AppAction::Navigate),
        ".{0,24}".prop_map(AppAction::Notify),
        Just(AppAction::RestoreSession),
        Just(AppAction::GetUserSettings),
        Just(AppAction::ChangePasswordResponse(Ok(json!({})))),
        Just(AppAction::LogOutResponse(Ok(json!({})))),
        Just(AppAction::CheckResetPasswordResponse(Ok(json!({})))),
        "[a-zA-Z]{1,12}".prop_map(|message_type| AppAction::ServerPush {
            message_type,
            data: json!({}),
        }),
    ]
}

// ============================================================================
// Root reducer
// ============================================================================

#[test]
fn test_logout_replaces_every_data_slice() {
    ReducerTest::new(root_reducer())
        .given_state(logged_in())
        .when_action(AppAction::Logout)
        .then_compare(|before, after| {
            assert_replaced_slice(&before.user, &after.user, "user");
            assert_replaced_slice(&before.bookings, &after.bookings, "bookings");
            assert_same_slice(&before.connection, &after.connection, "connection");
        })
        .then_state(|state| {
            assert!(!state.user.logged);
            assert!(state.user.login_token.is_none());
            assert!(!state.bookings.loaded);
        })
        .run();
}

#[test]
fn test_bookings_response_touches_only_bookings() {
    ReducerTest::new(root_reducer())
        .given_state(logged_in())
        .when_action(AppAction::GetBookings)
        .when_action(AppAction::BookingsResponse(Ok(json!({
            "bookings": [{ "bookingToken": "b1" }, { "bookingToken": "b2", "title": "Panel" }]
        }))))
        .then_compare(|before, after| {
            assert_same_slice(&before.user, &after.user, "user");
            assert_same_slice(&before.sessions, &after.sessions, "sessions");
            assert_same_slice(&before.billing, &after.billing, "billing");
        })
        .then_state(|state| {
            let tokens: Vec<_> = state
                .bookings
                .items
                .iter()
                .map(|b| b.booking_token.clone())
                .collect();
            assert_eq!(tokens, vec![BookingToken::new("b1"), BookingToken::new("b2")]);
            assert!(!state.bookings.loading);
        })
        .run();
}

#[test]
fn test_malformed_settings_are_rejected_by_user_slice() {
    ReducerTest::new(root_reducer())
        .given_state(logged_in())
        .when_action(AppAction::UserSettingsResponse(Ok(json!({ "userId": "seven" }))))
        .then_rejected(Some("user"))
        .run();
}

#[test]
fn test_session_reset_keeps_connection() {
    let mut state = logged_in();
    state.connection = Arc::new(caption_client::state::ConnectionSlice {
        status: ConnectionStatus::Online,
        connects: 3,
    });

    ReducerTest::new(root_reducer())
        .given_state(state)
        .when_action(AppAction::SessionReset)
        .then_state(|state| {
            assert_eq!(state.connection.connects, 3);
            assert_eq!(state.user.auth, AuthStatus::Anonymous);
        })
        .run();
}

#[test]
fn test_summary_request_then_response_fills_sessions() {
    let range = SessionRange::new(10, 20);
    ReducerTest::new(root_reducer())
        .given_state(AppState::default())
        .when_action(AppAction::SessionsSummaryRequested { seq: 1, range })
        .when_action(AppAction::SessionsSummaryResponse {
            seq: 1,
            result: Ok(json!([{ "sessionId": 5, "status": "cancelled" }])),
        })
        .then_state(move |state| {
            assert_eq!(state.sessions.range, Some(range));
            assert_eq!(state.sessions.items.len(), 1);
            assert!(!state.sessions.loading);
        })
        .run();
}

// ============================================================================
// Slice reducers
// ============================================================================

#[test]
fn test_relogin_failure_clears_token() {
    ReducerTest::new(UserReducer)
        .given_state(Arc::new(UserState {
            auth: AuthStatus::Authenticating,
            login_token: Some("stale".to_string()),
            ..UserState::default()
        }))
        .when_action(AppAction::ReLogInResponse(Err(rejected("session expired"))))
        .then_state(|user| {
            assert_eq!(user.auth, AuthStatus::AuthFailed);
            assert!(user.login_token.is_none());
            assert_eq!(user.last_error.as_deref(), Some("session expired"));
        })
        .run();
}

#[test]
fn test_failed_bookings_response_stops_loading() {
    ReducerTest::new(BookingsReducer)
        .given_state(Arc::new(BookingsState {
            loading: true,
            ..BookingsState::default()
        }))
        .when_action(AppAction::BookingsResponse(Err(ClientError::Transport(
            "offline".to_string(),
        ))))
        .then_state(|bookings| {
            assert!(!bookings.loading);
            assert!(!bookings.loaded);
        })
        .run();
}

// ============================================================================
// Property tests
// ============================================================================

proptest! {
    #[test]
    fn prop_unowned_actions_keep_every_slice(action in unowned_action()) {
        let before = logged_in();
        let mut after = before.clone();
        caption_client_core::Reducer::reduce(&root_reducer(), &mut after, &action).unwrap();

        prop_assert!(Arc::ptr_eq(&before.user, &after.user));
        prop_assert!(Arc::ptr_eq(&before.bookings, &after.bookings));
        prop_assert!(Arc::ptr_eq(&before.sessions, &after.sessions));
        prop_assert!(Arc::ptr_eq(&before.billing, &after.billing));
        prop_assert!(Arc::ptr_eq(&before.users, &after.users));
        prop_assert!(Arc::ptr_eq(&before.connection, &after.connection));
    }

    #[test]
    fn prop_stale_summaries_never_apply(latest in 2u64..1_000, stale in 0u64..1_000) {
        prop_assume!(stale != latest);
        let range = SessionRange::new(0, 1);
        let mut state = AppState::default();
        let root = root_reducer();
        caption_client_core::Reducer::reduce(
            &root,
            &mut state,
            &AppAction::SessionsSummaryRequested { seq: latest, range },
        )
        .unwrap();
        let requested = Arc::clone(&state.sessions);

        caption_client_core::Reducer::reduce(
            &root,
            &mut state,
            &AppAction::SessionsSummaryResponse {
                seq: stale,
                result: Ok(json!([{ "sessionId": 1 }])),
            },
        )
        .unwrap();

        prop_assert!(Arc::ptr_eq(&requested, &state.sessions));
        prop_assert!(state.sessions.loading);
    }
}
