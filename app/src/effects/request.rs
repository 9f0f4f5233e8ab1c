//! Command actions → backend requests → response actions.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use caption_client_core::effect::Effect;
use caption_client_core::handler::EffectHandler;
use caption_client_core::{SmallVec, async_effect, smallvec};
use caption_client_transport::{BusinessError, MessageType};
use serde_json::{Map, Value, json};

use crate::action::AppAction;
use crate::config::ClientRole;
use crate::environment::AppEnvironment;
use crate::error::{ApiResult, ClientError, USERS_ADMIN_ONLY};
use crate::state::AppState;

/// Issues one correlated request per command action.
#[derive(Debug, Default)]
pub struct RequestEffects {
    /// Last sessions summary sequence number handed out
    summary_seq: AtomicU64,
}

impl RequestEffects {
    /// Create the handler
    #[must_use]
    pub const fn new() -> Self {
        Self {
            summary_seq: AtomicU64::new(0),
        }
    }

    /// Wire payload for a command, or `None` to skip the request.
    fn payload(action: &AppAction, state: &AppState) -> Option<Value> {
        let payload = match action {
            AppAction::Login(credentials) => json!({
                "email": credentials.email,
                "password": credentials.password,
            }),
            AppAction::Relogin => {
                let token = state.user.login_token.as_deref()?;
                json!({ "loginToken": token })
            },
            AppAction::GetUsers if state.users.loaded => return None,
            AppAction::UpdateUser(fields) | AppAction::GetStripeClientSecret(fields) => {
                Value::Object(fields.clone())
            },
            AppAction::NewUser(user) => json!(user),
            AppAction::UpdateBooking(update) => json!(update),
            AppAction::AddSession(draft) => json!(draft),
            AppAction::UpdateSession(update) => json!(update),
            AppAction::CancelSession { session_id } => json!({ "sessionId": session_id }),
            AppAction::GetSessionsSummary(range) => json!(range),
            AppAction::StartResetPassword { email } => json!({ "email": email }),
            AppAction::CheckResetPassword { key } => json!({ "key": key }),
            AppAction::ChangePassword { key, password } => {
                let mut body = Map::new();
                if let Some(key) = key {
                    body.insert("key".to_string(), json!(key));
                }
                body.insert("password".to_string(), json!(password));
                Value::Object(body)
            },
            _ => Value::Null,
        };
        Some(payload)
    }
}

impl RequestEffects {
    /// Local rejection for commands `role` may not issue.
    fn forbidden(action: &AppAction, role: ClientRole) -> Option<AppAction> {
        match action {
            AppAction::GetUsers if role != ClientRole::Admin => {
                Some(AppAction::UsersResponse(Err(ClientError::Business(BusinessError {
                    code: 403,
                    message: USERS_ADMIN_ONLY.to_string(),
                }))))
            },
            _ => None,
        }
    }
}

/// Response action wrapping the result of a command's request.
fn respond(message_type: MessageType, result: ApiResult) -> Option<AppAction> {
    Some(match message_type {
        MessageType::LogIn => AppAction::LogInResponse(result),
        MessageType::LogOut => AppAction::LogOutResponse(result),
        MessageType::ReLogIn => AppAction::ReLogInResponse(result),
        MessageType::GetUserSettings => AppAction::UserSettingsResponse(result),
        MessageType::UpdateUser => AppAction::UpdateUserResponse(result),
        MessageType::NewUser => AppAction::NewUserResponse(result),
        MessageType::GetUsers => AppAction::UsersResponse(result),
        MessageType::GetBookings => AppAction::BookingsResponse(result),
        MessageType::UpdateBooking => AppAction::UpdateBookingResponse(result),
        MessageType::AddSession => AppAction::AddSessionResponse(result),
        MessageType::UpdateSession => AppAction::UpdateSessionResponse(result),
        MessageType::CancelSession => AppAction::CancelSessionResponse(result),
        MessageType::GetBillingList => AppAction::BillingListResponse(result),
        MessageType::StartResetPassword => AppAction::StartResetPasswordResponse(result),
        MessageType::CheckResetPassword => AppAction::CheckResetPasswordResponse(result),
        MessageType::ChangePassword => AppAction::ChangePasswordResponse(result),
        MessageType::GetStripeClientSecret => AppAction::StripeClientSecretResponse(result),
        // Carries a sequence number; built by the caller
        MessageType::GetSessionsSummary => return None,
    })
}

/// Send one request and wrap its outcome with `wrap`.
fn request<F>(
    env: &AppEnvironment,
    message_type: MessageType,
    payload: Value,
    wrap: F,
) -> Effect<AppAction>
where
    F: FnOnce(ApiResult) -> Option<AppAction> + Send + 'static,
{
    let correlator = Arc::clone(&env.correlator);
    async_effect! {
        let result = match correlator.request(message_type, payload).await {
            Ok(response) => response.into_result().map_err(ClientError::from),
            Err(error) => Err(ClientError::from(error)),
        };
        match &result {
            Ok(_) => tracing::debug!(request = %message_type, "Request succeeded"),
            Err(error) => {
                metrics::counter!("app.request.failed", "type" => message_type.as_str()).increment(1);
                tracing::warn!(request = %message_type, error = %error, "Request failed");
            },
        }
        wrap(result)
    }
}

impl EffectHandler for RequestEffects {
    type State = AppState;
    type Action = AppAction;
    type Environment = AppEnvironment;

    fn name(&self) -> &'static str {
        "request"
    }

    fn accepts(&self, action: &AppAction) -> bool {
        action.request_type().is_some()
    }

    fn handle(
        &self,
        action: &AppAction,
        state: &AppState,
        env: &AppEnvironment,
    ) -> SmallVec<[Effect<AppAction>; 4]> {
        let Some(message_type) = action.request_type() else {
            return SmallVec::new();
        };
        if let Some(rejection) = Self::forbidden(action, env.role) {
            tracing::debug!(action = action.name(), role = ?env.role, "Request not allowed");
            return smallvec![Effect::send(rejection)];
        }
        let Some(payload) = Self::payload(action, state) else {
            tracing::debug!(action = action.name(), "Request skipped");
            return SmallVec::new();
        };

        if let AppAction::GetSessionsSummary(range) = action {
            // Sequence is reduced before the request goes out
            let seq = self.summary_seq.fetch_add(1, Ordering::SeqCst) + 1;
            let range = *range;
            return smallvec![Effect::chain(vec![
                Effect::send(AppAction::SessionsSummaryRequested { seq, range }),
                request(env, message_type, payload, move |result| {
                    Some(AppAction::SessionsSummaryResponse { seq, result })
                }),
            ])];
        }

        smallvec![request(env, message_type, payload, move |result| respond(
            message_type,
            result
        ))]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{UserState, UsersState};
    use crate::types::{Credentials, SessionId};

    #[test]
    fn test_relogin_payload_requires_token() {
        let mut state = AppState::default();
        assert_eq!(RequestEffects::payload(&AppAction::Relogin, &state), None);

        state.user = Arc::new(UserState {
            login_token: Some("abc".to_string()),
            ..UserState::default()
        });
        assert_eq!(
            RequestEffects::payload(&AppAction::Relogin, &state),
            Some(json!({ "loginToken": "abc" }))
        );
    }

    #[test]
    fn test_only_admins_may_list_users() {
        let rejection = RequestEffects::forbidden(&AppAction::GetUsers, ClientRole::Viewer);
        let error = rejection.as_ref().and_then(AppAction::failure);
        assert!(matches!(rejection, Some(AppAction::UsersResponse(Err(_)))));
        assert_eq!(error.and_then(ClientError::code), Some(403));
        assert_eq!(error.map(ClientError::user_message).as_deref(), Some(USERS_ADMIN_ONLY));

        assert!(RequestEffects::forbidden(&AppAction::GetUsers, ClientRole::Admin).is_none());
        assert!(RequestEffects::forbidden(&AppAction::GetBookings, ClientRole::Viewer).is_none());
    }

    #[test]
    fn test_get_users_skipped_when_loaded() {
        let state = AppState {
            users: Arc::new(UsersState {
                loaded: true,
                ..UsersState::default()
            }),
            ..AppState::default()
        };
        assert_eq!(RequestEffects::payload(&AppAction::GetUsers, &state), None);
    }

    #[test]
    fn test_payload_shapes() {
        let state = AppState::default();

        assert_eq!(
            RequestEffects::payload(&AppAction::Login(Credentials::new("a@b.c", "pw")), &state),
            Some(json!({ "email": "a@b.c", "password": "pw" }))
        );
        assert_eq!(
            RequestEffects::payload(&AppAction::CancelSession { session_id: SessionId(9) }, &state),
            Some(json!({ "sessionId": 9 }))
        );
        assert_eq!(
            RequestEffects::payload(
                &AppAction::ChangePassword {
                    key: None,
                    password: "new".to_string()
                },
                &state
            ),
            Some(json!({ "password": "new" }))
        );
        assert_eq!(
            RequestEffects::payload(&AppAction::GetBookings, &state),
            Some(Value::Null)
        );
    }

    #[test]
    fn test_every_request_type_but_summary_has_a_response() {
        for message_type in MessageType::ALL {
            let response = respond(message_type, Ok(Value::Null));
            assert_eq!(
                response.is_none(),
                message_type == MessageType::GetSessionsSummary,
                "{message_type}"
            );
        }
    }
}
