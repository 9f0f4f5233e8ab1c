//! Login token persistence through [`TokenStore`](crate::environment::TokenStore).

use std::sync::Arc;

use caption_client_core::effect::Effect;
use caption_client_core::handler::EffectHandler;
use caption_client_core::{SmallVec, async_effect, smallvec};
use serde_json::Value;

use crate::action::AppAction;
use crate::environment::AppEnvironment;
use crate::state::AppState;

/// What to do with the stored token.
#[derive(Debug, Clone, PartialEq, Eq)]
enum TokenOp {
    Load,
    Save(String),
    Clear,
}

/// Loads the token at startup, saves it after a successful login and
/// clears it when the session ends or is rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenEffects;

impl TokenEffects {
    fn operation(action: &AppAction, state: &AppState) -> Option<TokenOp> {
        match action {
            AppAction::RestoreSession => Some(TokenOp::Load),
            other if other.is_auth_failure() && !state.user.is_authenticated() => {
                Some(TokenOp::Clear)
            },
            AppAction::LogInResponse(Ok(data))
            | AppAction::ReLogInResponse(Ok(data))
            | AppAction::NewUserResponse(Ok(data))
                if state.user.is_authenticated() =>
            {
                data.get("loginToken")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .or_else(|| state.user.login_token.clone())
                    .map(TokenOp::Save)
            },
            AppAction::Logout | AppAction::SessionReset => Some(TokenOp::Clear),
            _ => None,
        }
    }
}

impl EffectHandler for TokenEffects {
    type State = AppState;
    type Action = AppAction;
    type Environment = AppEnvironment;

    fn name(&self) -> &'static str {
        "token"
    }

    fn accepts(&self, action: &AppAction) -> bool {
        matches!(
            action,
            AppAction::RestoreSession
                | AppAction::LogInResponse(_)
                | AppAction::ReLogInResponse(_)
                | AppAction::NewUserResponse(_)
                | AppAction::Logout
                | AppAction::SessionReset
        )
    }

    fn handle(
        &self,
        action: &AppAction,
        state: &AppState,
        env: &AppEnvironment,
    ) -> SmallVec<[Effect<AppAction>; 4]> {
        let Some(operation) = Self::operation(action, state) else {
            return SmallVec::new();
        };
        let tokens = Arc::clone(&env.tokens);

        let effect = match operation {
            TokenOp::Load => async_effect! {
                let token = tokens.load().await.unwrap_or_else(|error| {
                    tracing::warn!(error = %error, "Could not load the stored token");
                    None
                });
                tracing::debug!(found = token.is_some(), "Stored token loaded");
                Some(AppAction::TokenLoaded(token))
            },
            TokenOp::Save(token) => async_effect! {
                if let Err(error) = tokens.save(&token).await {
                    tracing::warn!(error = %error, "Could not persist the login token");
                }
                None
            },
            TokenOp::Clear => async_effect! {
                if let Err(error) = tokens.clear().await {
                    tracing::warn!(error = %error, "Could not clear the login token");
                }
                None
            },
        };
        smallvec![effect]
    }
}
