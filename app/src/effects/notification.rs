//! Failures and informational actions → [`Notifier`](crate::environment::Notifier).

use std::sync::Arc;

use caption_client_core::effect::Effect;
use caption_client_core::handler::EffectHandler;
use caption_client_core::{SmallVec, async_effect, smallvec};

use crate::action::AppAction;
use crate::environment::{AppEnvironment, Notification};
use crate::error::MISSING_LOGIN_TOKEN;
use crate::state::AppState;

/// Shown after a password reset link was sent.
pub const RESET_LINK_SENT: &str =
    "we have sent you a password reset link, please check your email inbox";

/// Surfaces every failed response and every `Notify` to the user.
///
/// Authentication failures are acknowledged once the message was shown,
/// which returns the user slice to anonymous.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotificationEffects;

impl NotificationEffects {
    fn notification(action: &AppAction) -> Option<Notification> {
        match action {
            AppAction::Notify(message) => Some(Notification::info(message.clone())),
            AppAction::StartResetPasswordResponse(Ok(_)) => Some(Notification::info(RESET_LINK_SENT)),
            tokenless if tokenless.is_tokenless_login() => {
                Some(Notification::error(MISSING_LOGIN_TOKEN))
            },
            other => other
                .failure()
                .map(|error| Notification::error(error.user_message())),
        }
    }
}

impl EffectHandler for NotificationEffects {
    type State = AppState;
    type Action = AppAction;
    type Environment = AppEnvironment;

    fn name(&self) -> &'static str {
        "notification"
    }

    fn accepts(&self, action: &AppAction) -> bool {
        Self::notification(action).is_some()
    }

    fn handle(
        &self,
        action: &AppAction,
        _state: &AppState,
        env: &AppEnvironment,
    ) -> SmallVec<[Effect<AppAction>; 4]> {
        let Some(notification) = Self::notification(action) else {
            return SmallVec::new();
        };
        let notifier = Arc::clone(&env.notifier);
        let acknowledge = action.is_auth_failure();

        smallvec![async_effect! {
            metrics::counter!("app.notifications").increment(1);
            notifier.notify(notification);
            acknowledge.then_some(AppAction::AuthFailureAcknowledged)
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use serde_json::Value;

    #[test]
    fn test_failures_become_error_notifications() {
        let action = AppAction::BookingsResponse(Err(ClientError::Transport("down".to_string())));
        let notification = NotificationEffects::notification(&action).unwrap();
        assert_eq!(notification.kind, crate::environment::NotificationKind::Error);
    }

    #[test]
    fn test_successes_are_silent_except_reset_link() {
        assert!(NotificationEffects::notification(&AppAction::BookingsResponse(Ok(Value::Null))).is_none());
        assert_eq!(
            NotificationEffects::notification(&AppAction::StartResetPasswordResponse(Ok(Value::Null)))
                .map(|n| n.message),
            Some(RESET_LINK_SENT.to_string())
        );
    }

    #[test]
    fn test_tokenless_login_is_reported() {
        let action = AppAction::LogInResponse(Ok(serde_json::json!({})));
        let notification = NotificationEffects::notification(&action).unwrap();
        assert_eq!(notification.kind, crate::environment::NotificationKind::Error);
        assert_eq!(notification.message, MISSING_LOGIN_TOKEN);
        assert!(action.is_auth_failure());
    }
}
