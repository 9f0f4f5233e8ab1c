//! Pure follow-ups: actions that only produce further actions.

use caption_client_core::effect::Effect;
use caption_client_core::handler::EffectHandler;
use caption_client_core::{SmallVec, smallvec};

use crate::action::{AppAction, ConnectionStatus};
use crate::environment::AppEnvironment;
use crate::state::AppState;

/// Where rejected sessions and completed flows land.
pub const HOME: &str = "/";

/// Server push type that ends the session.
const LOGOUT_PUSH: &str = "logOut";

/// Chains actions together without touching the outside world:
///
/// | after | dispatch |
/// |---|---|
/// | successful login, re-login, user update (while authenticated) | `GetUserSettings` |
/// | successful registration | `GetUserSettings`, `Navigate("/")` |
/// | rejected re-login, password changed | `Navigate("/")` |
/// | booking or session changed | `GetBookings` (+ current sessions summary) |
/// | `ReloadUsers` | `GetUsers` |
/// | `TokenLoaded` | `Relogin` |
/// | `Relogin` without token while logged out | `Navigate("/")` |
/// | back online after a reconnect, with a token | `Relogin` |
/// | `logOut` push | `SessionReset` |
#[derive(Debug, Clone, Copy, Default)]
pub struct FollowUpEffects;

impl FollowUpEffects {
    fn follow_ups(action: &AppAction, state: &AppState) -> SmallVec<[AppAction; 4]> {
        match action {
            // Replies the user slice rejected or dropped lead nowhere
            AppAction::LogInResponse(Ok(_))
            | AppAction::ReLogInResponse(Ok(_))
            | AppAction::UpdateUserResponse(Ok(_))
            | AppAction::NewUserResponse(Ok(_))
                if !state.user.is_authenticated() =>
            {
                SmallVec::new()
            },
            AppAction::LogInResponse(Ok(_))
            | AppAction::ReLogInResponse(Ok(_))
            | AppAction::UpdateUserResponse(Ok(_)) => smallvec![AppAction::GetUserSettings],
            AppAction::NewUserResponse(Ok(_)) => {
                smallvec![AppAction::GetUserSettings, AppAction::Navigate(HOME.to_string())]
            },
            AppAction::ReLogInResponse(Err(_)) | AppAction::ChangePasswordResponse(Ok(_)) => {
                smallvec![AppAction::Navigate(HOME.to_string())]
            },
            AppAction::UpdateBookingResponse(Ok(_))
            | AppAction::AddSessionResponse(Ok(_))
            | AppAction::UpdateSessionResponse(Ok(_))
            | AppAction::CancelSessionResponse(Ok(_)) => {
                let mut next = smallvec![AppAction::GetBookings];
                if let Some(range) = state.sessions.range {
                    next.push(AppAction::GetSessionsSummary(range));
                }
                next
            },
            AppAction::ReloadUsers => smallvec![AppAction::GetUsers],
            AppAction::TokenLoaded(_) => smallvec![AppAction::Relogin],
            AppAction::Relogin if state.user.login_token.is_none() && !state.user.logged => {
                smallvec![AppAction::Navigate(HOME.to_string())]
            },
            AppAction::ConnectionChanged(ConnectionStatus::Online)
                if state.connection.connects > 1 && state.user.login_token.is_some() =>
            {
                tracing::info!("Reconnected, replaying re-login");
                smallvec![AppAction::Relogin]
            },
            AppAction::ServerPush { message_type, .. } if message_type == LOGOUT_PUSH => {
                smallvec![AppAction::SessionReset]
            },
            _ => SmallVec::new(),
        }
    }
}

impl EffectHandler for FollowUpEffects {
    type State = AppState;
    type Action = AppAction;
    type Environment = AppEnvironment;

    fn name(&self) -> &'static str {
        "follow_up"
    }

    fn accepts(&self, action: &AppAction) -> bool {
        matches!(
            action,
            AppAction::LogInResponse(Ok(_))
                | AppAction::ReLogInResponse(_)
                | AppAction::UpdateUserResponse(Ok(_))
                | AppAction::NewUserResponse(Ok(_))
                | AppAction::ChangePasswordResponse(Ok(_))
                | AppAction::UpdateBookingResponse(Ok(_))
                | AppAction::AddSessionResponse(Ok(_))
                | AppAction::UpdateSessionResponse(Ok(_))
                | AppAction::CancelSessionResponse(Ok(_))
                | AppAction::ReloadUsers
                | AppAction::TokenLoaded(_)
                | AppAction::Relogin
                | AppAction::ConnectionChanged(ConnectionStatus::Online)
                | AppAction::ServerPush { .. }
        )
    }

    fn handle(
        &self,
        action: &AppAction,
        state: &AppState,
        _env: &AppEnvironment,
    ) -> SmallVec<[Effect<AppAction>; 4]> {
        let next = Self::follow_ups(action, state);
        if next.is_empty() {
            return SmallVec::new();
        }
        tracing::debug!(
            after = action.name(),
            next = ?next.iter().map(AppAction::name).collect::<Vec<_>>(),
            "Follow-up actions"
        );
        // Dispatched in order
        smallvec![Effect::chain(next.into_iter().map(Effect::send).collect())]
    }
}
