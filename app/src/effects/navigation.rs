//! `Navigate` actions → [`Navigator`](crate::environment::Navigator).

use std::sync::Arc;

use caption_client_core::effect::Effect;
use caption_client_core::handler::EffectHandler;
use caption_client_core::{SmallVec, async_effect, smallvec};

use crate::action::AppAction;
use crate::environment::AppEnvironment;
use crate::state::AppState;

/// Performs redirects. A redirect to the path already shown is dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct NavigationEffects;

impl EffectHandler for NavigationEffects {
    type State = AppState;
    type Action = AppAction;
    type Environment = AppEnvironment;

    fn name(&self) -> &'static str {
        "navigation"
    }

    fn accepts(&self, action: &AppAction) -> bool {
        matches!(action, AppAction::Navigate(_))
    }

    fn handle(
        &self,
        action: &AppAction,
        _state: &AppState,
        env: &AppEnvironment,
    ) -> SmallVec<[Effect<AppAction>; 4]> {
        let AppAction::Navigate(path) = action else {
            return SmallVec::new();
        };
        let navigator = Arc::clone(&env.navigator);
        let path = path.clone();

        smallvec![async_effect! {
            if navigator.current_path() == path {
                tracing::debug!(path = %path, "Already there, redirect skipped");
            } else {
                navigator.navigate(&path);
            }
            None
        }]
    }
}
