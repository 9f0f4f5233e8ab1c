//! Effect handlers of the caption client.
//!
//! Each handler reacts to a subset of actions and performs one kind of
//! externally visible work. [`register`] installs all of them on a store
//! builder.

mod follow_up;
mod navigation;
mod notification;
mod request;
mod token;

use caption_client_runtime::StoreBuilder;

use crate::action::AppAction;
use crate::environment::AppEnvironment;
use crate::state::AppState;

pub use follow_up::{FollowUpEffects, HOME};
pub use navigation::NavigationEffects;
pub use notification::{NotificationEffects, RESET_LINK_SENT};
pub use request::RequestEffects;
pub use token::TokenEffects;

/// Register every handler of the client on `builder`.
#[must_use]
pub fn register(
    builder: StoreBuilder<AppState, AppAction, AppEnvironment>,
) -> StoreBuilder<AppState, AppAction, AppEnvironment> {
    builder
        .with_effect(RequestEffects::new())
        .with_effect(NotificationEffects)
        .with_effect(NavigationEffects)
        .with_effect(TokenEffects)
        .with_effect(FollowUpEffects)
}
