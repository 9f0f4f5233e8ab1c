//! # Caption Client Core
//!
//! Core traits and types for the caption client's messaging-and-state core.
//!
//! The client keeps its canonical state as a tree of named slices. Slices are
//! replaced, never mutated in place, by pure reducers. Anything that touches
//! the outside world (socket requests, navigation, notifications, token
//! persistence) lives in effect handlers, which turn actions into
//! [`Effect`](effect::Effect) descriptions executed by the runtime.
//!
//! ## Core Concepts
//!
//! - **State**: a root struct whose fields are `Arc`-wrapped slices
//! - **Action**: immutable, structurally compared input to reducers and handlers
//! - **Reducer**: pure function `(&mut State, &Action) → Result<(), StateInvariantViolation>`
//! - **Effect Handler**: `(Action, State, Environment) → Effects`
//! - **Effect**: side effect description, executed by the runtime
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use caption_client_core::{slice, Reducer, StateInvariantViolation};
//!
//! #[derive(Clone, Default)]
//! struct Counter { count: u32 }
//!
//! enum CounterAction { Increment, Unrelated }
//!
//! struct CounterReducer;
//!
//! impl Reducer for CounterReducer {
//!     type State = Arc<Counter>;
//!     type Action = CounterAction;
//!
//!     fn reduce(
//!         &self,
//!         state: &mut Self::State,
//!         action: &Self::Action,
//!     ) -> Result<(), StateInvariantViolation> {
//!         if let CounterAction::Increment = action {
//!             slice::update(state, |c| c.count += 1);
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let before = Arc::new(Counter::default());
//! let mut state = Arc::clone(&before);
//! CounterReducer.reduce(&mut state, &CounterAction::Unrelated).ok();
//! assert!(Arc::ptr_eq(&before, &state));
//! CounterReducer.reduce(&mut state, &CounterAction::Increment).ok();
//! assert_eq!(state.count, 1);
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use smallvec::{SmallVec, smallvec};

pub mod composition;
mod effect_macros;

/// Error types shared by reducers and the runtime.
pub mod error {
    use thiserror::Error;

    /// A reducer received an action whose shape it cannot apply.
    ///
    /// The runtime treats this as fatal in strict mode and as a logged no-op
    /// otherwise. In both cases the slice is left untouched.
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    #[error("invariant violated in slice `{slice}`: {reason}")]
    pub struct StateInvariantViolation {
        /// Name of the slice whose reducer rejected the action
        pub slice: &'static str,
        /// Human readable reason
        pub reason: String,
    }

    impl StateInvariantViolation {
        /// Create a new violation for the given slice.
        #[must_use]
        pub fn new(slice: &'static str, reason: impl Into<String>) -> Self {
            Self {
                slice,
                reason: reason.into(),
            }
        }
    }
}

/// Reducer module - pure state transitions
///
/// Reducers are pure functions: `(State, Action) → State`. They never perform
/// I/O and can not dispatch further actions. An action a reducer does not
/// recognise must leave its state untouched, which for `Arc` slices means
/// keeping the very same reference.
pub mod reducer {
    use super::error::StateInvariantViolation;

    /// The Reducer trait - the only way state changes
    ///
    /// # Type Parameters
    ///
    /// - `State`: The state this reducer owns (usually an `Arc` slice)
    /// - `Action`: The action type this reducer processes
    ///
    /// # Example
    ///
    /// ```ignore
    /// impl Reducer for UserReducer {
    ///     type State = Arc<UserState>;
    ///     type Action = AppAction;
    ///
    ///     fn reduce(&self, state: &mut Arc<UserState>, action: &AppAction)
    ///         -> Result<(), StateInvariantViolation>
    ///     {
    ///         match action {
    ///             AppAction::Logout => slice::reset(state),
    ///             _ => {}
    ///         }
    ///         Ok(())
    ///     }
    /// }
    /// ```
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// Apply an action to the state
        ///
        /// # Errors
        ///
        /// Returns [`StateInvariantViolation`] when the action is malformed for
        /// this slice. Callers must discard any partial changes.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: &Self::Action,
        ) -> Result<(), StateInvariantViolation>;
    }

    impl<R> Reducer for Box<R>
    where
        R: Reducer + ?Sized,
    {
        type State = R::State;
        type Action = R::Action;

        fn reduce(
            &self,
            state: &mut Self::State,
            action: &Self::Action,
        ) -> Result<(), StateInvariantViolation> {
            (**self).reduce(state, action)
        }
    }
}

/// Helpers for copy-on-write `Arc` slices
///
/// Every helper installs a fresh `Arc`, so observers comparing references
/// always notice the change, even if the previous snapshot was the only owner.
pub mod slice {
    use std::sync::Arc;

    /// Clone the slice, apply `f` and install the result as a new reference.
    pub fn update<T: Clone>(slice: &mut Arc<T>, f: impl FnOnce(&mut T)) {
        let mut next = T::clone(slice);
        f(&mut next);
        *slice = Arc::new(next);
    }

    /// Replace the slice wholesale.
    pub fn replace<T>(slice: &mut Arc<T>, value: T) {
        *slice = Arc::new(value);
    }

    /// Reset the slice to its fresh (default) value.
    pub fn reset<T: Default>(slice: &mut Arc<T>) {
        replace(slice, T::default());
    }
}

/// Effect module - Side effect descriptions
///
/// Effects describe side effects to be performed by the runtime.
/// They are values (not execution) and are composable.
pub mod effect {
    use std::future::Future;
    use std::pin::Pin;
    use std::time::Duration;

    /// Effect type - describes a side effect to be executed
    ///
    /// Effects are NOT executed immediately. They are returned from effect
    /// handlers and executed by the store runtime. Any action they produce is
    /// dispatched back into the store.
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Run effects in parallel
        Parallel(Vec<Effect<Action>>),

        /// Run effects sequentially
        Sequential(Vec<Effect<Action>>),

        /// Delayed action
        Delay {
            /// How long to wait
            duration: Duration,
            /// Action to dispatch after delay
            action: Box<Action>,
        },

        /// Arbitrary async computation
        ///
        /// Returns `Option<Action>` - if Some, the action is dispatched back
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),
    }

    // Manual Debug implementation since Future doesn't implement Debug
    impl<Action> std::fmt::Debug for Effect<Action>
    where
        Action: std::fmt::Debug,
    {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Effect::None => write!(f, "Effect::None"),
                Effect::Parallel(effects) => {
                    f.debug_tuple("Effect::Parallel").field(effects).finish()
                },
                Effect::Sequential(effects) => {
                    f.debug_tuple("Effect::Sequential").field(effects).finish()
                },
                Effect::Delay { duration, action } => f
                    .debug_struct("Effect::Delay")
                    .field("duration", duration)
                    .field("action", action)
                    .finish(),
                Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Combine effects to run in parallel
        #[must_use]
        pub const fn merge(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Parallel(effects)
        }

        /// Chain effects to run sequentially
        #[must_use]
        pub const fn chain(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Sequential(effects)
        }

        /// Immediately dispatch `action` (no I/O).
        #[must_use]
        pub fn send(action: Action) -> Effect<Action>
        where
            Action: Send + 'static,
        {
            Effect::Future(Box::pin(async move { Some(action) }))
        }

        /// Whether this effect does nothing at all.
        #[must_use]
        pub fn is_none(&self) -> bool {
            match self {
                Effect::None => true,
                Effect::Parallel(effects) | Effect::Sequential(effects) => {
                    effects.iter().all(Effect::is_none)
                },
                Effect::Delay { .. } | Effect::Future(_) => false,
            }
        }
    }
}

/// Effect handler module - bridges actions to the outside world
pub mod handler {
    use super::SmallVec;
    use super::effect::Effect;

    /// An effect handler reacts to dispatched actions after they were reduced.
    ///
    /// The runtime subscribes each registered handler to reduced actions with
    /// [`accepts`](EffectHandler::accepts) as the filter and calls
    /// [`handle`](EffectHandler::handle) exactly once per matching action.
    /// A handler performs one kind of externally visible operation and may
    /// produce follow-up actions through the returned effects.
    pub trait EffectHandler: Send + Sync {
        /// Root state type (read-only for handlers)
        type State;

        /// The action type this handler reacts to
        type Action;

        /// Injected dependencies
        type Environment;

        /// Stable name used in logs and metrics
        fn name(&self) -> &'static str;

        /// Whether this handler wants to see `action`
        fn accepts(&self, action: &Self::Action) -> bool;

        /// Turn an accepted action into effects
        ///
        /// `state` is the snapshot produced by reducing `action`. Later
        /// dispatches are not visible in it, even if they were already
        /// reduced by the time the handler runs.
        fn handle(
            &self,
            action: &Self::Action,
            state: &Self::State,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Environment module - Dependency injection traits
///
/// All external dependencies are abstracted behind traits and injected via
/// the effect handler environment.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall clock
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

pub use effect::Effect;
pub use error::StateInvariantViolation;
pub use handler::EffectHandler;
pub use reducer::Reducer;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Clone, Debug, Default, PartialEq)]
    struct Profile {
        name: String,
    }

    #[test]
    fn update_always_installs_new_reference() {
        let mut profile = Arc::new(Profile::default());
        let before = Arc::as_ptr(&profile);

        // Sole owner: make_mut would mutate in place, update must not.
        slice::update(&mut profile, |p| p.name = "ada".to_string());

        assert_ne!(before, Arc::as_ptr(&profile));
        assert_eq!(profile.name, "ada");
    }

    #[test]
    fn reset_restores_default() {
        let mut profile = Arc::new(Profile {
            name: "ada".to_string(),
        });
        slice::reset(&mut profile);
        assert_eq!(*profile, Profile::default());
    }

    #[test]
    fn send_effect_is_not_none() {
        let effect = Effect::send(1_u8);
        assert!(!effect.is_none());
        assert!(Effect::<u8>::merge(vec![Effect::None, Effect::None]).is_none());
    }

    #[tokio::test]
    async fn send_effect_yields_action() {
        let Effect::Future(fut) = Effect::send(7_u8) else {
            unreachable!("send builds a future effect");
        };
        assert_eq!(fut.await, Some(7));
    }

    #[test]
    fn violation_display_names_slice() {
        let err = StateInvariantViolation::new("user", "missing token");
        assert_eq!(
            err.to_string(),
            "invariant violated in slice `user`: missing token"
        );
    }
}
