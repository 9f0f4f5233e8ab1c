//! Reducer composition utilities
//!
//! - **`combine_reducers`**: Run several reducers over the same root state
//! - **`scope_reducer`**: Focus a slice reducer on one field of the root state
//!
//! A root reducer is normally built by scoping one reducer per slice and
//! combining the results:
//!
//! ```
//! use std::sync::Arc;
//! use caption_client_core::composition::{combine_reducers, scope_reducer};
//! use caption_client_core::{slice, Reducer, StateInvariantViolation};
//!
//! #[derive(Clone, Default)]
//! struct Root {
//!     clicks: Arc<u32>,
//!     label: Arc<String>,
//! }
//!
//! enum Action {
//!     Click,
//!     Rename(String),
//! }
//!
//! struct Clicks;
//! impl Reducer for Clicks {
//!     type State = Arc<u32>;
//!     type Action = Action;
//!     fn reduce(&self, s: &mut Arc<u32>, a: &Action) -> Result<(), StateInvariantViolation> {
//!         if let Action::Click = a {
//!             slice::update(s, |n| *n += 1);
//!         }
//!         Ok(())
//!     }
//! }
//!
//! struct Label;
//! impl Reducer for Label {
//!     type State = Arc<String>;
//!     type Action = Action;
//!     fn reduce(&self, s: &mut Arc<String>, a: &Action) -> Result<(), StateInvariantViolation> {
//!         if let Action::Rename(name) = a {
//!             slice::replace(s, name.clone());
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let root = combine_reducers(vec![
//!     Box::new(scope_reducer(Clicks, |r: &Root| &r.clicks, |r: &mut Root, s| r.clicks = s)),
//!     Box::new(scope_reducer(Label, |r: &Root| &r.label, |r: &mut Root, s| r.label = s)),
//! ]);
//!
//! let mut state = Root::default();
//! let label_before = Arc::clone(&state.label);
//! root.reduce(&mut state, &Action::Click).ok();
//! assert_eq!(*state.clicks, 1);
//! assert!(Arc::ptr_eq(&label_before, &state.label));
//! ```

use crate::error::StateInvariantViolation;
use crate::reducer::Reducer;

/// Boxed reducer that can be shared with the runtime.
pub type BoxedReducer<S, A> = Box<dyn Reducer<State = S, Action = A> + Send + Sync>;

/// Combines multiple reducers that operate on the same state and action types.
///
/// Each reducer runs in registration order. The first invariant violation
/// stops the chain; the caller is expected to discard the partially reduced
/// state.
#[must_use]
pub fn combine_reducers<S, A>(reducers: Vec<BoxedReducer<S, A>>) -> CombinedReducer<S, A>
where
    S: 'static,
    A: 'static,
{
    CombinedReducer { reducers }
}

/// A combined reducer that runs multiple reducers in sequence.
///
/// Created by [`combine_reducers`].
pub struct CombinedReducer<S, A>
where
    S: 'static,
    A: 'static,
{
    reducers: Vec<BoxedReducer<S, A>>,
}

impl<S, A> CombinedReducer<S, A>
where
    S: 'static,
    A: 'static,
{
    /// Number of combined reducers
    #[must_use]
    pub fn len(&self) -> usize {
        self.reducers.len()
    }

    /// Whether no reducers were registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reducers.is_empty()
    }
}

impl<S, A> Reducer for CombinedReducer<S, A>
where
    S: 'static,
    A: 'static,
{
    type State = S;
    type Action = A;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: &Self::Action,
    ) -> Result<(), StateInvariantViolation> {
        for reducer in &self.reducers {
            reducer.reduce(state, action)?;
        }
        Ok(())
    }
}

/// Scopes a reducer to operate on one field of a larger state.
///
/// The sub-state is cloned out, reduced and written back. With `Arc` slices
/// the clone is a reference bump, and an untouched slice is written back as
/// the identical reference.
pub fn scope_reducer<S, SubS, A, R>(
    reducer: R,
    get_state: fn(&S) -> &SubS,
    set_state: fn(&mut S, SubS),
) -> ScopedReducer<S, SubS, A, R>
where
    S: 'static,
    SubS: Clone + 'static,
    A: 'static,
    R: Reducer<State = SubS, Action = A>,
{
    ScopedReducer {
        reducer,
        get_state,
        set_state,
        _phantom: std::marker::PhantomData,
    }
}

/// A scoped reducer that operates on a subset of state.
///
/// Created by [`scope_reducer`].
pub struct ScopedReducer<S, SubS, A, R>
where
    S: 'static,
    SubS: Clone + 'static,
    A: 'static,
    R: Reducer<State = SubS, Action = A>,
{
    reducer: R,
    get_state: fn(&S) -> &SubS,
    set_state: fn(&mut S, SubS),
    _phantom: std::marker::PhantomData<fn(&A)>,
}

impl<S, SubS, A, R> Reducer for ScopedReducer<S, SubS, A, R>
where
    S: 'static,
    SubS: Clone + 'static,
    A: 'static,
    R: Reducer<State = SubS, Action = A>,
{
    type State = S;
    type Action = A;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: &Self::Action,
    ) -> Result<(), StateInvariantViolation> {
        let mut sub_state = (self.get_state)(state).clone();
        self.reducer.reduce(&mut sub_state, action)?;
        (self.set_state)(state, sub_state);
        Ok(())
    }
}
