//! # Caption Client Runtime
//!
//! Runtime pieces of the caption client's state core:
//!
//! - [`ActionBus`](bus::ActionBus): synchronous, lossless, filtered action
//!   broadcast
//! - [`Store`](store::Store): the single state container; reduces actions,
//!   exposes selectors and drives registered effect handlers
//! - [`metrics`]: metric names and an optional Prometheus exporter
//!
//! ## Example
//!
//! ```ignore
//! let store = Store::builder(AppState::default(), Box::new(root_reducer()), env)
//!     .with_effect(RequestEffects)
//!     .with_effect(NotificationEffects)
//!     .build();
//!
//! store.dispatch(AppAction::Relogin)?;
//! let mut user = store.select(|s| Arc::clone(&s.user));
//! while let Some(user) = user.next().await {
//!     println!("logged: {}", user.logged);
//! }
//! ```

pub mod bus;
pub mod metrics;
pub mod store;

/// Error types for the Store runtime
pub mod error {
    use caption_client_core::StateInvariantViolation;
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum StoreError {
        /// `dispatch` was called while this store was already dispatching on
        /// the same thread (from a reducer or a bus predicate)
        #[error("Reentrant dispatch is not allowed")]
        ReentrantDispatch,

        /// A reducer rejected the action (strict mode only)
        #[error(transparent)]
        InvariantViolation(#[from] StateInvariantViolation),

        /// Store is shutting down and not accepting new actions
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Shutdown timed out waiting for effects to complete
        #[error("Shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),

        /// Timeout waiting for a matching action
        #[error("Timeout waiting for action")]
        Timeout,

        /// The action bus went away while waiting
        #[error("Action bus closed")]
        ChannelClosed,
    }
}

pub use bus::{ActionBus, Subscription};
pub use error::StoreError;
pub use store::{Selection, SharedHandler, Store, StoreBuilder, StoreConfig};
