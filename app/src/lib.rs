//! # Caption Client
//!
//! The messaging-and-state core of the caption booking client: domain
//! actions, state slices and their reducers, effect handlers talking to the
//! backend over one correlated WebSocket, and the collaborators they use.
//!
//! ## Flow
//!
//! ```text
//! UI ──dispatch──► Store ──reduce──► AppState ──select──► UI
//!                    │
//!                    └─publish─► RequestEffects ──request──► Correlator ─► socket
//!                                     ▲                            │
//!                                     └──── *Response action ◄─────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! let config = ClientConfig::from_env();
//! let client = CaptionClient::from_config(&config, Arc::new(LogNotifier), Arc::new(LogNavigator::default()));
//! client.start().await?;
//!
//! client.dispatch(AppAction::Login(Credentials::new("ada@example.com", "secret")))?;
//! let mut user = client.store().select(selectors::user);
//! while let Some(user) = user.next().await {
//!     if user.logged { break; }
//! }
//! ```

pub mod action;
pub mod bridge;
pub mod client;
pub mod config;
pub mod effects;
pub mod environment;
pub mod error;
pub mod reducers;
pub mod state;
pub mod types;

pub use action::{AppAction, ConnectionStatus};
pub use client::{CaptionClient, Collaborators};
pub use config::{ClientConfig, ClientRole};
pub use environment::{AppEnvironment, AppStore, Navigator, Notification, Notifier, TokenStore};
pub use error::{ApiResult, ClientError};
pub use reducers::root_reducer;
pub use state::{AppState, AuthStatus, selectors};
