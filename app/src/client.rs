//! Assembly of the caption client.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use caption_client_runtime::{Store, StoreError};
use caption_client_transport::{
    Connector, Correlator, TransportChannel, TransportError, WebSocketConnector,
};
use tokio::task::JoinHandle;

use crate::action::AppAction;
use crate::bridge::{spawn_connection_bridge, spawn_push_bridge};
use crate::config::ClientConfig;
use crate::effects;
use crate::environment::{AppEnvironment, AppStore, FileTokenStore, Navigator, Notifier, TokenStore};
use crate::reducers::root_reducer;
use crate::state::AppState;

/// User-facing collaborators of a client.
#[derive(Clone)]
pub struct Collaborators {
    /// Where notifications go
    pub notifier: Arc<dyn Notifier>,
    /// Who performs redirects
    pub navigator: Arc<dyn Navigator>,
    /// Where the login token lives
    pub tokens: Arc<dyn TokenStore>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// A wired caption client: transport, correlator, store, handlers and
/// bridges.
///
/// UI code talks to it through [`store`](Self::store) only (`dispatch` and
/// `select`).
pub struct CaptionClient {
    channel: TransportChannel,
    store: AppStore,
    bridges: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for CaptionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptionClient")
            .field("channel", &self.channel)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl CaptionClient {
    /// Wire a client over `connector`.
    ///
    /// Must be called inside a Tokio runtime. Nothing is connected until
    /// [`start`](Self::start).
    #[must_use]
    pub fn new(
        config: &ClientConfig,
        connector: Arc<dyn Connector>,
        collaborators: Collaborators,
    ) -> Self {
        let channel = TransportChannel::new(connector, config.channel_config());
        let correlator = Correlator::new(channel.clone(), config.correlator_config());

        let environment = AppEnvironment {
            correlator: Arc::new(correlator),
            notifier: collaborators.notifier,
            navigator: collaborators.navigator,
            tokens: collaborators.tokens,
            role: config.role,
        };

        let builder = Store::builder(AppState::default(), root_reducer(), environment)
            .with_config(config.store_config());
        let store = effects::register(builder).build();

        let bridges = vec![
            spawn_connection_bridge(&channel, store.clone()),
            spawn_push_bridge(&channel, store.clone()),
        ];

        tracing::info!(
            endpoint = %channel.endpoint(),
            role = ?config.role,
            "Caption client assembled"
        );

        Self {
            channel,
            store,
            bridges: Mutex::new(bridges),
        }
    }

    /// Wire a client over a WebSocket to `config.backend_url`, keeping the
    /// token in `config.token_path`.
    #[must_use]
    pub fn from_config(
        config: &ClientConfig,
        notifier: Arc<dyn Notifier>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self::new(
            config,
            Arc::new(WebSocketConnector::new(config.backend_url.clone())),
            Collaborators {
                notifier,
                navigator,
                tokens: Arc::new(FileTokenStore::new(config.token_path.clone())),
            },
        )
    }

    /// Connect and replay the stored session.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the first connection fails. The
    /// session is restored either way once a connection comes up.
    pub async fn start(&self) -> Result<(), TransportError> {
        let connected = self.channel.connect().await;
        if let Err(error) = &connected {
            tracing::warn!(error = %error, "Initial connection failed");
        }
        if let Err(error) = self.store.dispatch(AppAction::RestoreSession) {
            tracing::error!(error = %error, "Could not restore the session");
        }
        connected
    }

    /// The store.
    #[must_use]
    pub const fn store(&self) -> &AppStore {
        &self.store
    }

    /// The transport channel.
    #[must_use]
    pub const fn channel(&self) -> &TransportChannel {
        &self.channel
    }

    /// Dispatch an action.
    ///
    /// # Errors
    ///
    /// See [`Store::dispatch`].
    pub fn dispatch(&self, action: AppAction) -> Result<(), StoreError> {
        self.store.dispatch(action)
    }

    /// Stop handlers and bridges and close the connection.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownTimeout`] if effects were still running
    /// after `timeout`. Everything is stopped either way.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
        let result = self.store.shutdown(timeout).await;
        self.stop_bridges();
        self.channel.close();
        result
    }

    fn stop_bridges(&self) {
        for bridge in self
            .bridges
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
        {
            bridge.abort();
        }
    }
}

impl Drop for CaptionClient {
    fn drop(&mut self) {
        self.stop_bridges();
    }
}
