//! Tasks feeding transport events into the store.
//!
//! - connection state changes become [`AppAction::ConnectionChanged`]
//! - uncorrelated inbound frames become [`AppAction::ServerPush`]
//!
//! Both subscribe before they are spawned, so nothing that happens after
//! the call returns is missed.

use caption_client_runtime::StoreError;
use caption_client_transport::{ConnectionState, TransportChannel};
use futures::StreamExt;
use tokio::task::JoinHandle;

use crate::action::{AppAction, ConnectionStatus};
use crate::environment::AppStore;

impl From<ConnectionState> for ConnectionStatus {
    fn from(state: ConnectionState) -> Self {
        match state {
            ConnectionState::Disconnected => Self::Offline,
            ConnectionState::Connecting => Self::Connecting,
            ConnectionState::Connected => Self::Online,
        }
    }
}

/// Whether the bridge should keep running after a dispatch result.
fn keep_running(result: Result<(), StoreError>, bridge: &'static str) -> bool {
    match result {
        Ok(()) => true,
        Err(StoreError::ShutdownInProgress) => {
            tracing::debug!(bridge, "Store shut down, bridge stopping");
            false
        },
        Err(error) => {
            tracing::warn!(bridge, error = %error, "Bridged action rejected");
            true
        },
    }
}

/// Mirror the channel's connection state into the `connection` slice.
#[must_use]
pub fn spawn_connection_bridge(channel: &TransportChannel, store: AppStore) -> JoinHandle<()> {
    let mut states = channel.watch_state();
    tokio::spawn(async move {
        loop {
            let status = ConnectionStatus::from(*states.borrow_and_update());
            if !keep_running(store.dispatch(AppAction::ConnectionChanged(status)), "connection") {
                break;
            }
            if states.changed().await.is_err() {
                break;
            }
        }
    })
}

/// Turn frames without a correlation id into `ServerPush` actions.
#[must_use]
pub fn spawn_push_bridge(channel: &TransportChannel, store: AppStore) -> JoinHandle<()> {
    let mut frames = channel.subscribe();
    tokio::spawn(async move {
        while let Some(frame) = frames.next().await {
            if frame.correlation_id.is_some() {
                continue;
            }
            tracing::debug!(message_type = %frame.message_type, "Server push");
            let push = AppAction::ServerPush {
                message_type: frame.message_type,
                data: frame.data,
            };
            if !keep_running(store.dispatch(push), "push") {
                break;
            }
        }
    })
}
