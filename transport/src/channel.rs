//! The transport channel: one persistent connection to the backend.
//!
//! # Architecture
//!
//! ```text
//!   send(frame) ──► outbound queue ──► writer task ──► Connection::sink
//!                                                             │
//!   subscribe() ◄── broadcast ◄── reader task ◄── Connection::stream
//!                                     │
//!                      lost(generation) ──► supervisor ──► backoff + connect()
//! ```
//!
//! - `send` fails fast with [`TransportError::NotConnected`] while no
//!   connection is installed; nothing is queued across reconnects.
//! - Inbound frames are multicast to every subscriber.
//! - Each installed connection carries a generation number so a late loss
//!   signal from an old connection never tears down a newer one.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use futures::{SinkExt, Stream, StreamExt};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

use crate::connector::{Connection, Connector};
use crate::error::TransportError;
use crate::frame::Frame;
use crate::reconnect::ReconnectPolicy;

/// Observable connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No connection and none being opened
    #[default]
    Disconnected,
    /// A connection attempt is in progress
    Connecting,
    /// Frames can be sent
    Connected,
}

impl ConnectionState {
    /// Whether frames can currently be sent.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// Lazy, infinite stream of inbound frames.
pub type InboundFrames = Pin<Box<dyn Stream<Item = Frame> + Send>>;

/// Channel configuration.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Backoff used after the connection drops
    pub reconnect: ReconnectPolicy,
    /// Reconnect automatically after a loss
    pub auto_reconnect: bool,
    /// Per-subscriber buffer for inbound frames
    pub inbound_capacity: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            reconnect: ReconnectPolicy::default(),
            auto_reconnect: true,
            inbound_capacity: 1024,
        }
    }
}

impl ChannelConfig {
    /// Set the reconnect policy.
    #[must_use]
    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Enable or disable automatic reconnection.
    #[must_use]
    pub const fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Set the per-subscriber inbound buffer.
    #[must_use]
    pub const fn with_inbound_capacity(mut self, capacity: usize) -> Self {
        self.inbound_capacity = capacity;
        self
    }
}

/// The live connection and its I/O tasks.
struct Link {
    generation: u64,
    outbound: mpsc::UnboundedSender<Frame>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Link {
    fn abort(self) {
        self.reader.abort();
        self.writer.abort();
    }
}

struct Inner {
    connector: Arc<dyn Connector>,
    config: ChannelConfig,
    state: watch::Sender<ConnectionState>,
    inbound: broadcast::Sender<Frame>,
    link: Mutex<Option<Link>>,
    connect_lock: tokio::sync::Mutex<()>,
    generation: AtomicU64,
    lost_tx: mpsc::UnboundedSender<u64>,
    lost_rx: Mutex<Option<mpsc::UnboundedReceiver<u64>>>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

/// Owns the single connection to the backend.
///
/// Cheap to clone; clones share the same connection.
#[derive(Clone)]
pub struct TransportChannel {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for TransportChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportChannel")
            .field("endpoint", &self.inner.connector.endpoint())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl TransportChannel {
    /// Create a channel; no connection is opened until [`connect`](Self::connect).
    #[must_use]
    pub fn new(connector: Arc<dyn Connector>, config: ChannelConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (inbound, _) = broadcast::channel(config.inbound_capacity.max(1));
        let (lost_tx, lost_rx) = mpsc::unbounded_channel();

        Self {
            inner: Arc::new(Inner {
                connector,
                config,
                state,
                inbound,
                link: Mutex::new(None),
                connect_lock: tokio::sync::Mutex::new(()),
                generation: AtomicU64::new(0),
                lost_tx,
                lost_rx: Mutex::new(Some(lost_rx)),
                supervisor: Mutex::new(None),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Endpoint this channel talks to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        self.inner.connector.endpoint()
    }

    /// Establish the connection.
    ///
    /// Idempotent: returns immediately when already connected, and waits for
    /// an in-flight attempt instead of starting a second one.
    ///
    /// # Errors
    ///
    /// - [`TransportError::ConnectFailed`] if the endpoint can not be reached
    /// - [`TransportError::Closed`] after [`close`](Self::close)
    #[tracing::instrument(skip(self), fields(endpoint = %self.endpoint()))]
    pub async fn connect(&self) -> Result<(), TransportError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        self.ensure_supervisor();
        self.inner.connect_once().await
    }

    /// Transmit a frame.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NotConnected`] when there is no active
    /// connection. The frame is dropped, never queued.
    pub fn send(&self, frame: Frame) -> Result<(), TransportError> {
        let link = self.inner.link.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(link) = link.as_ref() else {
            metrics::counter!("transport.send.rejected").increment(1);
            return Err(TransportError::NotConnected);
        };
        link.outbound
            .send(frame)
            .map_err(|_| TransportError::NotConnected)
    }

    /// Subscribe to inbound frames.
    ///
    /// Each call returns an independent stream that sees every frame received
    /// after the call. Dropping it unsubscribes.
    #[must_use]
    pub fn subscribe(&self) -> InboundFrames {
        let mut rx = self.inner.inbound.subscribe();
        Box::pin(async_stream::stream! {
            loop {
                match rx.recv().await {
                    Ok(frame) => yield frame,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Inbound subscriber lagged, frames skipped");
                    },
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Watch connection state transitions.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Close the connection and stop reconnecting.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        if let Some(supervisor) = self
            .inner
            .supervisor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            supervisor.abort();
        }
        self.inner.drop_current_link();
        tracing::info!(endpoint = %self.endpoint(), "Transport channel closed");
    }

    fn ensure_supervisor(&self) {
        let mut supervisor = self
            .inner
            .supervisor
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if supervisor.is_some() {
            return;
        }
        let Some(lost_rx) = self
            .inner
            .lost_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return;
        };
        let weak = Arc::downgrade(&self.inner);
        *supervisor = Some(tokio::spawn(supervise(weak, lost_rx)));
    }
}

impl Inner {
    async fn connect_once(&self) -> Result<(), TransportError> {
        let _guard = self.connect_lock.lock().await;

        if self.state.borrow().is_connected() {
            return Ok(());
        }
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }

        self.state.send_replace(ConnectionState::Connecting);
        tracing::debug!(endpoint = %self.connector.endpoint(), "Connecting");

        match self.connector.connect().await {
            Ok(_) if self.closed.load(Ordering::Acquire) => {
                self.state.send_replace(ConnectionState::Disconnected);
                Err(TransportError::Closed)
            },
            Ok(connection) => {
                self.install(connection);
                Ok(())
            },
            Err(error) => {
                tracing::warn!(
                    endpoint = %self.connector.endpoint(),
                    error = %error,
                    "Connection attempt failed"
                );
                metrics::counter!("transport.connect.failed").increment(1);
                self.state.send_replace(ConnectionState::Disconnected);
                Err(error)
            },
        }
    }

    fn install(&self, connection: Connection) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let Connection { mut sink, mut stream } = connection;
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Frame>();

        let lost = self.lost_tx.clone();
        let writer = tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                if let Err(error) = sink.send(frame).await {
                    tracing::warn!(generation, error = %error, "Failed to write frame");
                    break;
                }
                metrics::counter!("transport.frames.sent").increment(1);
            }
            let _ = lost.send(generation);
        });

        let inbound = self.inbound.clone();
        let lost = self.lost_tx.clone();
        let reader = tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                match item {
                    Ok(frame) => {
                        metrics::counter!("transport.frames.received").increment(1);
                        // No subscribers is fine; the frame is simply unobserved.
                        let _ = inbound.send(frame);
                    },
                    Err(TransportError::Codec(reason)) => {
                        metrics::counter!("transport.frames.malformed").increment(1);
                        tracing::warn!(generation, reason = %reason, "Discarding malformed frame");
                    },
                    Err(error) => {
                        tracing::warn!(generation, error = %error, "Connection read failed");
                        break;
                    },
                }
            }
            let _ = lost.send(generation);
        });

        let previous = self
            .link
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(Link {
                generation,
                outbound,
                reader,
                writer,
            });
        if let Some(previous) = previous {
            previous.abort();
        }

        self.state.send_replace(ConnectionState::Connected);
        metrics::gauge!("transport.connected").set(1.0);
        tracing::info!(endpoint = %self.connector.endpoint(), generation, "Connected");
    }

    /// Tear down the link if it is still `generation`. Returns whether it was.
    fn drop_link(&self, generation: u64) -> bool {
        let mut link = self.link.lock().unwrap_or_else(PoisonError::into_inner);
        if link.as_ref().is_none_or(|l| l.generation != generation) {
            return false;
        }
        if let Some(current) = link.take() {
            current.abort();
        }
        drop(link);
        self.mark_disconnected();
        true
    }

    fn drop_current_link(&self) {
        let current = self.link.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(current) = current {
            current.abort();
        }
        self.mark_disconnected();
    }

    fn mark_disconnected(&self) {
        self.state.send_replace(ConnectionState::Disconnected);
        metrics::gauge!("transport.connected").set(0.0);
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(supervisor) = self
            .supervisor
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            supervisor.abort();
        }
        if let Some(link) = self.link.get_mut().unwrap_or_else(PoisonError::into_inner).take() {
            link.abort();
        }
    }
}

/// Watches for lost connections and reconnects with backoff.
async fn supervise(inner: Weak<Inner>, mut lost_rx: mpsc::UnboundedReceiver<u64>) {
    while let Some(generation) = lost_rx.recv().await {
        let auto_reconnect = {
            let Some(strong) = inner.upgrade() else { break };
            if !strong.drop_link(generation) {
                continue;
            }
            metrics::counter!("transport.connection.lost").increment(1);
            tracing::warn!(generation, "Connection lost");
            strong.config.auto_reconnect && !strong.closed.load(Ordering::Acquire)
        };

        if auto_reconnect {
            reconnect(&inner).await;
        }
    }
    tracing::debug!("Transport supervisor stopped");
}

async fn reconnect(inner: &Weak<Inner>) {
    let mut attempt: u32 = 0;
    loop {
        let delay = {
            let Some(strong) = inner.upgrade() else { return };
            if !strong.config.reconnect.should_retry(attempt) {
                tracing::error!(attempts = attempt, "Giving up on reconnecting");
                metrics::counter!("transport.reconnect.exhausted").increment(1);
                return;
            }
            strong.config.reconnect.delay_for_attempt(attempt)
        };

        tracing::debug!(attempt, delay_ms = delay.as_millis(), "Reconnecting after delay");
        tokio::time::sleep(delay).await;

        let Some(strong) = inner.upgrade() else { return };
        if strong.closed.load(Ordering::Acquire) {
            return;
        }
        metrics::counter!("transport.reconnect.attempts").increment(1);
        match strong.connect_once().await {
            Ok(()) => {
                metrics::counter!("transport.reconnect.success").increment(1);
                tracing::info!(attempt, "Reconnected");
                return;
            },
            Err(error) => {
                tracing::warn!(attempt, error = %error, "Reconnect attempt failed");
            },
        }
        attempt = attempt.saturating_add(1);
    }
}
