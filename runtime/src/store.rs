//! The state container and effect runtime.
//!
//! # Dispatch cycle
//!
//! ```text
//! dispatch(action)
//!   ├─ clone root state (Arc slices: reference bumps only)
//!   ├─ root reducer (pure, synchronous)
//!   ├─ install the new snapshot          ──► select(..) streams re-emit
//!   ├─ publish (action, snapshot)        ──► effect handler tasks
//!   │                                          └─ effects ─► dispatch(follow-up)
//!   └─ publish action on the bus         ──► actions(..) subscribers
//! ```
//!
//! Reduction and publication happen under one dispatch lock, so every
//! subscriber sees actions in the order their reductions were applied.
//! Handlers receive the snapshot produced by the action they handle, not
//! whatever the store holds by the time their task runs.

use std::cell::Cell;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use caption_client_core::composition::BoxedReducer;
use caption_client_core::effect::Effect;
use caption_client_core::handler::EffectHandler;
use futures::{Stream, StreamExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::bus::{ActionBus, Subscription};
use crate::error::StoreError;

/// Shared handle to a registered effect handler.
pub type SharedHandler<S, A, E> =
    Arc<dyn EffectHandler<State = S, Action = A, Environment = E> + Send + Sync>;

thread_local! {
    /// Address of the store currently dispatching on this thread (0 = none).
    static DISPATCHING: Cell<usize> = const { Cell::new(0) };
}

/// Marks the current thread as dispatching for one store; restores on drop.
struct DispatchGuard {
    previous: usize,
}

impl DispatchGuard {
    fn enter(store: usize) -> Self {
        let previous = DISPATCHING.with(|d| d.replace(store));
        Self { previous }
    }
}

impl Drop for DispatchGuard {
    fn drop(&mut self) {
        DISPATCHING.with(|d| d.set(self.previous));
    }
}

/// Guard that decrements an atomic counter on drop (for shutdown tracking)
struct AtomicCounterGuard(Arc<AtomicUsize>);

impl Drop for AtomicCounterGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Fail `dispatch` on invariant violations instead of logging them
    pub strict_invariants: bool,
    /// How often `shutdown` polls for running effects
    pub shutdown_poll_interval: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            strict_invariants: cfg!(debug_assertions),
            shutdown_poll_interval: Duration::from_millis(10),
        }
    }
}

impl StoreConfig {
    /// Enable or disable strict invariant checking.
    #[must_use]
    pub const fn with_strict_invariants(mut self, strict: bool) -> Self {
        self.strict_invariants = strict;
        self
    }

    /// Set the shutdown polling interval.
    #[must_use]
    pub const fn with_shutdown_poll_interval(mut self, interval: Duration) -> Self {
        self.shutdown_poll_interval = interval;
        self
    }
}

/// An action paired with the snapshot its reduction produced.
#[derive(Clone)]
struct Reduced<S, A> {
    action: A,
    state: S,
}

struct StoreInner<S, A, E> {
    state: watch::Sender<S>,
    reducer: BoxedReducer<S, A>,
    environment: Arc<E>,
    bus: ActionBus<A>,
    reduced: ActionBus<Reduced<S, A>>,
    config: StoreConfig,
    dispatch_lock: Mutex<()>,
    shutdown: AtomicBool,
    pending_effects: Arc<AtomicUsize>,
    handler_tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<S, A, E> Drop for StoreInner<S, A, E> {
    fn drop(&mut self) {
        for task in self
            .handler_tasks
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
        {
            task.abort();
        }
    }
}

/// The single state container of the client.
///
/// Cheap to clone; clones share state, bus and handlers.
pub struct Store<S, A, E> {
    inner: Arc<StoreInner<S, A, E>>,
}

impl<S, A, E> Clone for Store<S, A, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, A, E> std::fmt::Debug for Store<S, A, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("config", &self.inner.config)
            .field(
                "pending_effects",
                &self.inner.pending_effects.load(Ordering::Acquire),
            )
            .finish_non_exhaustive()
    }
}

/// Builds a [`Store`] with its explicit table of effect handlers.
pub struct StoreBuilder<S, A, E> {
    initial_state: S,
    reducer: BoxedReducer<S, A>,
    environment: E,
    config: StoreConfig,
    handlers: Vec<SharedHandler<S, A, E>>,
}

impl<S, A, E> StoreBuilder<S, A, E>
where
    S: Clone + Send + Sync + 'static,
    A: Clone + Send + Sync + std::fmt::Debug + 'static,
    E: Send + Sync + 'static,
{
    /// Override the store configuration.
    #[must_use]
    pub fn with_config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Register an effect handler.
    #[must_use]
    pub fn with_effect<H>(mut self, handler: H) -> Self
    where
        H: EffectHandler<State = S, Action = A, Environment = E> + 'static,
    {
        self.handlers.push(Arc::new(handler));
        self
    }

    /// Register an already shared effect handler.
    #[must_use]
    pub fn with_shared_effect(mut self, handler: SharedHandler<S, A, E>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Build the store and start one task per effect handler.
    ///
    /// Must be called inside a Tokio runtime when handlers are registered.
    #[must_use]
    pub fn build(self) -> Store<S, A, E> {
        let (state, _) = watch::channel(self.initial_state);
        let store = Store {
            inner: Arc::new(StoreInner {
                state,
                reducer: self.reducer,
                environment: Arc::new(self.environment),
                bus: ActionBus::new(),
                reduced: ActionBus::new(),
                config: self.config,
                dispatch_lock: Mutex::new(()),
                shutdown: AtomicBool::new(false),
                pending_effects: Arc::new(AtomicUsize::new(0)),
                handler_tasks: Mutex::new(Vec::new()),
            }),
        };

        let mut tasks = Vec::with_capacity(self.handlers.len());
        for handler in self.handlers {
            let filter = Arc::clone(&handler);
            // Subscribed before `build` returns: no dispatch can be missed.
            let actions = store
                .inner
                .reduced
                .subscribe(move |reduced: &Reduced<S, A>| filter.accepts(&reduced.action));
            tracing::debug!(handler = handler.name(), "Registered effect handler");
            tasks.push(tokio::spawn(run_handler(
                Arc::downgrade(&store.inner),
                handler,
                actions,
            )));
        }
        *store
            .inner
            .handler_tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = tasks;

        store
    }
}

async fn run_handler<S, A, E>(
    store: Weak<StoreInner<S, A, E>>,
    handler: SharedHandler<S, A, E>,
    mut actions: Subscription<Reduced<S, A>>,
) where
    S: Clone + Send + Sync + 'static,
    A: Clone + Send + Sync + std::fmt::Debug + 'static,
    E: Send + Sync + 'static,
{
    let name = handler.name();
    while let Some(Reduced { action, state }) = actions.next().await {
        let Some(inner) = store.upgrade() else { break };
        let store = Store { inner };

        let span = tracing::debug_span!("effect_handler", handler = name);
        let effects = {
            let _enter = span.enter();
            tracing::trace!(action = ?action, "Handling action");
            handler.handle(&action, &state, &store.inner.environment)
        };
        metrics::counter!("store.handler.invocations", "handler" => name).increment(1);

        for effect in effects {
            store.execute_effect(effect, name);
        }
    }
    tracing::debug!(handler = name, "Effect handler stopped");
}

impl<S, A, E> Store<S, A, E>
where
    S: Clone + Send + Sync + 'static,
    A: Clone + Send + Sync + std::fmt::Debug + 'static,
    E: Send + Sync + 'static,
{
    /// Start building a store.
    #[must_use]
    pub fn builder(
        initial_state: S,
        reducer: BoxedReducer<S, A>,
        environment: E,
    ) -> StoreBuilder<S, A, E> {
        StoreBuilder {
            initial_state,
            reducer,
            environment,
            config: StoreConfig::default(),
            handlers: Vec::new(),
        }
    }

    /// A store without effect handlers.
    #[must_use]
    pub fn new(initial_state: S, reducer: BoxedReducer<S, A>, environment: E) -> Self {
        Self::builder(initial_state, reducer, environment).build()
    }

    /// Reduce `action` synchronously, install the new snapshot and publish it.
    ///
    /// # Errors
    ///
    /// - [`StoreError::ShutdownInProgress`] after [`shutdown`](Self::shutdown)
    /// - [`StoreError::ReentrantDispatch`] when called from inside a
    ///   reduction or a bus predicate of this store
    /// - [`StoreError::InvariantViolation`] in strict mode when the reducer
    ///   rejects the action (state is left unchanged)
    #[tracing::instrument(skip(self, action), name = "store_dispatch")]
    pub fn dispatch(&self, action: A) -> Result<(), StoreError> {
        if self.inner.shutdown.load(Ordering::Acquire) {
            tracing::warn!("Rejected action: store is shutting down");
            metrics::counter!("store.dispatch.rejected").increment(1);
            return Err(StoreError::ShutdownInProgress);
        }

        let address = Arc::as_ptr(&self.inner) as *const () as usize;
        if DISPATCHING.with(Cell::get) == address {
            tracing::error!(action = ?action, "Reentrant dispatch rejected");
            metrics::counter!("store.dispatch.reentrant").increment(1);
            return Err(StoreError::ReentrantDispatch);
        }

        let _lock = self
            .inner
            .dispatch_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let _dispatching = DispatchGuard::enter(address);

        tracing::debug!(action = ?action, "Processing action");
        metrics::counter!("store.dispatch.total").increment(1);

        let mut next = self.inner.state.borrow().clone();
        let start = Instant::now();
        let reduced = self.inner.reducer.reduce(&mut next, &action);
        metrics::histogram!("store.reducer.duration_seconds")
            .record(start.elapsed().as_secs_f64());

        if let Err(violation) = reduced {
            metrics::counter!("store.invariant.violations").increment(1);
            if self.inner.config.strict_invariants {
                tracing::error!(error = %violation, action = ?action, "State invariant violated");
                return Err(StoreError::InvariantViolation(violation));
            }
            tracing::error!(
                error = %violation,
                action = ?action,
                "State invariant violated, action ignored"
            );
            return Ok(());
        }

        self.inner.state.send_replace(next.clone());
        self.inner.reduced.publish(&Reduced {
            action: action.clone(),
            state: next,
        });
        self.inner.bus.publish(&action);
        Ok(())
    }

    /// Dispatch `action` and wait for the first later action matching
    /// `predicate` (typically the response action of a request).
    ///
    /// # Errors
    ///
    /// - any error of [`dispatch`](Self::dispatch)
    /// - [`StoreError::Timeout`] if nothing matched in time
    /// - [`StoreError::ChannelClosed`] if the store went away
    pub async fn dispatch_and_wait_for<F>(
        &self,
        action: A,
        predicate: F,
        timeout: Duration,
    ) -> Result<A, StoreError>
    where
        F: Fn(&A) -> bool + Send + Sync + 'static,
    {
        // Subscribe BEFORE dispatching to avoid missing a fast follow-up
        let mut matching = self.inner.bus.subscribe(predicate);

        self.dispatch(action)?;

        tokio::time::timeout(timeout, matching.recv())
            .await
            .map_err(|_| StoreError::Timeout)?
            .ok_or(StoreError::ChannelClosed)
    }

    /// Current root state.
    #[must_use]
    pub fn snapshot(&self) -> S {
        self.inner.state.borrow().clone()
    }

    /// Read the current state through a closure.
    pub fn state<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&S) -> T,
    {
        f(&self.inner.state.borrow())
    }

    /// Observe one `Arc` slice.
    ///
    /// The stream is lazy: it first yields the current slice when polled,
    /// then re-yields only when the slice reference changes. Intermediate
    /// snapshots may be skipped by slow consumers (latest value wins).
    pub fn select<T, F>(&self, selector: F) -> Selection<Arc<T>>
    where
        T: Send + Sync + 'static,
        F: Fn(&S) -> Arc<T> + Send + 'static,
    {
        let mut rx = self.inner.state.subscribe();
        Selection::new(async_stream::stream! {
            let mut last: Option<Arc<T>> = None;
            loop {
                let current = selector(&rx.borrow_and_update());
                if last.as_ref().is_none_or(|prev| !Arc::ptr_eq(prev, &current)) {
                    last = Some(Arc::clone(&current));
                    yield current;
                }
                if rx.changed().await.is_err() {
                    break;
                }
            }
        })
    }

    /// Observe a derived value, re-yielding only when it changes by value.
    pub fn select_value<T, F>(&self, selector: F) -> Selection<T>
    where
        T: Clone + PartialEq + Send + 'static,
        F: Fn(&S) -> T + Send + 'static,
    {
        let mut rx = self.inner.state.subscribe();
        Selection::new(async_stream::stream! {
            let mut last: Option<T> = None;
            loop {
                let current = selector(&rx.borrow_and_update());
                if last.as_ref() != Some(&current) {
                    last = Some(current.clone());
                    yield current;
                }
                if rx.changed().await.is_err() {
                    break;
                }
            }
        })
    }

    /// Subscribe to dispatched actions matching `predicate`.
    pub fn actions<F>(&self, predicate: F) -> Subscription<A>
    where
        F: Fn(&A) -> bool + Send + Sync + 'static,
    {
        self.inner.bus.subscribe(predicate)
    }

    /// The action bus (for publishers that bypass reduction in tests).
    #[must_use]
    pub fn bus(&self) -> &ActionBus<A> {
        &self.inner.bus
    }

    /// Injected environment.
    #[must_use]
    pub fn environment(&self) -> &E {
        &self.inner.environment
    }

    /// Effects still running.
    #[must_use]
    pub fn pending_effects(&self) -> usize {
        self.inner.pending_effects.load(Ordering::Acquire)
    }

    /// Stop accepting actions, wait for running effects, stop handlers.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownTimeout`] if effects were still running
    /// when `timeout` elapsed. Handlers are stopped either way.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
        tracing::info!("Initiating graceful shutdown");
        metrics::counter!("store.shutdown.initiated").increment(1);
        self.inner.shutdown.store(true, Ordering::Release);

        let start = Instant::now();
        let result = loop {
            let pending = self.pending_effects();
            if pending == 0 {
                tracing::info!("All effects completed, shutdown successful");
                break Ok(());
            }
            if start.elapsed() >= timeout {
                tracing::error!(pending_effects = pending, "Shutdown timeout");
                metrics::counter!("store.shutdown.timeout").increment(1);
                break Err(StoreError::ShutdownTimeout(pending));
            }
            tokio::time::sleep(self.inner.config.shutdown_poll_interval).await;
        };

        let tasks: Vec<JoinHandle<()>> = self
            .inner
            .handler_tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for task in tasks {
            task.abort();
        }

        result
    }

    /// Spawn an effect, tracking it for shutdown.
    fn execute_effect(&self, effect: Effect<A>, handler: &'static str) {
        if effect.is_none() {
            metrics::counter!("store.effects.executed", "type" => "none").increment(1);
            return;
        }

        self.inner.pending_effects.fetch_add(1, Ordering::SeqCst);
        let pending_guard = AtomicCounterGuard(Arc::clone(&self.inner.pending_effects));
        let run = self.run_effect(effect, handler);

        tokio::spawn(async move {
            let _pending_guard = pending_guard; // Decrement on drop, even on panic
            run.await;
        });
    }

    /// Run an effect to completion, dispatching whatever it produces.
    fn run_effect(
        &self,
        effect: Effect<A>,
        handler: &'static str,
    ) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        let store = self.clone();
        Box::pin(async move {
            match effect {
                Effect::None => {
                    metrics::counter!("store.effects.executed", "type" => "none").increment(1);
                },
                Effect::Future(fut) => {
                    metrics::counter!("store.effects.executed", "type" => "future").increment(1);
                    if let Some(action) = fut.await {
                        store.feed_back(action, handler);
                    }
                },
                Effect::Delay { duration, action } => {
                    metrics::counter!("store.effects.executed", "type" => "delay").increment(1);
                    tokio::time::sleep(duration).await;
                    store.feed_back(*action, handler);
                },
                Effect::Parallel(effects) => {
                    metrics::counter!("store.effects.executed", "type" => "parallel").increment(1);
                    futures::future::join_all(
                        effects.into_iter().map(|e| store.run_effect(e, handler)),
                    )
                    .await;
                },
                Effect::Sequential(effects) => {
                    metrics::counter!("store.effects.executed", "type" => "sequential")
                        .increment(1);
                    for effect in effects {
                        store.run_effect(effect, handler).await;
                    }
                },
            }
        })
    }

    fn feed_back(&self, action: A, handler: &'static str) {
        if let Err(error) = self.dispatch(action) {
            tracing::warn!(handler, error = %error, "Follow-up action was not dispatched");
        }
    }
}

/// Stream of selected values. See [`Store::select`].
pub struct Selection<T> {
    inner: Pin<Box<dyn Stream<Item = T> + Send>>,
}

impl<T> Selection<T> {
    fn new(stream: impl Stream<Item = T> + Send + 'static) -> Self {
        Self {
            inner: Box::pin(stream),
        }
    }
}

impl<T> std::fmt::Debug for Selection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Selection").finish_non_exhaustive()
    }
}

impl<T> Stream for Selection<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.inner.as_mut().poll_next(cx)
    }
}
