//! Process-wide action dispatch bus.
//!
//! `publish` delivers synchronously, in subscription order, to every live
//! subscriber whose predicate matches. Each subscriber owns an unbounded
//! queue, so delivery is lossless and FIFO per subscriber; nothing is
//! promised across subscribers.
//!
//! ```
//! use caption_client_runtime::bus::ActionBus;
//! use futures::StreamExt;
//!
//! # tokio_test::block_on(async {
//! let bus = ActionBus::<u32>::new();
//! let mut evens = bus.subscribe(|n| n % 2 == 0);
//!
//! bus.publish(&1);
//! bus.publish(&2);
//!
//! assert_eq!(evens.next().await, Some(2));
//! # });
//! ```

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

type Predicate<A> = Box<dyn Fn(&A) -> bool + Send + Sync>;

struct Subscriber<A> {
    id: u64,
    predicate: Predicate<A>,
    sender: mpsc::UnboundedSender<A>,
}

struct BusInner<A> {
    subscribers: Mutex<Vec<Subscriber<A>>>,
    next_id: AtomicU64,
}

/// Broadcast bus for typed actions.
///
/// Cheap to clone; clones share subscribers.
pub struct ActionBus<A> {
    inner: Arc<BusInner<A>>,
}

impl<A> Clone for ActionBus<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A> Default for ActionBus<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> std::fmt::Debug for ActionBus<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl<A> ActionBus<A> {
    /// Create a bus with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                subscribers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Subscribe to actions matching `predicate`.
    ///
    /// Only actions published after this call are delivered.
    pub fn subscribe<F>(&self, predicate: F) -> Subscription<A>
    where
        F: Fn(&A) -> bool + Send + Sync + 'static,
    {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscriber {
                id,
                predicate: Box::new(predicate),
                sender,
            });

        tracing::trace!(subscriber = id, "Bus subscriber added");
        Subscription { id, receiver }
    }

    /// Subscribe to every action.
    pub fn subscribe_all(&self) -> Subscription<A> {
        self.subscribe(|_| true)
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|s| !s.sender.is_closed())
            .count()
    }
}

impl<A: Clone> ActionBus<A> {
    /// Deliver `action` to every matching subscriber, in subscription order.
    ///
    /// Returns the number of subscribers that received it. Cancelled
    /// subscribers are pruned on the way.
    pub fn publish(&self, action: &A) -> usize {
        let mut subscribers = self
            .inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        subscribers.retain(|s| !s.sender.is_closed());

        let mut delivered = 0;
        for subscriber in subscribers.iter() {
            if (subscriber.predicate)(action) && subscriber.sender.send(action.clone()).is_ok() {
                delivered += 1;
            }
        }

        metrics::counter!("bus.actions.published").increment(1);
        metrics::counter!("bus.actions.delivered").increment(delivered as u64);
        delivered
    }
}

/// A filtered, cancellable stream of actions.
///
/// Dropping the subscription (or calling [`cancel`](Self::cancel)) stops
/// future deliveries without affecting other subscribers.
#[derive(Debug)]
pub struct Subscription<A> {
    id: u64,
    receiver: mpsc::UnboundedReceiver<A>,
}

impl<A> Subscription<A> {
    /// Subscriber id, unique per bus.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next matching action.
    ///
    /// Returns `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<A> {
        self.receiver.recv().await
    }

    /// Take an already delivered action without waiting.
    pub fn try_recv(&mut self) -> Option<A> {
        self.receiver.try_recv().ok()
    }

    /// Stop receiving actions.
    pub fn cancel(mut self) {
        self.receiver.close();
        tracing::trace!(subscriber = self.id, "Bus subscriber cancelled");
    }
}

impl<A> Stream for Subscription<A> {
    type Item = A;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}
