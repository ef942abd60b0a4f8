//! Named-signal publish/subscribe bus
//!
//! The bus maps each [`Signal`] to the handlers subscribed to it. Publishing
//! snapshots the handler list at call time, so subscriptions made while a
//! publish is in flight only see later publishes.
//!
//! ## Dispatch rules
//! - All handlers for one publish run **concurrently** and all observe the
//!   same [`Event`].
//! - Handlers are isolated: a failing or panicking handler produces an
//!   error outcome and never affects the others or the publisher.
//! - [`EventBus::publish`] awaits every handler (joint completion).
//! - [`EventBus::emit`] spawns the dispatch on the bus runtime and returns
//!   immediately (fire-and-forget, used for telemetry and commands).
//! - [`EventBus::dispatch`] hands out the in-flight handler set so callers
//!   can consume outcomes in completion order (used to race recovery
//!   answers).
//!
//! ## Example
//! ```rust,no_run
//! use dropbot_monitor::{Event, EventBus};
//! use dropbot_protocol::Signal;
//!
//! # async fn demo() {
//! let bus = EventBus::new(tokio::runtime::Handle::current());
//! bus.on(Signal::ChipInserted, |_event| async {
//!     println!("chip inserted");
//! });
//! bus.publish(Event::new(Signal::ChipInserted)).await;
//! # }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use dropbot_protocol::Signal;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::error::HandlerError;
use crate::events::Event;
use crate::recovery::RecoveryDecision;

/// Result of running one handler
///
/// Handlers answering recovery queries return `Ok(Some(decision))`; all
/// other handlers return `Ok(None)`.
pub type HandlerOutcome = Result<Option<RecoveryDecision>, HandlerError>;

type HandlerFuture = BoxFuture<'static, HandlerOutcome>;
type Handler = Arc<dyn Fn(Arc<Event>) -> HandlerFuture + Send + Sync>;

/// Identifies one subscription for later removal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Clone)]
struct Subscriber {
    id: SubscriptionId,
    handler: Handler,
}

struct BusInner {
    subscribers: RwLock<HashMap<Signal, Vec<Subscriber>>>,
    next_id: AtomicU64,
    runtime: Handle,
}

/// Publish/subscribe namespace keyed by [`Signal`]
///
/// Cheap to clone; clones share the same subscriber map.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Create a bus whose fire-and-forget dispatches run on `runtime`
    pub fn new(runtime: Handle) -> Self {
        Self {
            inner: Arc::new(BusInner {
                subscribers: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                runtime,
            }),
        }
    }

    /// Runtime used by [`EventBus::emit`]
    pub fn runtime(&self) -> &Handle {
        &self.inner.runtime
    }

    /// Subscribe a handler that may answer with a recovery decision
    pub fn subscribe<F, Fut>(&self, signal: Signal, handler: F) -> SubscriptionId
    where
        F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerOutcome> + Send + 'static,
    {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let handler: Handler = Arc::new(move |event| handler(event).boxed());

        self.write()
            .entry(signal)
            .or_default()
            .push(Subscriber { id, handler });
        debug!("Subscribed {:?} to {}", id, signal);

        id
    }

    /// Subscribe a handler that only observes events
    pub fn on<F, Fut>(&self, signal: Signal, handler: F) -> SubscriptionId
    where
        F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.subscribe(signal, move |event| {
            let observed = handler(event);
            async move {
                observed.await;
                Ok(None)
            }
        })
    }

    /// Remove a subscription; returns false if it was already gone
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.write();
        for handlers in subscribers.values_mut() {
            if let Some(pos) = handlers.iter().position(|s| s.id == id) {
                handlers.remove(pos);
                return true;
            }
        }
        false
    }

    /// Number of handlers currently subscribed to `signal`
    pub fn subscriber_count(&self, signal: Signal) -> usize {
        self.read().get(&signal).map_or(0, Vec::len)
    }

    /// Start every handler currently subscribed to the event's signal
    ///
    /// Nothing runs until the returned [`Dispatch`] is polled.
    pub fn dispatch(&self, event: Event) -> Dispatch {
        let handlers: Vec<Handler> = self
            .read()
            .get(&event.signal)
            .map(|subs| subs.iter().map(|s| Arc::clone(&s.handler)).collect())
            .unwrap_or_default();

        let signal = event.signal;
        let event = Arc::new(event);
        let pending = handlers
            .into_iter()
            .map(|handler| isolate(handler, Arc::clone(&event)))
            .collect();

        Dispatch { signal, pending }
    }

    /// Run every handler for `event` and wait for all of them
    ///
    /// Outcomes are returned in completion order.
    pub async fn publish(&self, event: Event) -> Vec<HandlerOutcome> {
        self.dispatch(event).join().await
    }

    /// Run every handler for `event` in the background
    pub fn emit(&self, event: Event) {
        let dispatch = self.dispatch(event);
        if dispatch.is_empty() {
            return;
        }
        self.inner.runtime.spawn(async move {
            dispatch.join().await;
        });
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<Signal, Vec<Subscriber>>> {
        self.inner
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Signal, Vec<Subscriber>>> {
        self.inner
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<Signal, usize> = self
            .read()
            .iter()
            .map(|(signal, subs)| (*signal, subs.len()))
            .collect();
        f.debug_struct("EventBus")
            .field("subscribers", &counts)
            .finish()
    }
}

/// Run a handler so that its panics turn into outcomes
fn isolate(handler: Handler, event: Arc<Event>) -> HandlerFuture {
    // The handler is invoked inside the future so that a panic while
    // building its future is caught as well.
    AssertUnwindSafe(async move { handler(event).await })
        .catch_unwind()
        .map(|result| {
            result.unwrap_or_else(|panic| {
                let message = if let Some(msg) = panic.downcast_ref::<&'static str>() {
                    (*msg).to_string()
                } else if let Some(msg) = panic.downcast_ref::<String>() {
                    msg.clone()
                } else {
                    "unknown panic".to_string()
                };
                Err(HandlerError::Panicked(message))
            })
        })
        .boxed()
}

/// Handlers started by one publish
pub struct Dispatch {
    signal: Signal,
    pending: FuturesUnordered<HandlerFuture>,
}

impl Dispatch {
    /// Signal being dispatched
    pub fn signal(&self) -> Signal {
        self.signal
    }

    /// Number of handlers that have not finished
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Check if no handler is left
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Wait for the next handler to finish; `None` once all have
    pub async fn next(&mut self) -> Option<HandlerOutcome> {
        self.pending.next().await
    }

    /// Wait for every handler to finish
    pub async fn join(mut self) -> Vec<HandlerOutcome> {
        let mut outcomes = Vec::with_capacity(self.pending.len());
        while let Some(outcome) = self.pending.next().await {
            if let Err(e) = &outcome {
                warn!("{} handler: {}", self.signal, e);
            }
            outcomes.push(outcome);
        }
        outcomes
    }
}

impl fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatch")
            .field("signal", &self.signal)
            .field("pending", &self.pending.len())
            .finish()
    }
}
