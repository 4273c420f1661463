//! Event channel between the repository and its consumers
//!
//! Each subscriber owns an unbounded queue. Publishing enqueues the same
//! `Arc<ChangeEvent>` into every live queue in emission order, so:
//!
//! - a subscriber sees every event published after it subscribed, exactly once
//! - a subscriber sees events in publication order
//! - a slow subscriber only grows its own queue and never delays the others
//!
//! Unlike a `broadcast` channel nothing is dropped for lagging subscribers; the
//! consumers here derive counters and dirty sets from the stream, so a gap
//! would corrupt them.
//!
//! ```text
//!   HostRepository ──publish──► EventChannel ─┬─► view sync queue
//!                                             ├─► aggregate queue
//!                                             ├─► persistence queue
//!                                             └─► probe-list queue
//! ```

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace};

use crate::events::ChangeEvent;

/// Event as delivered to subscribers
pub type SharedEvent = Arc<ChangeEvent>;

struct Subscriber {
    name: String,
    tx: mpsc::UnboundedSender<SharedEvent>,
}

/// Fan-out from one publisher to many independent subscribers
#[derive(Default)]
pub struct EventChannel {
    subscribers: Mutex<Vec<Subscriber>>,
    published: AtomicU64,
}

impl EventChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber
    ///
    /// The subscriber receives every event published after this call returns.
    /// Dropping the returned receiver unsubscribes.
    pub fn subscribe(&self, name: impl Into<String>) -> EventReceiver {
        let name = name.into();
        let (tx, rx) = mpsc::unbounded_channel();

        debug!("subscriber '{name}' registered");
        self.subscribers.lock().push(Subscriber {
            name: name.clone(),
            tx,
        });

        EventReceiver { name, rx }
    }

    /// Deliver an event to every live subscriber
    ///
    /// Never blocks and never runs subscriber code. Returns the number of
    /// subscribers the event was queued for.
    pub fn publish(&self, event: ChangeEvent) -> usize {
        let event = Arc::new(event);
        let mut subscribers = self.subscribers.lock();

        subscribers.retain(|subscriber| match subscriber.tx.send(event.clone()) {
            Ok(()) => true,
            Err(_) => {
                debug!("subscriber '{}' is gone, removing it", subscriber.name);
                false
            }
        });

        self.published.fetch_add(1, Ordering::Relaxed);
        trace!(
            "published {} event to {} subscribers",
            event.kind(),
            subscribers.len()
        );

        subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Total number of events published so far
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Subscribe a plain callback and run its dispatch loop on a tokio task
    ///
    /// Errors and panics raised by `handler` are logged and the loop keeps
    /// going with the next event.
    pub fn spawn_handler<F>(&self, name: impl Into<String>, mut handler: F) -> JoinHandle<()>
    where
        F: FnMut(&ChangeEvent) -> anyhow::Result<()> + Send + 'static,
    {
        let mut events = self.subscribe(name);

        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                dispatch(events.name(), &event, &mut handler);
            }
            debug!("dispatch loop for '{}' stopped", events.name());
        })
    }
}

/// Receiving end of one subscription
pub struct EventReceiver {
    name: String,
    rx: mpsc::UnboundedReceiver<SharedEvent>,
}

impl EventReceiver {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait for the next event; `None` once the channel is gone
    pub async fn recv(&mut self) -> Option<SharedEvent> {
        self.rx.recv().await
    }

    /// Take the next event if one is already queued
    pub fn try_recv(&mut self) -> Option<SharedEvent> {
        self.rx.try_recv().ok()
    }

    /// Take every event that is already queued
    pub fn drain(&mut self) -> Vec<SharedEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

/// Run one handler invocation in isolation
///
/// Returns `true` if the handler succeeded. Failures are logged, never
/// propagated to the publisher or to other subscribers.
pub fn dispatch<F>(subscriber: &str, event: &ChangeEvent, handler: F) -> bool
where
    F: FnOnce(&ChangeEvent) -> anyhow::Result<()>,
{
    match catch_unwind(AssertUnwindSafe(|| handler(event))) {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            error!(
                subscriber,
                event = event.kind(),
                "event handler failed: {:#}",
                e
            );
            false
        }
        Err(_) => {
            error!(subscriber, event = event.kind(), "event handler panicked");
            false
        }
    }
}
