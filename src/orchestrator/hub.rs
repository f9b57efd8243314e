//! Per-session fan-out of newly appended timeline events.
//!
//! The hub holds no durable state: losing it loses only current
//! subscriptions, never timeline history. Each session has a topic with a
//! publish lock (serializing append+fan-out against snapshot+attach, which
//! is what makes subscription gap-free and duplicate-free) and a list of
//! subscriber sinks.
//!
//! Backpressure: every sink owns a bounded queue. A publisher never waits
//! on a slow viewer — when the queue is full the sink is closed with an
//! overflow marker and dropped, and the subscriber recovers by
//! re-subscribing with `since_sequence` catch-up.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::models::timeline::TimelineEvent;
use crate::{AppError, Result};

/// One subscriber's outbound capability: push events, close on overflow.
struct SubscriberSink {
    tx: mpsc::Sender<TimelineEvent>,
    overflowed: Arc<AtomicBool>,
}

/// Fan-out state for a single session.
pub struct SessionTopic {
    publish_lock: Mutex<()>,
    sinks: StdMutex<Vec<SubscriberSink>>,
}

impl SessionTopic {
    fn new() -> Self {
        Self {
            publish_lock: Mutex::new(()),
            sinks: StdMutex::new(Vec::new()),
        }
    }

    /// Acquire the publish lock.
    ///
    /// Held across durable-append + fan-out by publishers, and across
    /// snapshot-read + attach by subscribers; this mutual exclusion is the
    /// no-gap/no-duplicate guarantee.
    pub(crate) async fn lock(&self) -> MutexGuard<'_, ()> {
        self.publish_lock.lock().await
    }

    /// Register a new subscriber sink and return its stream.
    ///
    /// Callers must hold the publish lock.
    pub(crate) fn attach(&self, capacity: usize) -> EventStream {
        let (tx, rx) = mpsc::channel(capacity);
        let overflowed = Arc::new(AtomicBool::new(false));
        self.sinks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SubscriberSink {
                tx,
                overflowed: Arc::clone(&overflowed),
            });
        EventStream {
            rx,
            overflowed,
            done: false,
        }
    }

    /// Deliver one event to every live sink.
    ///
    /// Callers must hold the publish lock. Sinks whose receiver is gone are
    /// pruned; sinks whose queue is full are marked overflowed and closed.
    pub(crate) fn fanout(&self, event: &TimelineEvent) {
        let mut sinks = self.sinks.lock().unwrap_or_else(PoisonError::into_inner);
        sinks.retain(|sink| match sink.tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                sink.overflowed.store(true, Ordering::SeqCst);
                warn!(
                    session_id = %event.session_id,
                    sequence = event.sequence,
                    "slow subscriber overflowed, dropping its stream"
                );
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(session_id = %event.session_id, "pruning disconnected subscriber");
                false
            }
        });
    }

    fn subscriber_count(&self) -> usize {
        self.sinks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Live event stream handle for one subscriber.
///
/// Dropping the stream unsubscribes implicitly: the sink is pruned on the
/// next publish.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::Receiver<TimelineEvent>,
    overflowed: Arc<AtomicBool>,
    done: bool,
}

impl EventStream {
    /// A stream that ends immediately, for subscriptions to sessions whose
    /// timeline is already frozen.
    pub(crate) fn closed() -> Self {
        let (_tx, rx) = mpsc::channel(1);
        Self {
            rx,
            overflowed: Arc::new(AtomicBool::new(false)),
            done: true,
        }
    }

    /// Receive the next live event.
    ///
    /// Yields `Some(Ok(event))` in append order, then either `None` when
    /// the stream ends cleanly or `Some(Err(SubscriberOverflow))` exactly
    /// once when this subscriber was dropped for falling behind. Events
    /// already queued before the overflow are still delivered first.
    pub async fn recv(&mut self) -> Option<Result<TimelineEvent>> {
        if self.done {
            return None;
        }
        match self.rx.recv().await {
            Some(event) => Some(Ok(event)),
            None => {
                self.done = true;
                if self.overflowed.load(Ordering::SeqCst) {
                    Some(Err(AppError::SubscriberOverflow(
                        "subscriber queue overflowed; re-subscribe with since_sequence".into(),
                    )))
                } else {
                    None
                }
            }
        }
    }
}

/// Registry of per-session fan-out topics.
pub struct BroadcastHub {
    topics: StdMutex<HashMap<String, Arc<SessionTopic>>>,
    queue_capacity: usize,
}

impl BroadcastHub {
    /// Create a hub whose subscriber queues hold `queue_capacity` events.
    #[must_use]
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            topics: StdMutex::new(HashMap::new()),
            queue_capacity,
        }
    }

    /// Fetch (or create) the topic for a session.
    pub(crate) fn topic(&self, session_id: &str) -> Arc<SessionTopic> {
        let mut topics = self.topics.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            topics
                .entry(session_id.to_owned())
                .or_insert_with(|| Arc::new(SessionTopic::new())),
        )
    }

    /// Drop a session's topic, closing every attached stream.
    ///
    /// Called on the terminal transition; the timeline is frozen from then
    /// on, so subscribers drain what is queued and end cleanly.
    pub(crate) fn prune(&self, session_id: &str) {
        self.topics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id);
    }

    /// Bounded queue size handed to each new subscriber.
    #[must_use]
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Number of live topics, for diagnostics.
    #[must_use]
    pub fn topic_count(&self) -> usize {
        self.topics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Current live subscriber count for a session, for diagnostics.
    #[must_use]
    pub fn subscriber_count(&self, session_id: &str) -> usize {
        self.topics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .map_or(0, |topic| topic.subscriber_count())
    }
}
