//! In-memory queue.
//!
//! [`InMemoryQueue`] is both the connector and, through the channels it
//! hands out, the broker. Published messages are kept in order until a
//! consumer drains them; acknowledged and negatively acknowledged messages
//! are recorded separately so tests can assert on dispositions.
//!
//! Failure injection:
//! - [`InMemoryQueue::fail_next_connects`]: the next `n` connects fail
//! - [`InMemoryQueue::set_publish_failing`]: publishes fail until reset

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use plan_registry_core::event::PlanEvent;
use plan_registry_core::event_bus::{
    BusFuture, Disposition, EventBusError, EventChannel, MessageHandler, QueueConnector,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Default queue name, matching the production topic.
pub const DEFAULT_QUEUE: &str = "plan_events";

#[derive(Debug, Default)]
struct QueueState {
    pending: Mutex<VecDeque<Vec<u8>>>,
    published: Mutex<Vec<Vec<u8>>>,
    acked: Mutex<Vec<Vec<u8>>>,
    nacked: Mutex<Vec<Vec<u8>>>,
    connect_attempts: AtomicUsize,
    failing_connects: AtomicUsize,
    publish_failing: AtomicBool,
}

/// In-memory broker and connector.
///
/// # Example
///
/// ```
/// use plan_registry_testing::InMemoryQueue;
/// use plan_registry_core::event_bus::QueueConnector;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let queue = InMemoryQueue::new();
/// let channel = queue.connect().await?;
/// channel.publish(b"hello".to_vec()).await?;
/// assert_eq!(queue.published().len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct InMemoryQueue {
    name: String,
    state: Arc<QueueState>,
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryQueue {
    /// Create an empty queue named [`DEFAULT_QUEUE`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            name: DEFAULT_QUEUE.to_string(),
            state: Arc::default(),
        }
    }

    /// Make the next `count` connection attempts fail.
    pub fn fail_next_connects(&self, count: usize) {
        self.state.failing_connects.store(count, Ordering::SeqCst);
    }

    /// Make publishes fail (or succeed again).
    pub fn set_publish_failing(&self, failing: bool) {
        self.state.publish_failing.store(failing, Ordering::SeqCst);
    }

    /// Number of connection attempts so far.
    #[must_use]
    pub fn connect_attempts(&self) -> usize {
        self.state.connect_attempts.load(Ordering::SeqCst)
    }

    /// Enqueue a raw message as if another producer had published it.
    pub fn inject(&self, payload: Vec<u8>) {
        self.state.pending.lock().unwrap().push_back(payload);
    }

    /// Every message accepted by a channel, in publish order.
    #[must_use]
    pub fn published(&self) -> Vec<Vec<u8>> {
        self.state.published.lock().unwrap().clone()
    }

    /// Accepted messages decoded as plan events.
    #[must_use]
    pub fn published_events(&self) -> Vec<PlanEvent> {
        self.published()
            .iter()
            .map(|bytes| PlanEvent::from_bytes(bytes).unwrap())
            .collect()
    }

    /// Messages consumed with [`Disposition::Ack`].
    #[must_use]
    pub fn acked(&self) -> Vec<Vec<u8>> {
        self.state.acked.lock().unwrap().clone()
    }

    /// Messages consumed with [`Disposition::Nack`].
    #[must_use]
    pub fn nacked(&self) -> Vec<Vec<u8>> {
        self.state.nacked.lock().unwrap().clone()
    }

    /// Messages not yet consumed.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.state.pending.lock().unwrap().len()
    }
}

impl QueueConnector for InMemoryQueue {
    fn connect(&self) -> BusFuture<'_, Arc<dyn EventChannel>> {
        Box::pin(async move {
            self.state.connect_attempts.fetch_add(1, Ordering::SeqCst);
            let refused = self
                .state
                .failing_connects
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if refused {
                return Err(EventBusError::ConnectionFailed("broker unreachable".into()));
            }
            let channel: Arc<dyn EventChannel> = Arc::new(InMemoryChannel {
                name: self.name.clone(),
                state: Arc::clone(&self.state),
            });
            Ok(channel)
        })
    }
}

/// Channel handed out by [`InMemoryQueue`].
#[derive(Debug)]
pub struct InMemoryChannel {
    name: String,
    state: Arc<QueueState>,
}

impl EventChannel for InMemoryChannel {
    fn topic(&self) -> &str {
        &self.name
    }

    fn publish(&self, payload: Vec<u8>) -> BusFuture<'_, ()> {
        Box::pin(async move {
            if self.state.publish_failing.load(Ordering::SeqCst) {
                return Err(EventBusError::PublishFailed {
                    topic: self.name.clone(),
                    reason: "channel closed".into(),
                });
            }
            self.state.published.lock().unwrap().push(payload.clone());
            self.state.pending.lock().unwrap().push_back(payload);
            Ok(())
        })
    }

    /// Drains pending messages one at a time, then returns.
    fn consume(&self, handler: Arc<dyn MessageHandler>) -> BusFuture<'_, ()> {
        Box::pin(async move {
            loop {
                let next = self.state.pending.lock().unwrap().pop_front();
                let Some(payload) = next else {
                    return Ok(());
                };
                match handler.handle(payload.clone()).await {
                    Disposition::Ack => self.state.acked.lock().unwrap().push(payload),
                    Disposition::Nack => self.state.nacked.lock().unwrap().push(payload),
                }
            }
        })
    }
}
