//! Best-effort event publisher.
//!
//! One [`EventPublisher`] is built at startup and shared by every request.
//! It opens its queue channel on first use (or eagerly via
//! [`EventPublisher::connect`]) and reuses that channel for all later
//! publishes.
//!
//! # Delivery contract
//!
//! Publishing happens after both stores were written and is not part of
//! any transaction with them. A publish failure is logged, counted and
//! swallowed: it never fails the caller's mutation. A crash between the
//! store writes and the publish loses the event.

use crate::metrics::PlanMetrics;
use crate::retry::{RetryPolicy, with_retry};
use plan_registry_core::event::PlanEvent;
use plan_registry_core::event_bus::{EventBusError, EventChannel, QueueConnector};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// What happened to a published event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The queue accepted the event.
    Delivered,
    /// The event was dropped (no channel, encode or publish failure).
    Dropped,
}

/// Process-wide publisher with a lazily established, reused channel.
pub struct EventPublisher {
    connector: Arc<dyn QueueConnector>,
    policy: RetryPolicy,
    channel: OnceCell<Arc<dyn EventChannel>>,
}

impl EventPublisher {
    /// Create a publisher; no connection is made yet.
    #[must_use]
    pub fn new(connector: Arc<dyn QueueConnector>, policy: RetryPolicy) -> Self {
        Self {
            connector,
            policy,
            channel: OnceCell::new(),
        }
    }

    /// Return the shared channel, establishing it with bounded retries on
    /// first use.
    ///
    /// Call this at process start: an error here means the queue stayed
    /// unreachable for every attempt, which is fatal for the API process.
    ///
    /// # Errors
    ///
    /// Returns the last [`EventBusError::ConnectionFailed`] once the retry
    /// policy is exhausted.
    pub async fn connect(&self) -> Result<Arc<dyn EventChannel>, EventBusError> {
        self.channel
            .get_or_try_init(|| async {
                let channel =
                    with_retry(&self.policy, "queue connect", || self.connector.connect())
                        .await?;
                tracing::info!(topic = channel.topic(), "Queue channel established");
                Ok(channel)
            })
            .await
            .map(Arc::clone)
    }

    /// Whether the channel has been established.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.channel.initialized()
    }

    /// Publish `event`, logging and swallowing any failure.
    pub async fn publish(&self, event: &PlanEvent) -> PublishOutcome {
        match self.try_publish(event).await {
            Ok(()) => {
                PlanMetrics::record_published(event.kind);
                tracing::debug!(event = %event.kind, object_id = %event.object_id, event_id = %event.event_id, "Event published");
                PublishOutcome::Delivered
            }
            Err(error) => {
                PlanMetrics::record_publish_failure();
                tracing::error!(
                    event = %event.kind,
                    object_id = %event.object_id,
                    event_id = %event.event_id,
                    error = %error,
                    "Failed to publish event, dropping it"
                );
                PublishOutcome::Dropped
            }
        }
    }

    async fn try_publish(&self, event: &PlanEvent) -> Result<(), EventBusError> {
        let payload = event
            .to_bytes()
            .map_err(|e| EventBusError::DeserializationFailed(e.to_string()))?;
        let channel = self.connect().await?;
        channel.publish(payload).await
    }
}

impl std::fmt::Debug for EventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventPublisher")
            .field("policy", &self.policy)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}
