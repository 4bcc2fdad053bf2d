//! Plan event consumer.
//!
//! The consumer process connects with the same bounded retry policy as the
//! publisher, then handles messages one at a time:
//!
//! ```text
//! payload ──► PlanEvent::from_bytes ──► listener.on_created / on_updated / on_deleted
//!                   │ error                        │ Ok        │ Err
//!                   ▼                              ▼           ▼
//!                  Nack                           Ack         Nack
//! ```
//!
//! A negative acknowledgement hands the message back to the broker, which
//! decides between requeue and dead-letter. Malformed payloads are nacked
//! once, not retried here.

use crate::metrics::PlanMetrics;
use crate::retry::{RetryPolicy, with_retry};
use plan_registry_core::event::{PlanEvent, PlanEventKind};
use plan_registry_core::event_bus::{Disposition, EventBusError, MessageHandler, QueueConnector};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// A listener could not process an event.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Listener failed: {0}")]
pub struct ListenerError(pub String);

/// Boxed future returned by listener callbacks.
pub type ListenerFuture<'a> = Pin<Box<dyn Future<Output = Result<(), ListenerError>> + Send + 'a>>;

/// Reacts to plan change events.
///
/// Delivery is at-least-once: implementations should be idempotent, using
/// [`PlanEvent::event_id`] to detect duplicates where that matters.
pub trait PlanEventListener: Send + Sync {
    /// A plan was created.
    fn on_created<'a>(&'a self, event: &'a PlanEvent) -> ListenerFuture<'a>;

    /// A plan was updated.
    fn on_updated<'a>(&'a self, event: &'a PlanEvent) -> ListenerFuture<'a>;

    /// A plan was deleted.
    fn on_deleted<'a>(&'a self, event: &'a PlanEvent) -> ListenerFuture<'a>;
}

/// Listener that only logs what it receives.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingListener;

impl PlanEventListener for LoggingListener {
    fn on_created<'a>(&'a self, event: &'a PlanEvent) -> ListenerFuture<'a> {
        Box::pin(async move {
            tracing::info!(object_id = %event.object_id, event_id = %event.event_id, "Plan created");
            Ok(())
        })
    }

    fn on_updated<'a>(&'a self, event: &'a PlanEvent) -> ListenerFuture<'a> {
        Box::pin(async move {
            tracing::info!(object_id = %event.object_id, event_id = %event.event_id, "Plan updated");
            Ok(())
        })
    }

    fn on_deleted<'a>(&'a self, event: &'a PlanEvent) -> ListenerFuture<'a> {
        Box::pin(async move {
            tracing::info!(object_id = %event.object_id, event_id = %event.event_id, "Plan deleted");
            Ok(())
        })
    }
}

/// Decodes raw messages and dispatches them to a listener by kind.
#[derive(Clone)]
pub struct PlanEventHandler {
    listener: Arc<dyn PlanEventListener>,
}

impl PlanEventHandler {
    /// Wrap `listener`.
    #[must_use]
    pub fn new(listener: Arc<dyn PlanEventListener>) -> Self {
        Self { listener }
    }

    async fn dispatch(&self, payload: &[u8]) -> Disposition {
        let event = match PlanEvent::from_bytes(payload) {
            Ok(event) => event,
            Err(error) => {
                tracing::warn!(error = %error, bytes = payload.len(), "Malformed event payload");
                return Disposition::Nack;
            }
        };

        let result = match event.kind {
            PlanEventKind::Created => self.listener.on_created(&event).await,
            PlanEventKind::Updated => self.listener.on_updated(&event).await,
            PlanEventKind::Deleted => self.listener.on_deleted(&event).await,
        };

        match result {
            Ok(()) => Disposition::Ack,
            Err(error) => {
                tracing::error!(
                    event = %event.kind,
                    object_id = %event.object_id,
                    event_id = %event.event_id,
                    error = %error,
                    "Event processing failed"
                );
                Disposition::Nack
            }
        }
    }
}

impl MessageHandler for PlanEventHandler {
    fn handle(&self, payload: Vec<u8>) -> Pin<Box<dyn Future<Output = Disposition> + Send + '_>> {
        Box::pin(async move {
            let disposition = self.dispatch(&payload).await;
            PlanMetrics::record_consumed(disposition);
            disposition
        })
    }
}

/// Long-running consumer: connect, then consume until the stream ends.
pub struct EventConsumer {
    connector: Arc<dyn QueueConnector>,
    policy: RetryPolicy,
    handler: Arc<PlanEventHandler>,
}

impl EventConsumer {
    /// Create a consumer dispatching to `listener`.
    #[must_use]
    pub fn new(
        connector: Arc<dyn QueueConnector>,
        policy: RetryPolicy,
        listener: Arc<dyn PlanEventListener>,
    ) -> Self {
        Self {
            connector,
            policy,
            handler: Arc::new(PlanEventHandler::new(listener)),
        }
    }

    /// Connect (with bounded retries) and consume.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] when every connection
    /// attempt failed, or the channel's error if consumption breaks off.
    pub async fn run(&self) -> Result<(), EventBusError> {
        let channel =
            with_retry(&self.policy, "queue connect", || self.connector.connect()).await?;
        tracing::info!(topic = channel.topic(), "Consuming plan events");
        let handler: Arc<dyn MessageHandler> = self.handler.clone();
        channel.consume(handler).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<(PlanEventKind, String)>>,
        fail_on_delete: bool,
    }

    impl Recording {
        fn record<'a>(&'a self, event: &'a PlanEvent) -> ListenerFuture<'a> {
            Box::pin(async move {
                if self.fail_on_delete && event.kind == PlanEventKind::Deleted {
                    return Err(ListenerError("downstream unavailable".into()));
                }
                self.seen.lock().unwrap().push((event.kind, event.object_id.clone()));
                Ok(())
            })
        }
    }

    impl PlanEventListener for Recording {
        fn on_created<'a>(&'a self, event: &'a PlanEvent) -> ListenerFuture<'a> {
            self.record(event)
        }
        fn on_updated<'a>(&'a self, event: &'a PlanEvent) -> ListenerFuture<'a> {
            self.record(event)
        }
        fn on_deleted<'a>(&'a self, event: &'a PlanEvent) -> ListenerFuture<'a> {
            self.record(event)
        }
    }

    #[tokio::test]
    async fn dispatches_by_kind_and_acks() {
        let listener = Arc::new(Recording::default());
        let handler = PlanEventHandler::new(listener.clone());

        let created = PlanEvent::created("P1", json!({ "objectId": "P1" }), Utc::now());
        let deleted = PlanEvent::deleted("P1", Utc::now());
        assert_eq!(handler.handle(created.to_bytes().unwrap()).await, Disposition::Ack);
        assert_eq!(handler.handle(deleted.to_bytes().unwrap()).await, Disposition::Ack);

        let seen = listener.seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                (PlanEventKind::Created, "P1".to_string()),
                (PlanEventKind::Deleted, "P1".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn malformed_payload_is_nacked() {
        let handler = PlanEventHandler::new(Arc::new(LoggingListener));
        assert_eq!(handler.handle(b"{not json".to_vec()).await, Disposition::Nack);
        assert_eq!(
            handler.handle(br#"{"event":"PLAN_RENAMED","objectId":"P1"}"#.to_vec()).await,
            Disposition::Nack
        );
    }

    #[tokio::test]
    async fn listener_failure_is_nacked() {
        let listener = Arc::new(Recording {
            fail_on_delete: true,
            ..Recording::default()
        });
        let handler = PlanEventHandler::new(listener);
        let deleted = PlanEvent::deleted("P1", Utc::now());
        assert_eq!(handler.handle(deleted.to_bytes().unwrap()).await, Disposition::Nack);
    }
}
