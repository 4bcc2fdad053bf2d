//! Integration tests for the event publisher and consumer.
//!
//! These drive the publisher through the orchestrator and the consumer
//! through [`InMemoryQueue`], covering connection retries, channel reuse
//! and message dispositions.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use chrono::Utc;
use plan_registry_core::event::{PlanEvent, PlanEventKind};
use plan_registry_core::event_bus::EventBusError;
use plan_registry_runtime::{
    EventConsumer, EventPublisher, ListenerError, ListenerFuture, LoggingListener,
    PlanEventListener, PublishOutcome,
};
use plan_registry_testing::fixtures::scenario_plan;
use plan_registry_testing::{InMemoryQueue, TestRegistry};
use std::sync::{Arc, Mutex};

/// Listener that records what it sees and can refuse updates.
#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<(PlanEventKind, String)>>,
    reject_updates: bool,
}

impl Recorder {
    fn seen(&self) -> Vec<(PlanEventKind, String)> {
        self.seen.lock().unwrap().clone()
    }

    fn push<'a>(&'a self, event: &'a PlanEvent) -> ListenerFuture<'a> {
        Box::pin(async move {
            self.seen.lock().unwrap().push((event.kind, event.object_id.clone()));
            Ok(())
        })
    }
}

impl PlanEventListener for Recorder {
    fn on_created<'a>(&'a self, event: &'a PlanEvent) -> ListenerFuture<'a> {
        self.push(event)
    }

    fn on_updated<'a>(&'a self, event: &'a PlanEvent) -> ListenerFuture<'a> {
        if self.reject_updates {
            return Box::pin(async { Err(ListenerError("projection offline".into())) });
        }
        self.push(event)
    }

    fn on_deleted<'a>(&'a self, event: &'a PlanEvent) -> ListenerFuture<'a> {
        self.push(event)
    }
}

// ============================================================================
// Publisher
// ============================================================================

#[tokio::test]
async fn publisher_connects_lazily_and_reuses_the_channel() {
    let queue = InMemoryQueue::new();
    let publisher = EventPublisher::new(Arc::new(queue.clone()), TestRegistry::fast_retry());
    assert!(!publisher.is_connected());
    assert_eq!(queue.connect_attempts(), 0);

    for _ in 0..3 {
        let outcome = publisher.publish(&PlanEvent::deleted("P1", Utc::now())).await;
        assert_eq!(outcome, PublishOutcome::Delivered);
    }

    assert!(publisher.is_connected());
    assert_eq!(queue.connect_attempts(), 1);
    assert_eq!(queue.published().len(), 3);
}

#[tokio::test]
async fn publisher_retries_connection_within_the_policy() {
    let queue = InMemoryQueue::new();
    queue.fail_next_connects(2);
    let publisher = EventPublisher::new(Arc::new(queue.clone()), TestRegistry::fast_retry());

    publisher.connect().await.unwrap();
    assert_eq!(queue.connect_attempts(), 3);
}

#[tokio::test]
async fn publisher_gives_up_after_the_last_attempt() {
    let queue = InMemoryQueue::new();
    queue.fail_next_connects(10);
    let publisher = EventPublisher::new(Arc::new(queue.clone()), TestRegistry::fast_retry());

    let error = publisher.connect().await.unwrap_err();
    assert!(matches!(error, EventBusError::ConnectionFailed(_)), "{error:?}");
    assert_eq!(queue.connect_attempts(), 3);
    assert!(!publisher.is_connected());
}

#[tokio::test]
async fn unreachable_queue_drops_the_event_but_keeps_the_write() {
    let registry = TestRegistry::new();
    registry.queue.fail_next_connects(10);

    registry.orchestrator.create(scenario_plan()).await.unwrap();
    assert_eq!(registry.primary.len(), 6);
    assert!(registry.queue.published().is_empty());
    assert!(!registry.publisher.is_connected());
}

#[tokio::test]
async fn publish_failure_is_reported_as_dropped() {
    let queue = InMemoryQueue::new();
    let publisher = EventPublisher::new(Arc::new(queue.clone()), TestRegistry::fast_retry());
    queue.set_publish_failing(true);

    let outcome = publisher.publish(&PlanEvent::deleted("P1", Utc::now())).await;
    assert_eq!(outcome, PublishOutcome::Dropped);

    queue.set_publish_failing(false);
    let outcome = publisher.publish(&PlanEvent::deleted("P1", Utc::now())).await;
    assert_eq!(outcome, PublishOutcome::Delivered);
    assert_eq!(queue.connect_attempts(), 1);
}

// ============================================================================
// Consumer
// ============================================================================

#[tokio::test]
async fn consumer_receives_the_pipeline_events_in_order() {
    let registry = TestRegistry::new();
    let created = registry.orchestrator.create(scenario_plan()).await.unwrap();
    registry
        .orchestrator
        .update("P1", serde_json::json!({ "planType": "outOfNetwork" }), Some(created.token.as_str()))
        .await
        .unwrap();
    registry.orchestrator.delete("P1").await.unwrap();

    let recorder = Arc::new(Recorder::default());
    let consumer = EventConsumer::new(
        Arc::new(registry.queue.clone()),
        TestRegistry::fast_retry(),
        recorder.clone(),
    );
    consumer.run().await.unwrap();

    assert_eq!(
        recorder.seen(),
        vec![
            (PlanEventKind::Created, "P1".to_string()),
            (PlanEventKind::Updated, "P1".to_string()),
            (PlanEventKind::Deleted, "P1".to_string()),
        ]
    );
    assert_eq!(registry.queue.acked().len(), 3);
    assert!(registry.queue.nacked().is_empty());
    assert_eq!(registry.queue.pending(), 0);
}

#[tokio::test]
async fn consumer_nacks_malformed_and_failed_messages() {
    let queue = InMemoryQueue::new();
    queue.inject(b"not an event".to_vec());
    queue.inject(PlanEvent::updated("P1", scenario_plan(), Utc::now()).to_bytes().unwrap());
    queue.inject(PlanEvent::deleted("P1", Utc::now()).to_bytes().unwrap());

    let recorder = Arc::new(Recorder {
        reject_updates: true,
        ..Recorder::default()
    });
    let consumer = EventConsumer::new(Arc::new(queue.clone()), TestRegistry::fast_retry(), recorder.clone());
    consumer.run().await.unwrap();

    assert_eq!(queue.nacked().len(), 2);
    assert_eq!(queue.acked().len(), 1);
    assert_eq!(recorder.seen(), vec![(PlanEventKind::Deleted, "P1".to_string())]);
}

#[tokio::test]
async fn consumer_fails_when_the_queue_stays_unreachable() {
    let queue = InMemoryQueue::new();
    queue.fail_next_connects(10);
    queue.inject(PlanEvent::deleted("P1", Utc::now()).to_bytes().unwrap());

    let consumer = EventConsumer::new(
        Arc::new(queue.clone()),
        TestRegistry::fast_retry(),
        Arc::new(LoggingListener),
    );
    let error = consumer.run().await.unwrap_err();

    assert!(matches!(error, EventBusError::ConnectionFailed(_)));
    assert_eq!(queue.connect_attempts(), 3);
    assert_eq!(queue.pending(), 1);
}

#[tokio::test]
async fn consumer_survives_a_broker_restart() {
    let queue = InMemoryQueue::new();
    queue.fail_next_connects(1);
    queue.inject(PlanEvent::created("P1", scenario_plan(), Utc::now()).to_bytes().unwrap());

    let consumer = EventConsumer::new(
        Arc::new(queue.clone()),
        TestRegistry::fast_retry(),
        Arc::new(LoggingListener),
    );
    consumer.run().await.unwrap();

    assert_eq!(queue.connect_attempts(), 2);
    assert_eq!(queue.acked().len(), 1);
}
