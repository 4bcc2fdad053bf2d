//! Redpanda event channel for the plan registry.
//!
//! Implements [`QueueConnector`] and [`EventChannel`] over any
//! Kafka-compatible broker with `rdkafka`.
//!
//! # Topics
//!
//! ```text
//! orchestrator ──publish──► plan_events ──consume──► PlanEventHandler
//!                                                         │ Nack
//!                                                         ▼
//!                                                  plan_events.dlq
//! ```
//!
//! Messages are keyed by the event's `objectId`, so every event about one
//! plan lands in the same partition and is consumed in publish order.
//!
//! # Delivery Semantics
//!
//! **At-least-once** with manual offset commits:
//! - An offset is committed only after the handler returned
//! - A nacked message is forwarded to the dead-letter topic before its
//!   offset is committed; if forwarding fails, consumption stops without
//!   committing and the message is redelivered on restart
//! - A crash between handling and commit redelivers the message
//!
//! # Example
//!
//! ```no_run
//! use plan_registry_redpanda::RedpandaConnector;
//! use plan_registry_core::event_bus::QueueConnector;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let connector = RedpandaConnector::builder()
//!     .brokers("localhost:9092")
//!     .topic("plan_events")
//!     .consumer_group("plan-consumer")
//!     .build()?;
//! let channel = connector.connect().await?;
//! channel.publish(br#"{"event":"PLAN_DELETED","objectId":"P1"}"#.to_vec()).await?;
//! # Ok(())
//! # }
//! ```

use plan_registry_core::event_bus::{
    BusFuture, Disposition, EventBusError, EventChannel, MessageHandler, QueueConnector,
};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use std::sync::Arc;
use std::time::Duration;

/// Suffix of the dead-letter topic.
pub const DEAD_LETTER_SUFFIX: &str = ".dlq";

/// Connector that opens [`RedpandaChannel`]s.
///
/// Building the connector makes no network call; [`connect`](QueueConnector::connect)
/// creates the producer and probes the brokers, so it fails (and can be
/// retried) while the cluster is unreachable.
#[derive(Debug, Clone)]
pub struct RedpandaConnector {
    brokers: String,
    topic: String,
    consumer_group: String,
    producer_acks: String,
    compression: String,
    timeout: Duration,
    auto_offset_reset: String,
}

impl RedpandaConnector {
    /// Create a new builder for configuring the connector.
    #[must_use]
    pub fn builder() -> RedpandaConnectorBuilder {
        RedpandaConnectorBuilder::default()
    }

    /// Broker addresses.
    #[must_use]
    pub fn brokers(&self) -> &str {
        &self.brokers
    }

    /// Event topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Dead-letter topic for nacked messages.
    #[must_use]
    pub fn dead_letter_topic(&self) -> String {
        format!("{}{DEAD_LETTER_SUFFIX}", self.topic)
    }

    fn producer(&self) -> Result<FutureProducer, EventBusError> {
        ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("message.timeout.ms", "5000")
            .set("acks", &self.producer_acks)
            .set("compression.type", &self.compression)
            .create()
            .map_err(|e| EventBusError::ConnectionFailed(format!("Failed to create producer: {e}")))
    }
}

impl QueueConnector for RedpandaConnector {
    fn connect(&self) -> BusFuture<'_, Arc<dyn EventChannel>> {
        Box::pin(async move {
            let producer = self.producer()?;

            // Metadata requests block, so the probe runs off the async workers.
            let probe = producer.clone();
            let topic = self.topic.clone();
            let timeout = self.timeout;
            tokio::task::spawn_blocking(move || {
                probe
                    .client()
                    .fetch_metadata(Some(&topic), Timeout::After(timeout))
                    .map(|_| ())
            })
            .await
            .map_err(|e| EventBusError::ConnectionFailed(format!("Broker probe aborted: {e}")))?
            .map_err(|e| EventBusError::ConnectionFailed(format!("Brokers unreachable: {e}")))?;

            tracing::info!(
                brokers = %self.brokers,
                topic = %self.topic,
                acks = %self.producer_acks,
                "Connected to Redpanda"
            );

            let channel: Arc<dyn EventChannel> = Arc::new(RedpandaChannel {
                producer,
                config: self.clone(),
            });
            Ok(channel)
        })
    }
}

/// Builder for configuring a [`RedpandaConnector`].
///
/// # Example
///
/// ```no_run
/// use plan_registry_redpanda::RedpandaConnector;
/// use std::time::Duration;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let connector = RedpandaConnector::builder()
///     .brokers("localhost:9092,localhost:9093")
///     .topic("plan_events")
///     .producer_acks("all")
///     .timeout(Duration::from_secs(10))
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct RedpandaConnectorBuilder {
    brokers: Option<String>,
    topic: Option<String>,
    consumer_group: Option<String>,
    producer_acks: Option<String>,
    compression: Option<String>,
    timeout: Option<Duration>,
    auto_offset_reset: Option<String>,
}

impl RedpandaConnectorBuilder {
    /// Set the broker addresses (comma-separated).
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Set the event topic.
    ///
    /// Default: `plan_events`
    #[must_use]
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Set the consumer group shared by consumer instances.
    ///
    /// Default: `plan-consumer`
    #[must_use]
    pub fn consumer_group(mut self, consumer_group: impl Into<String>) -> Self {
        self.consumer_group = Some(consumer_group.into());
        self
    }

    /// Set the producer acknowledgment mode: "0", "1" or "all".
    ///
    /// Default: "all"
    #[must_use]
    pub fn producer_acks(mut self, acks: impl Into<String>) -> Self {
        self.producer_acks = Some(acks.into());
        self
    }

    /// Set the compression codec.
    ///
    /// Default: "none"
    #[must_use]
    pub fn compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self
    }

    /// Set the send and broker-probe timeout.
    ///
    /// Default: 5 seconds
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set where a new consumer group starts reading.
    ///
    /// Default: "earliest", so events published before the first consumer
    /// started are still delivered.
    #[must_use]
    pub fn auto_offset_reset(mut self, policy: impl Into<String>) -> Self {
        self.auto_offset_reset = Some(policy.into());
        self
    }

    /// Build the connector.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if no brokers are
    /// configured.
    pub fn build(self) -> Result<RedpandaConnector, EventBusError> {
        let brokers = self
            .brokers
            .filter(|b| !b.trim().is_empty())
            .ok_or_else(|| EventBusError::ConnectionFailed("Brokers not configured".to_string()))?;

        Ok(RedpandaConnector {
            brokers,
            topic: self.topic.unwrap_or_else(|| "plan_events".to_string()),
            consumer_group: self.consumer_group.unwrap_or_else(|| "plan-consumer".to_string()),
            producer_acks: self.producer_acks.unwrap_or_else(|| "all".to_string()),
            compression: self.compression.unwrap_or_else(|| "none".to_string()),
            timeout: self.timeout.unwrap_or(Duration::from_secs(5)),
            auto_offset_reset: self.auto_offset_reset.unwrap_or_else(|| "earliest".to_string()),
        })
    }
}

/// An established channel: a shared producer plus the settings for
/// creating a consumer.
pub struct RedpandaChannel {
    producer: FutureProducer,
    config: RedpandaConnector,
}

impl RedpandaChannel {
    async fn send(&self, topic: &str, payload: &[u8]) -> Result<(i32, i64), EventBusError> {
        let key = partition_key(payload);
        let mut record: FutureRecord<'_, str, [u8]> = FutureRecord::to(topic).payload(payload);
        if let Some(key) = key.as_deref() {
            record = record.key(key);
        }
        self.producer
            .send(record, Timeout::After(self.config.timeout))
            .await
            .map_err(|(kafka_error, _)| EventBusError::PublishFailed {
                topic: topic.to_string(),
                reason: kafka_error.to_string(),
            })
    }

    fn consumer(&self) -> Result<StreamConsumer, EventBusError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.config.brokers)
            .set("group.id", &self.config.consumer_group)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", &self.config.auto_offset_reset)
            .set("session.timeout.ms", "6000")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(|e| self.subscription_error(format!("Failed to create consumer: {e}")))?;
        consumer
            .subscribe(&[self.config.topic.as_str()])
            .map_err(|e| self.subscription_error(format!("Failed to subscribe: {e}")))?;
        Ok(consumer)
    }

    fn subscription_error(&self, reason: String) -> EventBusError {
        EventBusError::SubscriptionFailed {
            topic: self.config.topic.clone(),
            reason,
        }
    }
}

impl EventChannel for RedpandaChannel {
    fn topic(&self) -> &str {
        &self.config.topic
    }

    fn publish(&self, payload: Vec<u8>) -> BusFuture<'_, ()> {
        Box::pin(async move {
            let (partition, offset) = self.send(&self.config.topic, &payload).await?;
            tracing::debug!(
                topic = %self.config.topic,
                partition = partition,
                offset = offset,
                "Message published"
            );
            Ok(())
        })
    }

    fn consume(&self, handler: Arc<dyn MessageHandler>) -> BusFuture<'_, ()> {
        use futures::StreamExt;

        Box::pin(async move {
            let consumer = self.consumer()?;
            let dead_letter_topic = self.config.dead_letter_topic();
            tracing::info!(
                topic = %self.config.topic,
                consumer_group = %self.config.consumer_group,
                dead_letter_topic = %dead_letter_topic,
                manual_commit = true,
                "Subscribed to topic"
            );

            let mut stream = consumer.stream();
            while let Some(received) = stream.next().await {
                let message = match received {
                    Ok(message) => message,
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to receive message");
                        continue;
                    }
                };

                let payload = message.payload().map(<[u8]>::to_vec).unwrap_or_default();
                if handler.handle(payload.clone()).await == Disposition::Nack {
                    self.send(&dead_letter_topic, &payload).await.map_err(|e| {
                        EventBusError::AckFailed(format!(
                            "Could not dead-letter offset {} of partition {}: {e}",
                            message.offset(),
                            message.partition()
                        ))
                    })?;
                    tracing::warn!(
                        partition = message.partition(),
                        offset = message.offset(),
                        dead_letter_topic = %dead_letter_topic,
                        "Message dead-lettered"
                    );
                }

                if let Err(e) = consumer.commit_message(&message, CommitMode::Async) {
                    tracing::warn!(
                        partition = message.partition(),
                        offset = message.offset(),
                        error = %e,
                        "Failed to commit offset (message may be redelivered)"
                    );
                }
            }

            tracing::debug!("Consumer stream ended");
            Ok(())
        })
    }
}

/// Partition key of an event payload: its `objectId`, if it has one.
#[must_use]
pub fn partition_key(payload: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(payload).ok()?;
    value.get("objectId")?.as_str().map(str::to_string)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn connector_and_channel_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}

        assert_send_sync::<RedpandaConnector>();
        assert_send_sync::<RedpandaChannel>();
    }

    #[test]
    fn build_requires_brokers() {
        let result = RedpandaConnector::builder().topic("plan_events").build();
        assert!(matches!(result, Err(EventBusError::ConnectionFailed(_))));

        let result = RedpandaConnector::builder().brokers("  ").build();
        assert!(result.is_err());
    }

    #[test]
    fn defaults_and_dead_letter_topic() {
        let connector = RedpandaConnector::builder().brokers("localhost:9092").build().unwrap();
        assert_eq!(connector.topic(), "plan_events");
        assert_eq!(connector.dead_letter_topic(), "plan_events.dlq");
        assert_eq!(connector.consumer_group, "plan-consumer");
        assert_eq!(connector.auto_offset_reset, "earliest");
    }

    #[test]
    fn events_are_keyed_by_object_id() {
        assert_eq!(
            partition_key(br#"{"event":"PLAN_DELETED","objectId":"P1"}"#).as_deref(),
            Some("P1")
        );
        assert_eq!(partition_key(b"not json"), None);
        assert_eq!(partition_key(br#"{"objectId":7}"#), None);
    }

    #[test]
    fn unreachable_brokers_fail_to_connect() {
        let connector = RedpandaConnector::builder()
            .brokers("127.0.0.1:1")
            .timeout(Duration::from_millis(200))
            .build()
            .unwrap();
        let result = tokio_test::block_on(connector.connect());
        assert!(matches!(result, Err(EventBusError::ConnectionFailed(_))));
    }
}
