//! Queue abstraction for plan change events.
//!
//! The publisher and the consumer only need two logical operations from the
//! queue: publish a message, and consume messages one at a time with an
//! explicit acknowledgement. [`QueueConnector`] establishes a channel (the
//! step that is retried with a bounded policy), [`EventChannel`] is the
//! established, shareable channel.
//!
//! # Delivery
//!
//! ```text
//! ┌──────────────┐  publish   ┌─────────────┐  consume   ┌──────────────────┐
//! │ Orchestrator │───────────►│    Queue    │───────────►│  MessageHandler  │
//! └──────────────┘ best-effort└─────────────┘  one at a  └────────┬─────────┘
//!                                    ▲          time              │
//!                                    └──────── Ack / Nack ────────┘
//! ```
//!
//! - **At-least-once**: a message may be redelivered; handlers must be
//!   idempotent (events carry an `eventId` for deduplication)
//! - **Nack**: the message is handed back to the broker (requeue or
//!   dead-letter, depending on the implementation)
//!
//! # Implementations
//!
//! - `InMemoryQueue` in `plan-registry-testing`
//! - `RedpandaConnector` in `plan-registry-redpanda`

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during queue operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventBusError {
    /// Failed to connect to the broker
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to publish a message
    #[error("Publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// The topic that failed
        topic: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to subscribe or receive messages
    #[error("Subscription failed for topic '{topic}': {reason}")]
    SubscriptionFailed {
        /// The topic that failed
        topic: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to decode a message
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    /// Failed to acknowledge a message
    #[error("Acknowledgement failed: {0}")]
    AckFailed(String),
}

/// Boxed future returned by queue operations.
pub type BusFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, EventBusError>> + Send + 'a>>;

/// Outcome of handling one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Processed; remove from the queue.
    Ack,
    /// Not processed; return to the broker.
    Nack,
}

impl Disposition {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ack => "ack",
            Self::Nack => "nack",
        }
    }
}

/// Processes consumed messages.
pub trait MessageHandler: Send + Sync {
    /// Handle one raw message payload.
    fn handle(&self, payload: Vec<u8>) -> Pin<Box<dyn Future<Output = Disposition> + Send + '_>>;
}

/// An established queue channel, shared by all publishers in a process.
pub trait EventChannel: Send + Sync {
    /// Name of the queue/topic this channel is bound to.
    fn topic(&self) -> &str;

    /// Publish one message.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::PublishFailed`] if the broker does not
    /// accept the message.
    fn publish(&self, payload: Vec<u8>) -> BusFuture<'_, ()>;

    /// Consume messages one at a time until the stream ends or fails,
    /// acknowledging each according to the handler's [`Disposition`].
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::SubscriptionFailed`] when consumption cannot
    /// start or is interrupted.
    fn consume(&self, handler: Arc<dyn MessageHandler>) -> BusFuture<'_, ()>;
}

impl std::fmt::Debug for dyn EventChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventChannel").field("topic", &self.topic()).finish()
    }
}

/// Establishes channels.
pub trait QueueConnector: Send + Sync {
    /// Open a channel, declaring the durable queue if needed.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] when the broker is
    /// unreachable.
    fn connect(&self) -> BusFuture<'_, Arc<dyn EventChannel>>;
}
