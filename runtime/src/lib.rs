//! # Plan Registry Runtime
//!
//! The I/O side of the plan registry: the per-request consistency pipeline
//! and the event plumbing around it.
//!
//! ## Components
//!
//! - **Orchestrator** ([`orchestrator`]): create/read/update/delete/search
//!   across the primary store, the index and the event stream
//! - **Publisher** ([`publisher`]): best-effort, process-wide event publisher
//! - **Consumer** ([`consumer`]): decodes and dispatches consumed events
//! - **Retry** ([`retry`]): bounded retry for queue connections
//! - **Metrics** ([`metrics`]): Prometheus recorder and metric names
//!
//! ## Example
//!
//! ```ignore
//! use plan_registry_runtime::{ConsistencyOrchestrator, EventPublisher, RetryPolicy};
//!
//! let publisher = Arc::new(EventPublisher::new(connector, RetryPolicy::default()));
//! publisher.connect().await?;
//!
//! let orchestrator = ConsistencyOrchestrator::new(
//!     primary, index, publisher, Arc::new(PlanSchemaValidator), Arc::new(SystemClock),
//! );
//! let created = orchestrator.create(plan_json).await?;
//! println!("ETag: {}", created.token);
//! ```

/// Event consumer and listener trait
pub mod consumer;

/// Prometheus metrics for observability
pub mod metrics;

/// Per-request consistency pipeline
pub mod orchestrator;

/// Best-effort event publisher
pub mod publisher;

/// Bounded retry for connection establishment
pub mod retry;

pub use consumer::{
    EventConsumer, ListenerError, ListenerFuture, LoggingListener, PlanEventHandler, PlanEventListener,
};
pub use orchestrator::{ConsistencyOrchestrator, Created, Deleted, ReadOutcome, Updated};
pub use publisher::{EventPublisher, PublishOutcome};
pub use retry::RetryPolicy;
