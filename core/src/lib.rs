//! # Plan Registry Core
//!
//! Core types and pure logic for the plan registry.
//!
//! A plan is a hierarchical aggregate: a root entity with an optional cost
//! share and a list of linked-service associations, each carrying its own
//! service reference and cost share. The registry keeps two stores in step
//! (a per-key primary store and a parent/child search index) and publishes
//! change events. This crate holds everything that does not perform I/O:
//!
//! - **Model** ([`plan`]): the nested aggregate and its sub-entities
//! - **Decomposition** ([`decompose`]): flattening an aggregate into
//!   addressable records (and back)
//! - **Index projection** ([`index`]): join-structured documents, routing
//!   keys and cascade-delete filters
//! - **Version tokens** ([`version`]): content fingerprints for optimistic
//!   concurrency
//! - **Events** ([`event`]): the change-event envelope
//! - **Collaborators** ([`store`], [`event_bus`], [`validation`]): the
//!   logical interfaces of the primary store, index store, queue and schema
//!   validator
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐    ┌─────────────┐    ┌──────────────────┐
//! │  Aggregate   │───►│ Decomposer  │───►│ Sub-entity list  │
//! └──────────────┘    └─────────────┘    └────────┬─────────┘
//!                                                 │
//!                        ┌────────────────────────┼───────────────────┐
//!                        ▼                        ▼                   ▼
//!               ┌─────────────────┐     ┌──────────────────┐   ┌────────────┐
//!               │  Primary store  │     │ Index projector  │   │  Version   │
//!               │  (kind:id keys) │     │ (join documents) │   │   token    │
//!               └─────────────────┘     └──────────────────┘   └────────────┘
//! ```
//!
//! The orchestration of these pieces (the per-request pipeline) lives in
//! `plan-registry-runtime`.

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};

pub mod decompose;
pub mod error;
pub mod event;
pub mod event_bus;
pub mod index;
pub mod plan;
pub mod query;
pub mod store;
pub mod validation;
pub mod version;

pub use decompose::{decompose, recompose, EntityKey, EntityKind, SubEntityRecord};
pub use error::{ErrorKind, Operation, PipelineStep, PlanError};
pub use plan::{Association, Attributes, CostShare, PlanAggregate, ServiceEntity};
pub use version::VersionToken;

/// Environment module - Dependency injection traits
///
/// External sources of nondeterminism are abstracted behind traits and
/// injected into the runtime so tests can pin them.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use plan_registry_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let _now = clock.now();
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
