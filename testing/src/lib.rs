//! # Plan Registry Testing
//!
//! In-memory collaborators and fixtures for testing the plan registry
//! without Redis, Elasticsearch or a broker.
//!
//! This crate provides:
//! - [`InMemoryPrimaryStore`] and [`InMemoryIndexStore`] (join-aware)
//! - [`InMemoryQueue`] with connect/publish failure injection
//! - [`FixedClock`] for deterministic event timestamps
//! - [`fixtures`] for plan documents and [`TestRegistry`] for a wired
//!   orchestrator
//!
//! ## Example
//!
//! ```
//! use plan_registry_testing::{TestRegistry, fixtures};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = TestRegistry::new();
//! let created = registry.orchestrator.create(fixtures::scenario_plan()).await?;
//! registry.orchestrator.delete(&created.object_id).await?;
//! assert!(registry.index.is_empty());
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use plan_registry_core::environment::Clock;

/// Deterministic stand-ins for environment traits.
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use plan_registry_testing::mocks::FixedClock;
    /// use plan_registry_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

pub mod fixtures;
pub mod harness;
pub mod queue;
pub mod stores;

// Re-export commonly used items
pub use harness::TestRegistry;
pub use mocks::{FixedClock, test_clock};
pub use queue::{InMemoryChannel, InMemoryQueue};
pub use stores::{InMemoryIndexStore, InMemoryPrimaryStore};
