//! A fully wired registry over in-memory collaborators.

use crate::mocks::{FixedClock, test_clock};
use crate::queue::InMemoryQueue;
use crate::stores::{InMemoryIndexStore, InMemoryPrimaryStore};
use plan_registry_core::validation::PlanSchemaValidator;
use plan_registry_runtime::{ConsistencyOrchestrator, EventPublisher, RetryPolicy};
use std::sync::Arc;
use std::time::Duration;

/// Orchestrator plus handles on every collaborator it writes to.
///
/// # Example
///
/// ```
/// use plan_registry_testing::{TestRegistry, fixtures};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let registry = TestRegistry::new();
/// registry.orchestrator.create(fixtures::scenario_plan()).await?;
/// assert_eq!(registry.primary.len(), 6);
/// assert_eq!(registry.index.len(), 6);
/// # Ok(())
/// # }
/// ```
pub struct TestRegistry {
    /// The orchestrator under test.
    pub orchestrator: Arc<ConsistencyOrchestrator>,
    /// Primary store contents.
    pub primary: InMemoryPrimaryStore,
    /// Index contents.
    pub index: InMemoryIndexStore,
    /// Queue contents.
    pub queue: InMemoryQueue,
    /// Publisher shared by the orchestrator.
    pub publisher: Arc<EventPublisher>,
    /// Clock used for event timestamps.
    pub clock: FixedClock,
}

impl Default for TestRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TestRegistry {
    /// Registry whose index supports filtered deletes.
    #[must_use]
    pub fn new() -> Self {
        Self::with_index(InMemoryIndexStore::new())
    }

    /// Registry over a specific index store.
    #[must_use]
    pub fn with_index(index: InMemoryIndexStore) -> Self {
        let primary = InMemoryPrimaryStore::new();
        let queue = InMemoryQueue::new();
        let clock = test_clock();
        let publisher = Arc::new(EventPublisher::new(
            Arc::new(queue.clone()),
            Self::fast_retry(),
        ));
        let orchestrator = Arc::new(ConsistencyOrchestrator::new(
            Arc::new(primary.clone()),
            Arc::new(index.clone()),
            Arc::clone(&publisher),
            Arc::new(PlanSchemaValidator),
            Arc::new(clock.clone()),
        ));
        Self {
            orchestrator,
            primary,
            index,
            queue,
            publisher,
            clock,
        }
    }

    /// Three attempts, one millisecond apart.
    #[must_use]
    pub const fn fast_retry() -> RetryPolicy {
        RetryPolicy::fixed(3, Duration::from_millis(1))
    }
}
