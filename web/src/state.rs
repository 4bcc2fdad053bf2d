//! Application state shared by the HTTP handlers.

use plan_registry_runtime::ConsistencyOrchestrator;
use std::sync::Arc;

/// State handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Pipeline behind every plan route.
    pub orchestrator: Arc<ConsistencyOrchestrator>,
}

impl AppState {
    /// Wrap an orchestrator.
    #[must_use]
    pub const fn new(orchestrator: Arc<ConsistencyOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_is_clone() {
        fn assert_clone<T: Clone + Send + Sync + 'static>() {}
        assert_clone::<AppState>();
    }
}
