//! HTTP adapter for the plan registry.
//!
//! A thin axum layer over
//! [`ConsistencyOrchestrator`](plan_registry_runtime::ConsistencyOrchestrator): it turns requests
//! into orchestrator calls, version tokens into `ETag`/`If-Match`/
//! `If-None-Match` headers, and [`PlanError`](plan_registry_core::error::PlanError)
//! kinds into status codes. All consistency logic lives below it.
//!
//! # Example
//!
//! ```ignore
//! use plan_registry_web::{AppState, app};
//!
//! let router = app(AppState::new(orchestrator));
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, router).await?;
//! ```

#![forbid(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod state;

pub use error::AppError;
pub use extractors::{IfMatch, IfNoneMatch};
pub use middleware::{CORRELATION_ID_HEADER, CorrelationId, correlation_id_layer};
pub use state::AppState;

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

/// Mount point of the plan routes.
pub const PLAN_BASE_PATH: &str = "/api/v1/plan";

/// The complete application router.
#[must_use]
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .nest(PLAN_BASE_PATH, handlers::plans::routes())
        .layer(TraceLayer::new_for_http())
        .layer(correlation_id_layer())
        .with_state(state)
}
