//! Liveness endpoint.

use axum::http::StatusCode;

/// Returns 200 `ok` while the process is serving requests.
///
/// Dependencies are not checked: the stores are probed at startup and
/// their outages surface per request as 503.
///
/// ```text
/// GET /health
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}
