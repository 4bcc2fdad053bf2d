//! Plan routes, mounted under `/api/v1/plan`.
//!
//! | Route | Success | Failure |
//! |---|---|---|
//! | `POST /` | 201 `{message, objectId}` + `ETag` | 400 invalid plan, 409 objectId owned by another plan |
//! | `GET /:id` | 200 aggregate + `ETag`, 304 if `If-None-Match` is current | 404 |
//! | `PATCH /:id` | 200 merged aggregate + new `ETag` | 400, 404, 409, 412 stale or weak `If-Match` |
//! | `DELETE /:id` | 204 | 404 |
//! | `POST /search` | 200 `{message, results}` | 400 missing or unsupported query |
//!
//! Store outages answer 503 on every route.

use crate::error::AppError;
use crate::extractors::{IfMatch, IfNoneMatch};
use crate::state::AppState;
use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use plan_registry_core::store::SearchHit;
use plan_registry_core::version::VersionToken;
use plan_registry_runtime::ReadOutcome;
use serde::Serialize;
use serde_json::Value;

/// Body of a successful create.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedResponse {
    /// Confirmation text.
    pub message: &'static str,
    /// Root objectId of the stored plan.
    pub object_id: String,
}

/// Body of a successful search.
#[derive(Debug, Serialize)]
pub struct SearchResponse {
    /// Confirmation text.
    pub message: &'static str,
    /// Matching index documents, in index order.
    pub results: Vec<SearchHit>,
}

/// Plan routes, relative to their mount point.
#[must_use]
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_plan))
        .route("/search", post(search_plans))
        .route("/:object_id", get(get_plan).patch(patch_plan).delete(delete_plan))
}

fn json_body(payload: Result<Json<Value>, JsonRejection>) -> Result<Value, AppError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| AppError::bad_request(rejection.body_text()))
}

fn etag(token: &VersionToken) -> Result<[(header::HeaderName, HeaderValue); 1], AppError> {
    let value = HeaderValue::from_str(token.as_str())
        .map_err(|e| AppError::internal("Version token is not a valid header").with_source(e.into()))?;
    Ok([(header::ETAG, value)])
}

/// `POST /api/v1/plan`
///
/// # Errors
///
/// 400 for malformed JSON or an invalid plan, 409 if an objectId belongs
/// to another plan, 503 if a store is down.
pub async fn create_plan(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, AppError> {
    let created = state.orchestrator.create(json_body(payload)?).await?;
    let headers = etag(&created.token)?;
    let body = CreatedResponse {
        message: "Plan stored successfully",
        object_id: created.object_id,
    };
    Ok((StatusCode::CREATED, headers, Json(body)).into_response())
}

/// `GET /api/v1/plan/:object_id`
///
/// # Errors
///
/// 404 if the plan is absent, 503 if the primary store is down.
pub async fn get_plan(
    State(state): State<AppState>,
    Path(object_id): Path<String>,
    IfNoneMatch(if_none_match): IfNoneMatch,
) -> Result<Response, AppError> {
    match state
        .orchestrator
        .read(&object_id, if_none_match.as_deref())
        .await?
    {
        ReadOutcome::Unchanged { token } => Ok((StatusCode::NOT_MODIFIED, etag(&token)?).into_response()),
        ReadOutcome::Found { aggregate, token } => {
            Ok((StatusCode::OK, etag(&token)?, Json(aggregate)).into_response())
        }
    }
}

/// `PATCH /api/v1/plan/:object_id`
///
/// # Errors
///
/// 400 for an invalid patch, 404 if the plan is absent, 409 if the patch
/// adds another plan's objectId, 412 if `If-Match` is stale, 503 if a store
/// is down.
pub async fn patch_plan(
    State(state): State<AppState>,
    Path(object_id): Path<String>,
    IfMatch(if_match): IfMatch,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, AppError> {
    let patch = json_body(payload)?;
    let updated = state
        .orchestrator
        .update(&object_id, patch, if_match.as_deref())
        .await?;
    Ok((StatusCode::OK, etag(&updated.token)?, Json(updated.aggregate)).into_response())
}

/// `DELETE /api/v1/plan/:object_id`
///
/// # Errors
///
/// 404 if the plan is absent, 503 if a store is down.
pub async fn delete_plan(
    State(state): State<AppState>,
    Path(object_id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.orchestrator.delete(&object_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/v1/plan/search`
///
/// # Errors
///
/// 400 when the body has no `query` or the query is unsupported, 503 if
/// the index is down.
pub async fn search_plans(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<SearchResponse>, AppError> {
    let body = json_body(payload)?;
    let query = body
        .get("query")
        .filter(|q| !q.is_null())
        .ok_or_else(|| AppError::bad_request("Missing query in request body"))?;
    let results = state.orchestrator.search(query).await?;
    Ok(Json(SearchResponse {
        message: "Search successful",
        results,
    }))
}
