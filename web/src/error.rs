//! Error responses.
//!
//! Every failure leaves the adapter as JSON:
//!
//! ```json
//! { "code": "VALIDATION_FAILED", "message": "...", "errors": [{ "path": "/_org", "message": "is required" }] }
//! ```
//!
//! `errors` is present only for validation failures.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use plan_registry_core::error::{ErrorKind, PlanError};
use plan_registry_core::validation::FieldError;
use serde::Serialize;
use std::fmt;

/// Application error type for web handlers.
#[derive(Debug)]
pub struct AppError {
    /// HTTP status code
    status: StatusCode,
    /// Error message (user-facing)
    message: String,
    /// Error code (for client error handling)
    code: String,
    /// Field-level validation errors
    errors: Option<Vec<FieldError>>,
    /// Internal error (for logging, not exposed to client)
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub const fn new(status: StatusCode, message: String, code: String) -> Self {
        Self {
            status,
            message,
            code,
            errors: None,
            source: None,
        }
    }

    /// Attach the underlying error for logging.
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// Create a 400 Bad Request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message.into(), "BAD_REQUEST".to_string())
    }

    /// Create a 500 Internal Server Error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            message.into(),
            "INTERNAL_SERVER_ERROR".to_string(),
        )
    }

    /// HTTP status of this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Client-facing error code.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Status for each caller-facing failure kind.
const fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::ValidationFailed | ErrorKind::InvalidQuery => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::PreconditionFailed => StatusCode::PRECONDITION_FAILED,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::InvalidAggregate => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<PlanError> for AppError {
    fn from(err: PlanError) -> Self {
        let kind = err.kind();
        let mut app = Self::new(status_for(kind), err.to_string(), kind.as_str().to_string());
        match err {
            PlanError::ValidationFailed { errors } => app.errors = Some(errors),
            PlanError::StoreUnavailable { .. } | PlanError::InvalidAggregate(_) => {
                app = app.with_source(anyhow::Error::new(err));
            }
            _ => {}
        }
        app
    }
}

/// Convert `anyhow::Error` to `AppError`.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal("An internal error occurred").with_source(err)
    }
}

/// Error response body (JSON).
#[derive(Debug, Serialize)]
struct ErrorResponse {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<Vec<FieldError>>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            match &self.source {
                Some(source) => tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    error = %source,
                    "Request failed"
                ),
                None => tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    message = %self.message,
                    "Request failed"
                ),
            }
        }

        let body = ErrorResponse {
            code: self.code,
            message: self.message,
            errors: self.errors,
        };

        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plan_registry_core::error::{Operation, PipelineStep};
    use plan_registry_core::store::StoreError;

    #[test]
    fn test_error_display() {
        let err = AppError::bad_request("Search query is required");
        assert_eq!(err.to_string(), "[BAD_REQUEST] Search query is required");
    }

    #[test]
    fn validation_failures_keep_field_errors() {
        let err = AppError::from(PlanError::ValidationFailed {
            errors: vec![FieldError {
                path: "/_org".into(),
                message: "is required".into(),
            }],
        });
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "VALIDATION_FAILED");
        assert_eq!(err.errors.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn kinds_map_to_statuses() {
        assert_eq!(AppError::from(PlanError::not_found("P1")).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::from(PlanError::InvalidQuery("empty".into())).status(),
            StatusCode::BAD_REQUEST
        );
        let conflict = AppError::from(PlanError::Conflict {
            object_id: "A1".into(),
            key: "planservice:A1".into(),
        });
        assert_eq!(conflict.status(), StatusCode::CONFLICT);
        assert_eq!(conflict.code(), "CONFLICT");

        let unavailable = AppError::from(PlanError::StoreUnavailable {
            operation: Operation::Create,
            last_completed: PipelineStep::PrimaryWritten,
            source: StoreError::Unavailable("index offline".into()),
        });
        assert_eq!(unavailable.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(unavailable.code(), "STORE_UNAVAILABLE");
        assert!(std::error::Error::source(&unavailable).is_some());
    }
}
