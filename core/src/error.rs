//! Caller-facing errors.
//!
//! Every failure a caller can observe is a [`PlanError`]. Each one has a
//! stable [`ErrorKind`] code and a human-readable message.
//!
//! A [`PlanError::StoreUnavailable`] records which step of the pipeline
//! last completed. Steps before the failure are not rolled back, so that
//! step tells an operator (or a reconciliation job) how far the two stores
//! got.

use crate::decompose::DecomposeError;
use crate::store::StoreError;
use crate::validation::FieldError;
use crate::version::PreconditionFailed;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Request-level operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Create a plan.
    Create,
    /// Read a plan.
    Read,
    /// Patch a plan.
    Update,
    /// Delete a plan and its descendants.
    Delete,
    /// Search the index.
    Search,
}

impl Operation {
    /// Lowercase name used in logs and metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Search => "search",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline step, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PipelineStep {
    /// Input accepted (and, for updates, precondition checked).
    Validated,
    /// Sub-entity records produced.
    Decomposed,
    /// Primary store reflects the request.
    PrimaryWritten,
    /// Index reflects the request.
    Indexed,
    /// Change event handed to the queue (or the attempt logged).
    Published,
    /// Token computed; request complete.
    Done,
}

impl PipelineStep {
    /// Step name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validated => "validated",
            Self::Decomposed => "decomposed",
            Self::PrimaryWritten => "primary_written",
            Self::Indexed => "indexed",
            Self::Published => "published",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Input rejected by the schema contract.
    ValidationFailed,
    /// No plan with that id.
    NotFound,
    /// Supplied version token is stale.
    PreconditionFailed,
    /// A store failed mid-pipeline.
    StoreUnavailable,
    /// Stored data could not be interpreted as an aggregate.
    InvalidAggregate,
    /// Search query missing or malformed.
    InvalidQuery,
    /// An objectId in the input already belongs to another plan.
    Conflict,
}

impl ErrorKind {
    /// The code string (`VALIDATION_FAILED`, ...).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::NotFound => "NOT_FOUND",
            Self::PreconditionFailed => "PRECONDITION_FAILED",
            Self::StoreUnavailable => "STORE_UNAVAILABLE",
            Self::InvalidAggregate => "INVALID_AGGREGATE",
            Self::InvalidQuery => "INVALID_QUERY",
            Self::Conflict => "CONFLICT",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-facing failure of a plan operation.
#[derive(Error, Debug)]
pub enum PlanError {
    /// The input does not satisfy the schema contract. Nothing was written.
    #[error("Validation failed with {} error(s)", .errors.len())]
    ValidationFailed {
        /// Field-level errors.
        errors: Vec<FieldError>,
    },

    /// The plan does not exist. Nothing was written.
    #[error("Plan not found: {object_id}")]
    NotFound {
        /// Requested plan id.
        object_id: String,
    },

    /// The caller's token is stale. Nothing was written.
    #[error(transparent)]
    PreconditionFailed(#[from] PreconditionFailed),

    /// A store failed; steps after `last_completed` did not run.
    #[error("{operation} aborted after step '{last_completed}': {source}")]
    StoreUnavailable {
        /// Operation that failed.
        operation: Operation,
        /// Last step that completed before the failure.
        last_completed: PipelineStep,
        /// Underlying store failure.
        #[source]
        source: StoreError,
    },

    /// Stored data is not a valid aggregate.
    #[error("Invalid aggregate: {0}")]
    InvalidAggregate(String),

    /// The search query is missing or malformed.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// An entity of the input is stored under `key` as part of another
    /// plan. Nothing was written.
    #[error("objectId {object_id} already belongs to another plan ({key})")]
    Conflict {
        /// The contested objectId.
        object_id: String,
        /// Primary-store key holding the other plan's entity.
        key: String,
    },
}

impl PlanError {
    /// Stable code of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::ValidationFailed { .. } => ErrorKind::ValidationFailed,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::PreconditionFailed(_) => ErrorKind::PreconditionFailed,
            Self::StoreUnavailable { .. } => ErrorKind::StoreUnavailable,
            Self::InvalidAggregate(_) => ErrorKind::InvalidAggregate,
            Self::InvalidQuery(_) => ErrorKind::InvalidQuery,
            Self::Conflict { .. } => ErrorKind::Conflict,
        }
    }

    /// `NotFound` for `object_id`.
    #[must_use]
    pub fn not_found(object_id: impl Into<String>) -> Self {
        Self::NotFound {
            object_id: object_id.into(),
        }
    }
}

impl From<DecomposeError> for PlanError {
    fn from(error: DecomposeError) -> Self {
        Self::InvalidAggregate(error.to_string())
    }
}
