//! Plan change events.
//!
//! Every successful mutation emits one [`PlanEvent`]. Events travel as JSON
//! so that any consumer, not only Rust services, can read them:
//!
//! ```json
//! {
//!   "event": "PLAN_CREATED",
//!   "eventId": "1b4e28ba-2fa1-11d2-883f-0016d3cca427",
//!   "objectId": "12xvxc345ssdsds-508",
//!   "occurredAt": "2024-01-01T00:00:00Z",
//!   "data": { "objectId": "12xvxc345ssdsds-508", "...": "..." }
//! }
//! ```
//!
//! `data` carries the full aggregate for creates and updates and is absent
//! for deletes. Delivery is at-least-once, so consumers deduplicate on
//! `eventId`.
//!
//! # Example
//!
//! ```
//! use plan_registry_core::event::{PlanEvent, PlanEventKind};
//! use chrono::Utc;
//!
//! let event = PlanEvent::deleted("P1", Utc::now());
//! let bytes = event.to_bytes().unwrap();
//! let decoded = PlanEvent::from_bytes(&bytes).unwrap();
//! assert_eq!(decoded.kind, PlanEventKind::Deleted);
//! assert_eq!(decoded.object_id, "P1");
//! ```

use crate::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Error types for event encoding.
#[derive(Error, Debug)]
pub enum EventError {
    /// Failed to serialize event to bytes.
    #[error("Failed to serialize event: {0}")]
    SerializationError(String),

    /// Failed to deserialize event from bytes (including unknown kinds).
    #[error("Failed to deserialize event: {0}")]
    DeserializationError(String),
}

/// What happened to the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlanEventKind {
    /// A plan was created.
    #[serde(rename = "PLAN_CREATED")]
    Created,
    /// A plan was patched.
    #[serde(rename = "PLAN_UPDATED")]
    Updated,
    /// A plan and all its descendants were removed.
    #[serde(rename = "PLAN_DELETED")]
    Deleted,
}

impl PlanEventKind {
    /// Wire name (`PLAN_CREATED`, ...).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "PLAN_CREATED",
            Self::Updated => "PLAN_UPDATED",
            Self::Deleted => "PLAN_DELETED",
        }
    }
}

impl fmt::Display for PlanEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A plan change event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanEvent {
    /// What happened.
    #[serde(rename = "event")]
    pub kind: PlanEventKind,
    /// Unique id of this emission, for consumer-side deduplication.
    pub event_id: Uuid,
    /// Root objectId of the affected plan.
    pub object_id: String,
    /// When the mutation completed.
    pub occurred_at: DateTime<Utc>,
    /// Aggregate after the mutation (absent for deletes).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl PlanEvent {
    /// Create an event with a fresh `eventId`.
    #[must_use]
    pub fn new(
        kind: PlanEventKind,
        object_id: impl Into<String>,
        data: Option<Value>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            event_id: Uuid::new_v4(),
            object_id: object_id.into(),
            occurred_at,
            data,
        }
    }

    /// `PLAN_CREATED` carrying the new aggregate.
    #[must_use]
    pub fn created(object_id: impl Into<String>, data: Value, occurred_at: DateTime<Utc>) -> Self {
        Self::new(PlanEventKind::Created, object_id, Some(data), occurred_at)
    }

    /// `PLAN_UPDATED` carrying the merged aggregate.
    #[must_use]
    pub fn updated(object_id: impl Into<String>, data: Value, occurred_at: DateTime<Utc>) -> Self {
        Self::new(PlanEventKind::Updated, object_id, Some(data), occurred_at)
    }

    /// `PLAN_DELETED`.
    #[must_use]
    pub fn deleted(object_id: impl Into<String>, occurred_at: DateTime<Utc>) -> Self {
        Self::new(PlanEventKind::Deleted, object_id, None, occurred_at)
    }

    /// Encode as JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::SerializationError`] if encoding fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, EventError> {
        serde_json::to_vec(self).map_err(|e| EventError::SerializationError(e.to_string()))
    }

    /// Decode from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::DeserializationError`] for malformed payloads
    /// and unknown event kinds.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EventError> {
        serde_json::from_slice(bytes).map_err(|e| EventError::DeserializationError(e.to_string()))
    }
}

impl fmt::Display for PlanEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}) [{}]", self.kind, self.object_id, self.event_id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn wire_format_uses_screaming_kind_and_camel_case_fields() {
        let event = PlanEvent::created("P1", json!({ "objectId": "P1" }), at());
        let wire: Value = serde_json::from_slice(&event.to_bytes().unwrap()).unwrap();
        assert_eq!(wire["event"], "PLAN_CREATED");
        assert_eq!(wire["objectId"], "P1");
        assert_eq!(wire["occurredAt"], "2024-01-01T00:00:00Z");
        assert_eq!(wire["data"]["objectId"], "P1");
        assert!(wire["eventId"].is_string());
    }

    #[test]
    fn delete_events_omit_data() {
        let event = PlanEvent::deleted("P1", at());
        let wire: Value = serde_json::from_slice(&event.to_bytes().unwrap()).unwrap();
        assert!(wire.get("data").is_none());
        assert_eq!(PlanEvent::from_bytes(&event.to_bytes().unwrap()).unwrap(), event);
    }

    #[test]
    fn each_emission_gets_its_own_id() {
        let a = PlanEvent::deleted("P1", at());
        let b = PlanEvent::deleted("P1", at());
        assert_ne!(a.event_id, b.event_id);
    }

    #[test]
    fn unknown_kind_and_garbage_are_rejected() {
        let unknown = br#"{"event":"PLAN_ARCHIVED","eventId":"1b4e28ba-2fa1-11d2-883f-0016d3cca427","objectId":"P1","occurredAt":"2024-01-01T00:00:00Z"}"#;
        assert!(matches!(
            PlanEvent::from_bytes(unknown),
            Err(EventError::DeserializationError(_))
        ));
        assert!(PlanEvent::from_bytes(b"not json").is_err());
    }
}
