//! Schema validation collaborator.
//!
//! Requests are checked against the plan contract before anything touches a
//! store. [`PlanSchemaValidator`] collects every violation, not only the
//! first, and reports each with a JSON-pointer path.
//!
//! Unknown properties are accepted everywhere; they are preserved through
//! both stores.
//!
//! Every objectId in one aggregate must be distinct, whatever the kinds of
//! the entities carrying it: index documents are addressed by the bare
//! objectId, so two entities sharing one would overwrite each other.

use crate::plan::{LINKED_PLAN_SERVICES, LINKED_SERVICE, PLANSERVICE_COST_SHARES, PLAN_COST_SHARES};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// One schema violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// JSON pointer to the offending value (`/linkedPlanServices/0/_org`).
    pub path: String,
    /// What is wrong.
    pub message: String,
}

impl FieldError {
    fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result of validating a document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Every violation found.
    pub errors: Vec<FieldError>,
}

impl ValidationReport {
    /// Whether the document satisfies the contract.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Convert into a `Result`, yielding the errors on failure.
    ///
    /// # Errors
    ///
    /// Returns the collected [`FieldError`]s when the report is not valid.
    pub fn into_result(self) -> Result<(), Vec<FieldError>> {
        if self.errors.is_empty() { Ok(()) } else { Err(self.errors) }
    }
}

/// Validates documents against a schema contract.
pub trait Validator: Send + Sync {
    /// Check `data`, collecting all violations.
    fn validate(&self, data: &Value) -> ValidationReport;
}

/// The plan contract.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanSchemaValidator;

impl Validator for PlanSchemaValidator {
    fn validate(&self, data: &Value) -> ValidationReport {
        let mut errors = Vec::new();
        let Some(plan) = expect_object(data, "", &mut errors) else {
            return ValidationReport { errors };
        };

        check_identity(plan, "", &mut errors);
        for field in ["planType", "creationDate"] {
            optional_string(plan, "", field, &mut errors);
        }

        if let Some(cost_share) = plan.get(PLAN_COST_SHARES) {
            check_cost_share(cost_share, &pointer("", PLAN_COST_SHARES), &mut errors);
        }

        match plan.get(LINKED_PLAN_SERVICES) {
            None => {}
            Some(Value::Array(associations)) => {
                let base = pointer("", LINKED_PLAN_SERVICES);
                for (i, association) in associations.iter().enumerate() {
                    check_association(association, &format!("{base}/{i}"), &mut errors);
                }
            }
            Some(_) => errors.push(FieldError::new(
                pointer("", LINKED_PLAN_SERVICES),
                "must be an array",
            )),
        }

        check_unique_ids(plan, &mut errors);
        ValidationReport { errors }
    }
}

fn check_association(value: &Value, path: &str, errors: &mut Vec<FieldError>) {
    let Some(association) = expect_object(value, path, errors) else {
        return;
    };
    check_identity(association, path, errors);

    if let Some(service) = association.get(LINKED_SERVICE) {
        let service_path = pointer(path, LINKED_SERVICE);
        if let Some(service) = expect_object(service, &service_path, errors) {
            check_identity(service, &service_path, errors);
            required_string(service, &service_path, "name", errors);
        }
    }
    if let Some(cost_share) = association.get(PLANSERVICE_COST_SHARES) {
        check_cost_share(cost_share, &pointer(path, PLANSERVICE_COST_SHARES), errors);
    }
}

fn check_cost_share(value: &Value, path: &str, errors: &mut Vec<FieldError>) {
    let Some(cost_share) = expect_object(value, path, errors) else {
        return;
    };
    check_identity(cost_share, path, errors);
    for field in ["deductible", "copay"] {
        match cost_share.get(field) {
            Some(Value::Number(_)) => {}
            Some(_) => errors.push(FieldError::new(pointer(path, field), "must be a number")),
            None => errors.push(FieldError::new(pointer(path, field), "is required")),
        }
    }
}

/// Walks the aggregate in decomposition order and flags every objectId
/// already claimed by an earlier entity.
fn check_unique_ids(plan: &Map<String, Value>, errors: &mut Vec<FieldError>) {
    let mut claimed = ClaimedIds::default();
    claimed.claim(plan, "", errors);
    if let Some(cost_share) = child(plan, PLAN_COST_SHARES) {
        claimed.claim(cost_share, &pointer("", PLAN_COST_SHARES), errors);
    }
    let Some(associations) = plan.get(LINKED_PLAN_SERVICES).and_then(Value::as_array) else {
        return;
    };
    let base = pointer("", LINKED_PLAN_SERVICES);
    for (i, association) in associations.iter().enumerate() {
        let Some(association) = association.as_object() else {
            continue;
        };
        let path = format!("{base}/{i}");
        claimed.claim(association, &path, errors);
        if let Some(service) = child(association, LINKED_SERVICE) {
            claimed.claim(service, &pointer(&path, LINKED_SERVICE), errors);
        }
        if let Some(cost_share) = child(association, PLANSERVICE_COST_SHARES) {
            claimed.claim(cost_share, &pointer(&path, PLANSERVICE_COST_SHARES), errors);
        }
    }
}

fn child<'a>(entity: &'a Map<String, Value>, field: &str) -> Option<&'a Map<String, Value>> {
    entity.get(field).and_then(Value::as_object)
}

/// objectId -> path of the entity that first used it.
#[derive(Default)]
struct ClaimedIds(HashMap<String, String>);

impl ClaimedIds {
    fn claim(&mut self, entity: &Map<String, Value>, path: &str, errors: &mut Vec<FieldError>) {
        let Some(id) = entity.get("objectId").and_then(Value::as_str) else {
            return;
        };
        if let Some(first) = self.0.get(id) {
            errors.push(FieldError::new(
                pointer(path, "objectId"),
                format!("duplicates the objectId at {}", display_path(first)),
            ));
        } else {
            self.0.insert(id.to_string(), path.to_string());
        }
    }
}

/// `objectId`, `objectType` and `_org` are required on every entity.
fn check_identity(entity: &Map<String, Value>, path: &str, errors: &mut Vec<FieldError>) {
    if let Some(id) = required_string(entity, path, "objectId", errors) {
        if id.trim().is_empty() {
            errors.push(FieldError::new(pointer(path, "objectId"), "must not be empty"));
        } else if id.contains(':') {
            errors.push(FieldError::new(pointer(path, "objectId"), "must not contain ':'"));
        }
    }
    required_string(entity, path, "objectType", errors);
    required_string(entity, path, "_org", errors);
}

fn expect_object<'a>(
    value: &'a Value,
    path: &str,
    errors: &mut Vec<FieldError>,
) -> Option<&'a Map<String, Value>> {
    let object = value.as_object();
    if object.is_none() {
        errors.push(FieldError::new(display_path(path), "must be an object"));
    }
    object
}

fn required_string<'a>(
    entity: &'a Map<String, Value>,
    path: &str,
    field: &str,
    errors: &mut Vec<FieldError>,
) -> Option<&'a str> {
    match entity.get(field) {
        Some(Value::String(s)) => Some(s),
        Some(_) => {
            errors.push(FieldError::new(pointer(path, field), "must be a string"));
            None
        }
        None => {
            errors.push(FieldError::new(pointer(path, field), "is required"));
            None
        }
    }
}

fn optional_string(entity: &Map<String, Value>, path: &str, field: &str, errors: &mut Vec<FieldError>) {
    if entity.get(field).is_some_and(|v| !v.is_string()) {
        errors.push(FieldError::new(pointer(path, field), "must be a string"));
    }
}

fn pointer(path: &str, field: &str) -> String {
    format!("{path}/{}", field.replace('~', "~0").replace('/', "~1"))
}

fn display_path(path: &str) -> String {
    if path.is_empty() { "/".into() } else { path.into() }
}
