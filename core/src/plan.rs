//! The plan aggregate and its sub-entities.
//!
//! Field names follow the JSON contract clients send (`objectId`, `_org`,
//! `linkedPlanServices`, ...). Every entity keeps unknown properties in an
//! `extra` map so nothing a client stored is lost on the way through either
//! store.
//!
//! Numbers are kept as [`serde_json::Number`] rather than `f64` so that a
//! deductible sent as `2000` is read back as `2000`, not `2000.0`.

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

/// Free-form JSON attributes of an entity.
pub type Attributes = serde_json::Map<String, Value>;

/// JSON key of the root-level cost share.
pub const PLAN_COST_SHARES: &str = "planCostShares";
/// JSON key of the association list.
pub const LINKED_PLAN_SERVICES: &str = "linkedPlanServices";
/// JSON key of an association's service.
pub const LINKED_SERVICE: &str = "linkedService";
/// JSON key of an association's cost share.
pub const PLANSERVICE_COST_SHARES: &str = "planserviceCostShares";

/// Deductible and copay terms.
///
/// The same entity kind appears at the root of a plan and inside each
/// association.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostShare {
    /// Identifier, unique among cost shares.
    pub object_id: String,
    /// Declared type (usually `membercostshare`).
    pub object_type: String,
    /// Owning organisation.
    #[serde(rename = "_org")]
    pub org: String,
    /// Deductible amount.
    pub deductible: Number,
    /// Copay amount.
    pub copay: Number,
    /// Properties outside the contract.
    #[serde(flatten)]
    pub extra: Attributes,
}

impl CostShare {
    /// The entity's own attributes as a JSON object.
    #[must_use]
    pub fn own_attributes(&self) -> Attributes {
        let mut attrs = self.extra.clone();
        attrs.insert("objectId".into(), Value::String(self.object_id.clone()));
        attrs.insert("objectType".into(), Value::String(self.object_type.clone()));
        attrs.insert("_org".into(), Value::String(self.org.clone()));
        attrs.insert("deductible".into(), Value::Number(self.deductible.clone()));
        attrs.insert("copay".into(), Value::Number(self.copay.clone()));
        attrs
    }
}

/// The service an association points at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEntity {
    /// Identifier, unique among services.
    pub object_id: String,
    /// Declared type (usually `service`).
    pub object_type: String,
    /// Owning organisation.
    #[serde(rename = "_org")]
    pub org: String,
    /// Display name.
    pub name: String,
    /// Properties outside the contract.
    #[serde(flatten)]
    pub extra: Attributes,
}

impl ServiceEntity {
    /// The entity's own attributes as a JSON object.
    #[must_use]
    pub fn own_attributes(&self) -> Attributes {
        let mut attrs = self.extra.clone();
        attrs.insert("objectId".into(), Value::String(self.object_id.clone()));
        attrs.insert("objectType".into(), Value::String(self.object_type.clone()));
        attrs.insert("_org".into(), Value::String(self.org.clone()));
        attrs.insert("name".into(), Value::String(self.name.clone()));
        attrs
    }
}

/// Link from a plan to a service, with service-level cost terms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Association {
    /// Identifier, unique among associations.
    pub object_id: String,
    /// Declared type (usually `planservice`).
    pub object_type: String,
    /// Owning organisation.
    #[serde(rename = "_org")]
    pub org: String,
    /// The linked service, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_service: Option<ServiceEntity>,
    /// Service-level cost share, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planservice_cost_shares: Option<CostShare>,
    /// Properties outside the contract.
    #[serde(flatten)]
    pub extra: Attributes,
}

impl Association {
    /// The association's own attributes, without its nested entities.
    #[must_use]
    pub fn own_attributes(&self) -> Attributes {
        let mut attrs = self.extra.clone();
        attrs.insert("objectId".into(), Value::String(self.object_id.clone()));
        attrs.insert("objectType".into(), Value::String(self.object_type.clone()));
        attrs.insert("_org".into(), Value::String(self.org.clone()));
        attrs
    }

    /// Full nested JSON representation.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut attrs = self.own_attributes();
        if let Some(service) = &self.linked_service {
            attrs.insert(LINKED_SERVICE.into(), Value::Object(service.own_attributes()));
        }
        if let Some(cost_share) = &self.planservice_cost_shares {
            attrs.insert(
                PLANSERVICE_COST_SHARES.into(),
                Value::Object(cost_share.own_attributes()),
            );
        }
        Value::Object(attrs)
    }
}

/// A benefit plan: the aggregate root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanAggregate {
    /// Identifier, unique among plans.
    pub object_id: String,
    /// Declared type (usually `plan`).
    pub object_type: String,
    /// Owning organisation.
    #[serde(rename = "_org")]
    pub org: String,
    /// Plan type, e.g. `inNetwork`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_type: Option<String>,
    /// Creation date as sent by the client (`dd-MM-yyyy`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<String>,
    /// Root-level cost share, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_cost_shares: Option<CostShare>,
    /// Linked services, in client order.
    #[serde(default)]
    pub linked_plan_services: Vec<Association>,
    /// Properties outside the contract.
    #[serde(flatten)]
    pub extra: Attributes,
}

impl PlanAggregate {
    /// Parse an aggregate from JSON.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error when the value does not have the
    /// aggregate's shape.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// The root's own attributes, without nested entities.
    #[must_use]
    pub fn own_attributes(&self) -> Attributes {
        let mut attrs = self.extra.clone();
        attrs.insert("objectId".into(), Value::String(self.object_id.clone()));
        attrs.insert("objectType".into(), Value::String(self.object_type.clone()));
        attrs.insert("_org".into(), Value::String(self.org.clone()));
        if let Some(plan_type) = &self.plan_type {
            attrs.insert("planType".into(), Value::String(plan_type.clone()));
        }
        if let Some(creation_date) = &self.creation_date {
            attrs.insert("creationDate".into(), Value::String(creation_date.clone()));
        }
        attrs
    }

    /// Full nested JSON representation.
    ///
    /// Matches what `serde_json::to_value` produces for this type, without
    /// the fallible path.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut attrs = self.own_attributes();
        if let Some(cost_share) = &self.plan_cost_shares {
            attrs.insert(PLAN_COST_SHARES.into(), Value::Object(cost_share.own_attributes()));
        }
        attrs.insert(
            LINKED_PLAN_SERVICES.into(),
            Value::Array(self.linked_plan_services.iter().map(Association::to_value).collect()),
        );
        Value::Object(attrs)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "planCostShares": {
                "deductible": 2000,
                "_org": "example.com",
                "copay": 23,
                "objectId": "1234vxc2324sdf-501",
                "objectType": "membercostshare"
            },
            "linkedPlanServices": [{
                "linkedService": {
                    "_org": "example.com",
                    "objectId": "1234520xvc30asdf-502",
                    "objectType": "service",
                    "name": "Yearly physical"
                },
                "planserviceCostShares": {
                    "deductible": 10,
                    "_org": "example.com",
                    "copay": 0,
                    "objectId": "1234512xvc1314asdfs-503",
                    "objectType": "membercostshare"
                },
                "_org": "example.com",
                "objectId": "27283xvx9asdff-504",
                "objectType": "planservice"
            }],
            "_org": "example.com",
            "objectId": "12xvxc345ssdsds-508",
            "objectType": "plan",
            "planType": "inNetwork",
            "creationDate": "12-12-2017",
            "tier": "gold"
        })
    }

    #[test]
    fn parses_contract_fields_and_keeps_extras() {
        let plan = PlanAggregate::from_value(sample()).unwrap();
        assert_eq!(plan.object_id, "12xvxc345ssdsds-508");
        assert_eq!(plan.org, "example.com");
        assert_eq!(plan.extra.get("tier"), Some(&json!("gold")));
        assert_eq!(plan.linked_plan_services.len(), 1);
        assert_eq!(
            plan.linked_plan_services[0].linked_service.as_ref().unwrap().name,
            "Yearly physical"
        );
    }

    #[test]
    fn to_value_matches_serde_serialization() {
        let plan = PlanAggregate::from_value(sample()).unwrap();
        assert_eq!(plan.to_value(), serde_json::to_value(&plan).unwrap());
        assert_eq!(plan.to_value(), sample());
    }

    #[test]
    fn integers_are_not_widened_to_floats() {
        let plan = PlanAggregate::from_value(sample()).unwrap();
        let cost_share = plan.plan_cost_shares.unwrap();
        assert_eq!(cost_share.own_attributes()["deductible"].to_string(), "2000");
    }

    #[test]
    fn own_attributes_exclude_nested_entities() {
        let plan = PlanAggregate::from_value(sample()).unwrap();
        let attrs = plan.own_attributes();
        assert!(!attrs.contains_key(PLAN_COST_SHARES));
        assert!(!attrs.contains_key(LINKED_PLAN_SERVICES));

        let association = &plan.linked_plan_services[0];
        let attrs = association.own_attributes();
        assert!(!attrs.contains_key(LINKED_SERVICE));
        assert!(!attrs.contains_key(PLANSERVICE_COST_SHARES));
    }

    #[test]
    fn optional_substructures_may_be_absent() {
        let plan = PlanAggregate::from_value(json!({
            "objectId": "p",
            "objectType": "plan",
            "_org": "example.com"
        }))
        .unwrap();
        assert!(plan.plan_cost_shares.is_none());
        assert!(plan.linked_plan_services.is_empty());
    }
}
