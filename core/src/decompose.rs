//! Aggregate decomposition.
//!
//! [`decompose`] flattens a nested [`PlanAggregate`] into an ordered list of
//! [`SubEntityRecord`]s, each addressable by its [`EntityKey`] and carrying a
//! reference to its direct parent. The same list drives primary-store writes,
//! index projection and cascade deletes, so both stores always see the same
//! entity set.
//!
//! # Order
//!
//! ```text
//! plan
//! ├── membercostshare          (root cost share, if present)
//! ├── planservice #0
//! │   ├── service              (if present)
//! │   └── membercostshare      (if present)
//! └── planservice #1 ...
//! ```
//!
//! [`recompose`] is the inverse: it rebuilds the nested aggregate from a
//! record list.

use crate::plan::{
    Attributes, CostShare, PlanAggregate, LINKED_PLAN_SERVICES, LINKED_SERVICE,
    PLANSERVICE_COST_SHARES, PLAN_COST_SHARES,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Kind of a sub-entity.
///
/// A cost share is one kind regardless of whether it sits at the root or
/// inside an association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    /// The aggregate root.
    Plan,
    /// Deductible/copay terms.
    CostShare,
    /// Link from a plan to a service.
    Association,
    /// The referenced service.
    Service,
}

impl EntityKind {
    /// Every kind, in decomposition order.
    pub const ALL: [Self; 4] = [Self::Plan, Self::CostShare, Self::Association, Self::Service];

    /// Name used in primary-store keys and as the index relation name.
    #[must_use]
    pub const fn storage_name(self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::CostShare => "membercostshare",
            Self::Association => "planservice",
            Self::Service => "service",
        }
    }

    /// Parse a storage name back into a kind.
    #[must_use]
    pub fn from_storage_name(name: &str) -> Option<Self> {
        match name {
            "plan" => Some(Self::Plan),
            "membercostshare" => Some(Self::CostShare),
            "planservice" => Some(Self::Association),
            "service" => Some(Self::Service),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.storage_name())
    }
}

/// Composite `(kind, objectId)` key, unique system-wide.
///
/// Renders as `{storage name}:{objectId}`, e.g. `plan:12xvxc345ssdsds-508`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey {
    /// Entity kind.
    pub kind: EntityKind,
    /// Object identifier.
    pub object_id: String,
}

impl EntityKey {
    /// Create a key.
    #[must_use]
    pub fn new(kind: EntityKind, object_id: impl Into<String>) -> Self {
        Self {
            kind,
            object_id: object_id.into(),
        }
    }

    /// Key of a plan root.
    #[must_use]
    pub fn plan(object_id: impl Into<String>) -> Self {
        Self::new(EntityKind::Plan, object_id)
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.object_id)
    }
}

impl FromStr for EntityKey {
    type Err = DecomposeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, object_id) = s
            .split_once(':')
            .ok_or_else(|| DecomposeError::InvalidKey(s.to_string()))?;
        let kind =
            EntityKind::from_storage_name(kind).ok_or_else(|| DecomposeError::InvalidKey(s.to_string()))?;
        if object_id.is_empty() {
            return Err(DecomposeError::InvalidKey(s.to_string()));
        }
        Ok(Self::new(kind, object_id))
    }
}

/// One flattened sub-entity.
#[derive(Debug, Clone, PartialEq)]
pub struct SubEntityRecord {
    /// Entity kind.
    pub kind: EntityKind,
    /// Object identifier.
    pub object_id: String,
    /// Direct decomposition parent; `None` for the root.
    pub parent_id: Option<String>,
    /// The entity's own attributes (nested entities stripped).
    pub payload: Attributes,
}

impl SubEntityRecord {
    /// Composite key of this record.
    #[must_use]
    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.kind, self.object_id.clone())
    }

    /// Whether this record is the aggregate root.
    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Payload with a `parentId` attribute, as stored for non-root keys.
    #[must_use]
    pub fn stored_attributes(&self) -> Attributes {
        let mut attrs = self.payload.clone();
        if let Some(parent_id) = &self.parent_id {
            attrs.insert("parentId".into(), Value::String(parent_id.clone()));
        }
        attrs
    }
}

/// Errors from decomposition and recomposition.
#[derive(Error, Debug)]
pub enum DecomposeError {
    /// No record without a parent.
    #[error("record set has no root")]
    MissingRoot,

    /// More than one record without a parent.
    #[error("record set has more than one root: {0:?}")]
    MultipleRoots(Vec<String>),

    /// A record whose parent is not in the set, or sits in a position its
    /// kind cannot occupy.
    #[error("record {kind}:{object_id} has no valid parent in the set")]
    Orphan {
        /// Kind of the orphan.
        kind: EntityKind,
        /// Identifier of the orphan.
        object_id: String,
    },

    /// A record payload that does not have its kind's shape.
    #[error("record {object_id} is malformed: {reason}")]
    Malformed {
        /// Identifier of the record.
        object_id: String,
        /// Parser message.
        reason: String,
    },

    /// A composite key that cannot be parsed.
    #[error("invalid entity key: {0}")]
    InvalidKey(String),
}

/// Flatten an aggregate into its ordered sub-entity records.
///
/// Absent optional substructures produce fewer records; that is not an
/// error.
#[must_use]
pub fn decompose(plan: &PlanAggregate) -> Vec<SubEntityRecord> {
    let root_id = plan.object_id.clone();
    let mut records = Vec::with_capacity(2 + plan.linked_plan_services.len() * 3);

    records.push(SubEntityRecord {
        kind: EntityKind::Plan,
        object_id: root_id.clone(),
        parent_id: None,
        payload: plan.own_attributes(),
    });

    if let Some(cost_share) = &plan.plan_cost_shares {
        records.push(cost_share_record(cost_share, &root_id));
    }

    for association in &plan.linked_plan_services {
        records.push(SubEntityRecord {
            kind: EntityKind::Association,
            object_id: association.object_id.clone(),
            parent_id: Some(root_id.clone()),
            payload: association.own_attributes(),
        });
        if let Some(service) = &association.linked_service {
            records.push(SubEntityRecord {
                kind: EntityKind::Service,
                object_id: service.object_id.clone(),
                parent_id: Some(association.object_id.clone()),
                payload: service.own_attributes(),
            });
        }
        if let Some(cost_share) = &association.planservice_cost_shares {
            records.push(cost_share_record(cost_share, &association.object_id));
        }
    }

    records
}

fn cost_share_record(cost_share: &CostShare, parent_id: &str) -> SubEntityRecord {
    SubEntityRecord {
        kind: EntityKind::CostShare,
        object_id: cost_share.object_id.clone(),
        parent_id: Some(parent_id.to_string()),
        payload: cost_share.own_attributes(),
    }
}

/// Rebuild the nested aggregate from a record list.
///
/// Records may arrive in any order; associations keep the relative order
/// they have in `records`.
///
/// # Errors
///
/// Returns [`DecomposeError`] when the set has zero or several roots, when
/// a record cannot be placed in the tree, or when a payload does not parse
/// as its kind.
pub fn recompose(records: &[SubEntityRecord]) -> Result<PlanAggregate, DecomposeError> {
    let roots: Vec<&SubEntityRecord> = records.iter().filter(|r| r.is_root()).collect();
    let root = match roots.as_slice() {
        [] => return Err(DecomposeError::MissingRoot),
        [root] => *root,
        many => {
            return Err(DecomposeError::MultipleRoots(
                many.iter().map(|r| r.object_id.clone()).collect(),
            ));
        }
    };
    if root.kind != EntityKind::Plan {
        return Err(DecomposeError::Orphan {
            kind: root.kind,
            object_id: root.object_id.clone(),
        });
    }

    let mut placed: HashSet<EntityKey> = HashSet::from([root.key()]);
    let mut plan = root.payload.clone();
    if let Some(cost_share) = children(records, &root.object_id, EntityKind::CostShare).next() {
        plan.insert(PLAN_COST_SHARES.into(), Value::Object(cost_share.payload.clone()));
        placed.insert(cost_share.key());
    }

    let mut associations = Vec::new();
    for association in children(records, &root.object_id, EntityKind::Association) {
        let mut attrs = association.payload.clone();
        if let Some(service) = children(records, &association.object_id, EntityKind::Service).next() {
            attrs.insert(LINKED_SERVICE.into(), Value::Object(service.payload.clone()));
            placed.insert(service.key());
        }
        if let Some(cost_share) =
            children(records, &association.object_id, EntityKind::CostShare).next()
        {
            attrs.insert(PLANSERVICE_COST_SHARES.into(), Value::Object(cost_share.payload.clone()));
            placed.insert(cost_share.key());
        }
        associations.push(Value::Object(attrs));
        placed.insert(association.key());
    }
    plan.insert(LINKED_PLAN_SERVICES.into(), Value::Array(associations));

    if let Some(orphan) = records.iter().find(|r| !placed.contains(&r.key())) {
        return Err(DecomposeError::Orphan {
            kind: orphan.kind,
            object_id: orphan.object_id.clone(),
        });
    }

    PlanAggregate::from_value(Value::Object(plan)).map_err(|e| DecomposeError::Malformed {
        object_id: root.object_id.clone(),
        reason: e.to_string(),
    })
}

fn children<'a>(
    records: &'a [SubEntityRecord],
    parent: &'a str,
    kind: EntityKind,
) -> impl Iterator<Item = &'a SubEntityRecord> + 'a {
    records
        .iter()
        .filter(move |r| r.kind == kind && r.parent_id.as_deref() == Some(parent))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn plan(associations: Vec<Value>, with_cost_share: bool) -> PlanAggregate {
        let mut value = json!({
            "objectId": "P1",
            "objectType": "plan",
            "_org": "example.com",
            "planType": "inNetwork",
            "linkedPlanServices": associations,
        });
        if with_cost_share {
            value["planCostShares"] = json!({
                "objectId": "C1", "objectType": "membercostshare", "_org": "example.com",
                "deductible": 2000, "copay": 23
            });
        }
        PlanAggregate::from_value(value).unwrap()
    }

    fn association(id: &str, service: bool, cost_share: bool) -> Value {
        let mut value = json!({ "objectId": id, "objectType": "planservice", "_org": "example.com" });
        if service {
            value["linkedService"] = json!({
                "objectId": format!("S-{id}"), "objectType": "service",
                "_org": "example.com", "name": "Yearly physical"
            });
        }
        if cost_share {
            value["planserviceCostShares"] = json!({
                "objectId": format!("CS-{id}"), "objectType": "membercostshare",
                "_org": "example.com", "deductible": 10, "copay": 0
            });
        }
        value
    }

    #[test]
    fn emits_records_in_fixed_order() {
        let plan = plan(
            vec![association("A1", true, true), association("A2", false, false)],
            true,
        );
        let keys: Vec<String> = decompose(&plan).iter().map(|r| r.key().to_string()).collect();
        assert_eq!(
            keys,
            vec![
                "plan:P1",
                "membercostshare:C1",
                "planservice:A1",
                "service:S-A1",
                "membercostshare:CS-A1",
                "planservice:A2",
            ]
        );
    }

    #[test]
    fn records_reference_direct_parent() {
        let plan = plan(vec![association("A1", true, true)], true);
        let records = decompose(&plan);
        let parents: Vec<Option<&str>> = records.iter().map(|r| r.parent_id.as_deref()).collect();
        assert_eq!(parents, vec![None, Some("P1"), Some("P1"), Some("A1"), Some("A1")]);
    }

    #[test]
    fn bare_root_yields_single_record() {
        let plan = plan(vec![], false);
        let records = decompose(&plan);
        assert_eq!(records.len(), 1);
        assert!(records[0].is_root());
    }

    #[test]
    fn stored_attributes_carry_parent_id() {
        let plan = plan(vec![association("A1", true, false)], false);
        let records = decompose(&plan);
        assert!(!records[0].stored_attributes().contains_key("parentId"));
        assert_eq!(records[2].stored_attributes()["parentId"], json!("A1"));
    }

    #[test]
    fn recompose_reverses_decompose() {
        let plan = plan(
            vec![association("A1", true, true), association("A2", false, true)],
            true,
        );
        let records = decompose(&plan);
        assert_eq!(recompose(&records).unwrap(), plan);
    }

    #[test]
    fn recompose_accepts_shuffled_records() {
        let plan = plan(vec![association("A1", true, true)], true);
        let mut records = decompose(&plan);
        records.reverse();
        assert_eq!(recompose(&records).unwrap(), plan);
    }

    #[test]
    fn recompose_rejects_orphans() {
        let plan = plan(vec![association("A1", true, false)], false);
        let mut records = decompose(&plan);
        records[2].parent_id = Some("missing".into());
        assert!(matches!(
            recompose(&records),
            Err(DecomposeError::Orphan { kind: EntityKind::Service, .. })
        ));
    }

    #[test]
    fn recompose_requires_exactly_one_root() {
        assert!(matches!(recompose(&[]), Err(DecomposeError::MissingRoot)));

        let plan = plan(vec![], false);
        let mut records = decompose(&plan);
        records.push(records[0].clone());
        assert!(matches!(recompose(&records), Err(DecomposeError::MultipleRoots(_))));
    }

    #[test]
    fn entity_key_round_trips_through_display() {
        let key: EntityKey = "membercostshare:abc-1".parse().unwrap();
        assert_eq!(key, EntityKey::new(EntityKind::CostShare, "abc-1"));
        assert_eq!(key.to_string(), "membercostshare:abc-1");
        assert!("bogus:1".parse::<EntityKey>().is_err());
        assert!("plan:".parse::<EntityKey>().is_err());
    }

    #[test]
    fn every_kind_has_a_distinct_storage_name() {
        for kind in EntityKind::ALL {
            assert_eq!(EntityKind::from_storage_name(kind.storage_name()), Some(kind));
        }
    }

    proptest! {
        #[test]
        fn root_precedes_descendants_and_associations_precede_their_children(
            shape in proptest::collection::vec((any::<bool>(), any::<bool>()), 0..6),
            root_cost_share in any::<bool>(),
        ) {
            let associations = shape
                .iter()
                .enumerate()
                .map(|(i, (s, c))| association(&format!("A{i}"), *s, *c))
                .collect();
            let plan = plan(associations, root_cost_share);
            let records = decompose(&plan);

            prop_assert!(records[0].is_root());
            for (position, record) in records.iter().enumerate().skip(1) {
                let parent = record.parent_id.as_deref().unwrap();
                let parent_position = records.iter().position(|r| r.object_id == parent).unwrap();
                prop_assert!(parent_position < position);
            }

            let expected = 1
                + usize::from(root_cost_share)
                + shape.iter().map(|(s, c)| 1 + usize::from(*s) + usize::from(*c)).sum::<usize>();
            prop_assert_eq!(records.len(), expected);
            prop_assert_eq!(recompose(&records).unwrap(), plan);
        }
    }
}
