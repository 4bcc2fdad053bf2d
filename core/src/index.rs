//! Index projection.
//!
//! Maps decomposed records onto the search index's parent/child join
//! structure and builds the filter that removes a whole aggregate again.
//!
//! # Flattening
//!
//! The index supports one join relation per document. Cost shares appear
//! at two depths (under the plan and under each association), so they are
//! always re-parented to the plan root and keep their true parent in
//! `_flattenParentId`. Associations and services keep their true parent:
//!
//! ```text
//! decomposition                      index (effective parent)
//! plan P1                            plan P1
//! ├── membercostshare C1             ├── membercostshare C1   _flattenParentId=P1
//! └── planservice A1                 ├── membercostshare CS1  _flattenParentId=A1
//!     ├── service S1                 └── planservice A1
//!     └── membercostshare CS1            └── service S1
//! ```
//!
//! [`IndexProjector::effective_parent`] is the single place this policy is
//! decided. Projection and [`CascadeFilter`] both read it, so the documents
//! written and the documents a cascade delete matches cannot drift apart.

use crate::decompose::{EntityKind, SubEntityRecord};
use crate::query::SearchQuery;
use serde_json::{Value, json};
use std::collections::BTreeSet;

/// Name of the join field in index documents.
pub const JOIN_FIELD: &str = "join_field";
/// Effective parent objectId.
pub const PARENT_FIELD: &str = "parentId";
/// True parent objectId of a flattened record.
pub const FLATTEN_FIELD: &str = "_flattenParentId";

/// Where a child record hangs in the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveParent {
    /// Parent the document joins to (and is routed by).
    pub parent_id: String,
    /// True decomposition parent, when the record was flattened.
    pub flatten_source: Option<String>,
}

/// A record ready for the index.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedDocument {
    /// Document id (the record's objectId).
    pub id: String,
    /// Join relation name.
    pub relation: EntityKind,
    /// Effective parent; `None` for the root.
    pub parent_key: Option<String>,
    /// True parent of a flattened record.
    pub flatten_source: Option<String>,
    /// Routing key: the root's own id, or the effective parent.
    pub routing_key: String,
    /// Document body.
    pub document: Value,
}

/// Projects the records of one aggregate.
#[derive(Debug, Clone)]
pub struct IndexProjector {
    root_id: String,
}

impl IndexProjector {
    /// Projector for the aggregate rooted at `root_id`.
    #[must_use]
    pub fn for_root(root_id: impl Into<String>) -> Self {
        Self {
            root_id: root_id.into(),
        }
    }

    /// Root objectId.
    #[must_use]
    pub fn root_id(&self) -> &str {
        &self.root_id
    }

    /// Resolve a record's effective parent; `None` for the root.
    #[must_use]
    pub fn effective_parent(&self, record: &SubEntityRecord) -> Option<EffectiveParent> {
        let parent_id = record.parent_id.as_ref()?;
        Some(match record.kind {
            EntityKind::CostShare => EffectiveParent {
                parent_id: self.root_id.clone(),
                flatten_source: Some(parent_id.clone()),
            },
            EntityKind::Plan | EntityKind::Association | EntityKind::Service => EffectiveParent {
                parent_id: parent_id.clone(),
                flatten_source: None,
            },
        })
    }

    /// Project one record.
    #[must_use]
    pub fn project(&self, record: &SubEntityRecord) -> ProjectedDocument {
        let mut document = record.payload.clone();
        let relation = record.kind;

        let Some(parent) = self.effective_parent(record) else {
            document.insert(JOIN_FIELD.into(), Value::String(relation.storage_name().into()));
            return ProjectedDocument {
                id: record.object_id.clone(),
                relation,
                parent_key: None,
                flatten_source: None,
                routing_key: record.object_id.clone(),
                document: Value::Object(document),
            };
        };

        document.insert(
            JOIN_FIELD.into(),
            json!({ "name": relation.storage_name(), "parent": parent.parent_id }),
        );
        document.insert(PARENT_FIELD.into(), Value::String(parent.parent_id.clone()));
        if let Some(source) = &parent.flatten_source {
            document.insert(FLATTEN_FIELD.into(), Value::String(source.clone()));
        }

        ProjectedDocument {
            id: record.object_id.clone(),
            relation,
            routing_key: parent.parent_id.clone(),
            parent_key: Some(parent.parent_id),
            flatten_source: parent.flatten_source,
            document: Value::Object(document),
        }
    }

    /// Project every record, keeping order.
    #[must_use]
    pub fn project_all(&self, records: &[SubEntityRecord]) -> Vec<ProjectedDocument> {
        records.iter().map(|r| self.project(r)).collect()
    }
}

/// Filter matching every index document of one aggregate.
///
/// Matches the root by id, every document whose effective parent is a
/// member of the tree, and every flattened document whose true parent is
/// the root or another member of the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadeFilter {
    root_id: String,
    parent_ids: BTreeSet<String>,
    flatten_sources: BTreeSet<String>,
}

impl CascadeFilter {
    /// Filter for a root whose tree is unknown: the root, its direct
    /// children and everything flattened from it.
    #[must_use]
    pub fn for_root(root_id: impl Into<String>) -> Self {
        let root_id = root_id.into();
        Self {
            parent_ids: BTreeSet::from([root_id.clone()]),
            flatten_sources: BTreeSet::from([root_id.clone()]),
            root_id,
        }
    }

    /// Filter for the projected documents of a known tree.
    #[must_use]
    pub fn for_tree(root_id: impl Into<String>, documents: &[ProjectedDocument]) -> Self {
        let mut filter = Self::for_root(root_id);
        for document in documents {
            if let Some(parent) = &document.parent_key {
                filter.parent_ids.insert(parent.clone());
            }
            if let Some(source) = &document.flatten_source {
                filter.flatten_sources.insert(source.clone());
            }
        }
        filter
    }

    /// Root objectId.
    #[must_use]
    pub fn root_id(&self) -> &str {
        &self.root_id
    }

    /// The filter as a single query.
    #[must_use]
    pub fn to_query(&self) -> SearchQuery {
        SearchQuery::any_of(vec![
            SearchQuery::Ids(vec![self.root_id.clone()]),
            SearchQuery::terms(PARENT_FIELD, self.parent_ids.iter().cloned()),
            SearchQuery::terms(FLATTEN_FIELD, self.flatten_sources.iter().cloned()),
        ])
    }
}
