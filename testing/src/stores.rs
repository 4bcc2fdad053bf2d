//! In-memory store collaborators.
//!
//! - [`InMemoryPrimaryStore`]: `BTreeMap`-backed key/value store
//! - [`InMemoryIndexStore`]: document store that evaluates the typed search
//!   model, parent/child joins included
//!
//! Both can be switched into an "unavailable" mode to exercise partial
//! pipeline failures.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Lock poisoning only happens after a test already panicked

use plan_registry_core::index::JOIN_FIELD;
use plan_registry_core::query::{ID_FIELD, SearchQuery};
use plan_registry_core::store::{IndexStore, PrimaryStore, SearchHit, StoreError, StoreFuture};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

/// In-memory primary store.
///
/// # Example
///
/// ```
/// use plan_registry_testing::InMemoryPrimaryStore;
/// use plan_registry_core::store::PrimaryStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryPrimaryStore::new();
/// store.set("plan:P1", "{}".to_string()).await?;
/// assert_eq!(store.get("plan:P1").await?, Some("{}".to_string()));
/// assert_eq!(store.delete("plan:P1").await?, 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryPrimaryStore {
    data: Arc<RwLock<BTreeMap<String, String>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryPrimaryStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().unwrap().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().unwrap().is_empty()
    }

    /// Stored keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.data.read().unwrap().keys().cloned().collect()
    }

    /// Stored value parsed as JSON.
    #[must_use]
    pub fn get_json(&self, key: &str) -> Option<Value> {
        self.data
            .read()
            .unwrap()
            .get(key)
            .map(|raw| serde_json::from_str(raw).unwrap())
    }

    /// Copy of the full contents.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.data.read().unwrap().clone()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("primary store offline".into()))
        } else {
            Ok(())
        }
    }
}

impl PrimaryStore for InMemoryPrimaryStore {
    fn get(&self, key: &str) -> StoreFuture<'_, Option<String>> {
        let key = key.to_string();
        Box::pin(async move {
            self.check()?;
            Ok(self.data.read().unwrap().get(&key).cloned())
        })
    }

    fn set(&self, key: &str, value: String) -> StoreFuture<'_, ()> {
        let key = key.to_string();
        Box::pin(async move {
            self.check()?;
            self.data.write().unwrap().insert(key, value);
            Ok(())
        })
    }

    fn delete(&self, key: &str) -> StoreFuture<'_, u64> {
        let key = key.to_string();
        Box::pin(async move {
            self.check()?;
            Ok(u64::from(self.data.write().unwrap().remove(&key).is_some()))
        })
    }
}

#[derive(Debug, Clone)]
struct Document {
    id: String,
    routing: String,
    source: Value,
}

impl Document {
    fn relation(&self) -> Option<&str> {
        match self.source.get(JOIN_FIELD)? {
            Value::String(name) => Some(name),
            join => join.get("name")?.as_str(),
        }
    }

    fn join_parent(&self) -> Option<&str> {
        self.source.get(JOIN_FIELD)?.get("parent")?.as_str()
    }

    fn field_values(&self, field: &str) -> Vec<Value> {
        if field == ID_FIELD {
            return vec![Value::String(self.id.clone())];
        }
        if field == JOIN_FIELD {
            return self.relation().map(|r| vec![Value::String(r.into())]).unwrap_or_default();
        }
        match self.source.get(field) {
            Some(Value::Array(items)) => items.clone(),
            Some(value) => vec![value.clone()],
            None => Vec::new(),
        }
    }

    fn to_hit(&self) -> SearchHit {
        SearchHit {
            id: self.id.clone(),
            routing: Some(self.routing.clone()),
            source: self.source.clone(),
        }
    }
}

/// In-memory join-aware index store.
///
/// Documents keep insertion order; an upsert of an existing id replaces the
/// document in place.
#[derive(Clone, Debug)]
pub struct InMemoryIndexStore {
    documents: Arc<RwLock<Vec<Document>>>,
    unavailable: Arc<AtomicBool>,
    filtered_delete: bool,
}

impl Default for InMemoryIndexStore {
    fn default() -> Self {
        Self {
            documents: Arc::default(),
            unavailable: Arc::default(),
            filtered_delete: true,
        }
    }
}

impl InMemoryIndexStore {
    /// Create a new empty index supporting filtered deletes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an index that only supports per-document deletes.
    #[must_use]
    pub fn without_filtered_delete() -> Self {
        Self {
            filtered_delete: false,
            ..Self::default()
        }
    }

    /// Make every subsequent call fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.read().unwrap().len()
    }

    /// Whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.read().unwrap().is_empty()
    }

    /// Document ids in insertion order.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.documents.read().unwrap().iter().map(|d| d.id.clone()).collect()
    }

    /// Fetch one document.
    #[must_use]
    pub fn document(&self, id: &str) -> Option<SearchHit> {
        self.documents
            .read()
            .unwrap()
            .iter()
            .find(|d| d.id == id)
            .map(Document::to_hit)
    }

    /// Copy of every document, in insertion order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<SearchHit> {
        self.documents.read().unwrap().iter().map(Document::to_hit).collect()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("index store offline".into()))
        } else {
            Ok(())
        }
    }
}

/// Evaluate `query` against `doc` within the whole document set.
fn matches(query: &SearchQuery, doc: &Document, all: &[Document]) -> bool {
    match query {
        SearchQuery::MatchAll => true,
        SearchQuery::Term { field, value } => doc.field_values(field).iter().any(|v| v == value),
        SearchQuery::Terms { field, values } => {
            doc.field_values(field).iter().any(|v| values.contains(v))
        }
        SearchQuery::Ids(ids) => ids.contains(&doc.id),
        SearchQuery::Match { field, text } => {
            let wanted: Vec<String> = tokens(text);
            doc.field_values(field).iter().any(|v| {
                let text = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                tokens(&text).iter().any(|t| wanted.contains(t))
            })
        }
        SearchQuery::HasParent { parent_type, query } => doc.join_parent().is_some_and(|parent| {
            all.iter().any(|p| {
                p.id == parent && p.relation() == Some(parent_type.as_str()) && matches(query, p, all)
            })
        }),
        SearchQuery::HasChild { child_type, query } => all.iter().any(|c| {
            c.join_parent() == Some(doc.id.as_str())
                && c.relation() == Some(child_type.as_str())
                && matches(query, c, all)
        }),
        SearchQuery::Bool(b) => {
            b.must.iter().all(|q| matches(q, doc, all))
                && b.filter.iter().all(|q| matches(q, doc, all))
                && !b.must_not.iter().any(|q| matches(q, doc, all))
                && b.should.iter().filter(|q| matches(q, doc, all)).count() >= b.required_should()
        }
    }
}

fn tokens(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}

impl IndexStore for InMemoryIndexStore {
    fn upsert(&self, id: &str, routing: &str, document: Value) -> StoreFuture<'_, ()> {
        let doc = Document {
            id: id.to_string(),
            routing: routing.to_string(),
            source: document,
        };
        Box::pin(async move {
            self.check()?;
            let mut documents = self.documents.write().unwrap();
            match documents.iter_mut().find(|d| d.id == doc.id) {
                Some(existing) => *existing = doc,
                None => documents.push(doc),
            }
            Ok(())
        })
    }

    fn delete_by_id(&self, id: &str, routing: &str) -> StoreFuture<'_, ()> {
        let id = id.to_string();
        let routing = routing.to_string();
        Box::pin(async move {
            self.check()?;
            let mut documents = self.documents.write().unwrap();
            let before = documents.len();
            documents.retain(|d| !(d.id == id && d.routing == routing));
            if documents.len() == before {
                Err(StoreError::NotFound(format!("{id} (routing {routing})")))
            } else {
                Ok(())
            }
        })
    }

    fn delete_by_query(&self, filter: &SearchQuery) -> StoreFuture<'_, u64> {
        let filter = filter.clone();
        Box::pin(async move {
            self.check()?;
            if !self.filtered_delete {
                return Err(StoreError::Rejected("delete by query not supported".into()));
            }
            let mut documents = self.documents.write().unwrap();
            let doomed: Vec<String> = documents
                .iter()
                .filter(|d| matches(&filter, d, &documents))
                .map(|d| d.id.clone())
                .collect();
            documents.retain(|d| !doomed.contains(&d.id));
            Ok(doomed.len() as u64)
        })
    }

    fn search(&self, query: &SearchQuery) -> StoreFuture<'_, Vec<SearchHit>> {
        let query = query.clone();
        Box::pin(async move {
            self.check()?;
            let documents = self.documents.read().unwrap();
            Ok(documents
                .iter()
                .filter(|d| matches(&query, d, &documents))
                .map(Document::to_hit)
                .collect())
        })
    }

    fn supports_filtered_delete(&self) -> bool {
        self.filtered_delete
    }
}
