//! Storage collaborators.
//!
//! The registry keeps two stores in step:
//!
//! - a **primary store**: a flat key/value store addressed by composite
//!   entity keys (`plan:P1`, `membercostshare:C1`, ...), holding JSON text
//! - an **index store**: a search index with parent/child joins, addressed
//!   by document id plus a routing key
//!
//! Both traits return boxed futures so the orchestrator can hold them as
//! `Arc<dyn PrimaryStore>` / `Arc<dyn IndexStore>` handles injected at
//! startup.
//!
//! # Implementations
//!
//! - `InMemoryPrimaryStore`, `InMemoryIndexStore` in `plan-registry-testing`
//! - `RedisPrimaryStore` in `plan-registry-redis`
//! - `ElasticsearchIndexStore` in `plan-registry-elasticsearch`

use crate::query::SearchQuery;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors reported by store collaborators.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backend could not be reached or failed the request.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The addressed document does not exist.
    ///
    /// Only single-document deletes report this; reads return `None`.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Stored data could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The backend refused the request (bad query, mapping conflict, ...).
    #[error("Rejected by store: {0}")]
    Rejected(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Boxed future returned by store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Per-key primary store.
///
/// Values are opaque strings (JSON text); the store performs no
/// interpretation of them.
pub trait PrimaryStore: Send + Sync {
    /// Fetch the value under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] when the backend fails.
    fn get(&self, key: &str) -> StoreFuture<'_, Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] when the backend fails.
    fn set(&self, key: &str, value: String) -> StoreFuture<'_, ()>;

    /// Remove `key`, returning the number of keys removed (0 or 1).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] when the backend fails.
    fn delete(&self, key: &str) -> StoreFuture<'_, u64>;
}

/// One search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Document id.
    pub id: String,
    /// Routing key the document was indexed with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing: Option<String>,
    /// Stored document.
    pub source: Value,
}

/// Join-aware search index.
pub trait IndexStore: Send + Sync {
    /// Create or fully replace the document `id`, routed by `routing`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backend fails or rejects the
    /// document.
    fn upsert(&self, id: &str, routing: &str, document: Value) -> StoreFuture<'_, ()>;

    /// Delete the document `id` routed by `routing`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when no such document exists,
    /// [`StoreError::Unavailable`] when the backend fails.
    fn delete_by_id(&self, id: &str, routing: &str) -> StoreFuture<'_, ()>;

    /// Delete every document matching `filter` in one batch, returning the
    /// number of documents removed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backend fails or rejects the filter.
    fn delete_by_query(&self, filter: &SearchQuery) -> StoreFuture<'_, u64>;

    /// Run `query`, returning matches in store order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backend fails or rejects the query.
    fn search(&self, query: &SearchQuery) -> StoreFuture<'_, Vec<SearchHit>>;

    /// Whether [`delete_by_query`](Self::delete_by_query) is available.
    ///
    /// When `false`, cascade deletes enumerate documents one by one.
    fn supports_filtered_delete(&self) -> bool {
        true
    }
}
