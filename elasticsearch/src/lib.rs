//! Elasticsearch index store for the plan registry.
//!
//! Talks to the Elasticsearch REST API with `reqwest`:
//!
//! | Operation | Request |
//! |---|---|
//! | [`ensure_index`](ElasticsearchIndexStore::ensure_index) | `HEAD /{index}`, then `PUT /{index}` with the join mapping |
//! | `upsert` | `PUT /{index}/_doc/{id}?routing=..&refresh=true` |
//! | `delete_by_id` | `DELETE /{index}/_doc/{id}?routing=..&refresh=true` |
//! | `delete_by_query` | `POST /{index}/_delete_by_query?refresh=true&conflicts=proceed` |
//! | `search` | `POST /{index}/_search` |
//!
//! Writes ask for an immediate refresh so a search issued right after a
//! mutation sees it.
//!
//! # Example
//!
//! ```no_run
//! use plan_registry_elasticsearch::{ElasticsearchConfig, ElasticsearchIndexStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = ElasticsearchIndexStore::new(&ElasticsearchConfig::default())?;
//! store.ensure_index().await?;
//! # Ok(())
//! # }
//! ```

use plan_registry_core::query::SearchQuery;
use plan_registry_core::store::{IndexStore, SearchHit, StoreError, StoreFuture};
use reqwest::{Client, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;

pub mod mapping;

/// Number of hits returned by one search request.
pub const SEARCH_SIZE: usize = 1000;

/// Connection settings.
#[derive(Debug, Clone)]
pub struct ElasticsearchConfig {
    /// Cluster base URL.
    pub url: String,
    /// Plan index name.
    pub index: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9200".to_string(),
            index: "plan_index".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Index store backed by one Elasticsearch index.
#[derive(Clone, Debug)]
pub struct ElasticsearchIndexStore {
    client: Client,
    base_url: Url,
    index: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    hits: HitsEnvelope,
}

#[derive(Deserialize)]
struct HitsEnvelope {
    hits: Vec<RawHit>,
}

#[derive(Deserialize)]
struct RawHit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_routing", default)]
    routing: Option<String>,
    #[serde(rename = "_source", default)]
    source: Value,
}

#[derive(Deserialize)]
struct DeleteByQueryResponse {
    deleted: u64,
}

impl ElasticsearchIndexStore {
    /// Build a store; no request is made yet.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Rejected`] if the URL is invalid or the HTTP
    /// client cannot be built.
    pub fn new(config: &ElasticsearchConfig) -> Result<Self, StoreError> {
        let base_url = Url::parse(&config.url)
            .map_err(|e| StoreError::Rejected(format!("Invalid Elasticsearch URL {}: {e}", config.url)))?;
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| StoreError::Rejected(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url,
            index: config.index.clone(),
        })
    }

    /// Name of the plan index.
    #[must_use]
    pub fn index(&self) -> &str {
        &self.index
    }

    /// Create the plan index with its join mapping unless it already
    /// exists. Returns whether the index was created.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the cluster is unreachable or refuses the
    /// mapping.
    pub async fn ensure_index(&self) -> Result<bool, StoreError> {
        let url = self.url(&[self.index.as_str()])?;
        let response = self.client.head(url.clone()).send().await.map_err(transport)?;
        if response.status().is_success() {
            tracing::debug!(index = %self.index, "Index already exists");
            return Ok(false);
        }
        if response.status() != StatusCode::NOT_FOUND {
            return Err(status_error("HEAD index", response).await);
        }

        let response = self
            .client
            .put(url)
            .json(&mapping::plan_index_body())
            .send()
            .await
            .map_err(transport)?;
        if response.status() == StatusCode::BAD_REQUEST {
            let body = response.text().await.unwrap_or_default();
            if body.contains("resource_already_exists_exception") {
                return Ok(false);
            }
            return Err(StoreError::Rejected(format!("create index: {body}")));
        }
        expect_success("create index", response).await?;
        tracing::info!(index = %self.index, "Index created with parent-child mapping");
        Ok(true)
    }

    fn url(&self, segments: &[&str]) -> Result<Url, StoreError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| StoreError::Rejected(format!("{} cannot be a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

impl IndexStore for ElasticsearchIndexStore {
    fn upsert(&self, id: &str, routing: &str, document: Value) -> StoreFuture<'_, ()> {
        let target = self.url(&[self.index.as_str(), "_doc", id]);
        let routing = routing.to_string();
        Box::pin(async move {
            let response = self
                .client
                .put(target?)
                .query(&[("routing", routing.as_str()), ("refresh", "true")])
                .json(&document)
                .send()
                .await
                .map_err(transport)?;
            expect_success("index document", response).await?;
            Ok(())
        })
    }

    fn delete_by_id(&self, id: &str, routing: &str) -> StoreFuture<'_, ()> {
        let target = self.url(&[self.index.as_str(), "_doc", id]);
        let id = id.to_string();
        let routing = routing.to_string();
        Box::pin(async move {
            let response = self
                .client
                .delete(target?)
                .query(&[("routing", routing.as_str()), ("refresh", "true")])
                .send()
                .await
                .map_err(transport)?;
            if response.status() == StatusCode::NOT_FOUND {
                return Err(StoreError::NotFound(format!("{id} (routing {routing})")));
            }
            expect_success("delete document", response).await?;
            Ok(())
        })
    }

    fn delete_by_query(&self, filter: &SearchQuery) -> StoreFuture<'_, u64> {
        let target = self.url(&[self.index.as_str(), "_delete_by_query"]);
        let body = json!({ "query": filter.to_dsl() });
        Box::pin(async move {
            let response = self
                .client
                .post(target?)
                .query(&[("refresh", "true"), ("conflicts", "proceed")])
                .json(&body)
                .send()
                .await
                .map_err(transport)?;
            let response = expect_success("delete by query", response).await?;
            let parsed: DeleteByQueryResponse = response
                .json()
                .await
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            Ok(parsed.deleted)
        })
    }

    fn search(&self, query: &SearchQuery) -> StoreFuture<'_, Vec<SearchHit>> {
        let target = self.url(&[self.index.as_str(), "_search"]);
        let body = json!({ "query": query.to_dsl(), "size": SEARCH_SIZE });
        Box::pin(async move {
            let response = self
                .client
                .post(target?)
                .json(&body)
                .send()
                .await
                .map_err(transport)?;
            let response = expect_success("search", response).await?;
            let parsed: SearchResponse = response
                .json()
                .await
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            Ok(parsed
                .hits
                .hits
                .into_iter()
                .map(|hit| SearchHit {
                    id: hit.id,
                    routing: hit.routing,
                    source: hit.source,
                })
                .collect())
        })
    }
}

fn transport(error: reqwest::Error) -> StoreError {
    StoreError::Unavailable(format!("Elasticsearch request failed: {error}"))
}

async fn expect_success(what: &str, response: Response) -> Result<Response, StoreError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(status_error(what, response).await)
    }
}

/// Server errors mean the cluster is unavailable; client errors mean it
/// refused this particular request.
async fn status_error(what: &str, response: Response) -> StoreError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    tracing::warn!(status = status.as_u16(), body = %body, "Elasticsearch {what} failed");
    if status.is_server_error() {
        StoreError::Unavailable(format!("{what}: HTTP {status}"))
    } else {
        StoreError::Rejected(format!("{what}: HTTP {status}: {body}"))
    }
}
