//! Request/response contract of the Elasticsearch index store, checked
//! against a mock cluster.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use plan_registry_core::query::SearchQuery;
use plan_registry_core::store::{IndexStore, StoreError};
use plan_registry_elasticsearch::{ElasticsearchConfig, ElasticsearchIndexStore};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_json, body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn store_for(server: &MockServer) -> ElasticsearchIndexStore {
    ElasticsearchIndexStore::new(&ElasticsearchConfig {
        url: server.uri(),
        index: "plan_index".into(),
        timeout: Duration::from_secs(2),
    })
    .unwrap()
}

// ============================================================================
// Index bootstrap
// ============================================================================

#[tokio::test]
async fn ensure_index_creates_a_missing_index() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/plan_index"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/plan_index"))
        .and(body_partial_json(json!({
            "mappings": { "properties": { "join_field": { "type": "join" } } }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "acknowledged": true })))
        .expect(1)
        .mount(&server)
        .await;

    assert!(store_for(&server).ensure_index().await.unwrap());
}

#[tokio::test]
async fn ensure_index_leaves_an_existing_index_alone() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/plan_index"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    assert!(!store_for(&server).ensure_index().await.unwrap());
}

#[tokio::test]
async fn ensure_index_tolerates_a_concurrent_creator() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "type": "resource_already_exists_exception" }, "status": 400
        })))
        .mount(&server)
        .await;

    assert!(!store_for(&server).ensure_index().await.unwrap());
}

// ============================================================================
// Documents
// ============================================================================

#[tokio::test]
async fn upsert_puts_the_document_with_its_routing() {
    let server = MockServer::start().await;
    let document = json!({ "objectId": "S1", "join_field": { "name": "service", "parent": "A1" } });
    Mock::given(method("PUT"))
        .and(path("/plan_index/_doc/S1"))
        .and(query_param("routing", "A1"))
        .and(query_param("refresh", "true"))
        .and(body_json(&document))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "result": "created" })))
        .expect(1)
        .mount(&server)
        .await;

    store_for(&server).upsert("S1", "A1", document).await.unwrap();
}

#[tokio::test]
async fn delete_of_a_missing_document_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/plan_index/_doc/CS1"))
        .and(query_param("routing", "P1"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "result": "not_found" })))
        .mount(&server)
        .await;

    let error = store_for(&server).delete_by_id("CS1", "P1").await.unwrap_err();
    assert!(matches!(error, StoreError::NotFound(_)), "{error:?}");
}

#[tokio::test]
async fn delete_by_query_sends_the_filter_and_counts() {
    let server = MockServer::start().await;
    let filter = SearchQuery::any_of(vec![
        SearchQuery::Ids(vec!["P1".into()]),
        SearchQuery::terms("parentId", ["P1", "A1"]),
    ]);
    Mock::given(method("POST"))
        .and(path("/plan_index/_delete_by_query"))
        .and(query_param("conflicts", "proceed"))
        .and(body_json(json!({ "query": filter.to_dsl() })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "deleted": 6, "failures": [] })))
        .expect(1)
        .mount(&server)
        .await;

    assert_eq!(store_for(&server).delete_by_query(&filter).await.unwrap(), 6);
}

// ============================================================================
// Search
// ============================================================================

#[tokio::test]
async fn search_returns_hits_in_cluster_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/plan_index/_search"))
        .and(body_partial_json(json!({ "query": { "term": { "_org": "example.com" } } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "hits": {
                "total": { "value": 2, "relation": "eq" },
                "hits": [
                    { "_index": "plan_index", "_id": "P1", "_routing": "P1", "_source": { "objectId": "P1" } },
                    { "_index": "plan_index", "_id": "A1", "_routing": "P1", "_source": { "objectId": "A1" } }
                ]
            }
        })))
        .mount(&server)
        .await;

    let hits = store_for(&server)
        .search(&SearchQuery::term("_org", "example.com"))
        .await
        .unwrap();
    let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, vec!["P1", "A1"]);
    assert_eq!(hits[1].routing.as_deref(), Some("P1"));
    assert_eq!(hits[1].source["objectId"], "A1");
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn server_errors_are_unavailable_and_client_errors_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/plan_index/_search"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/plan_index/_doc/P1"))
        .respond_with(ResponseTemplate::new(400).set_body_string("mapper_parsing_exception"))
        .mount(&server)
        .await;

    let store = store_for(&server);
    let error = store.search(&SearchQuery::MatchAll).await.unwrap_err();
    assert!(matches!(error, StoreError::Unavailable(_)), "{error:?}");

    let error = store.upsert("P1", "P1", json!({})).await.unwrap_err();
    assert!(matches!(error, StoreError::Rejected(ref m) if m.contains("mapper_parsing_exception")));
}

#[tokio::test]
async fn slow_cluster_times_out_as_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;
    let store = ElasticsearchIndexStore::new(&ElasticsearchConfig {
        url: server.uri(),
        index: "plan_index".into(),
        timeout: Duration::from_millis(50),
    })
    .unwrap();

    let error = store.search(&SearchQuery::MatchAll).await.unwrap_err();
    assert!(matches!(error, StoreError::Unavailable(_)), "{error:?}");
}
