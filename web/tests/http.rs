//! HTTP contract of the plan routes, served over in-memory stores.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use axum::http::{HeaderName, HeaderValue, StatusCode, header};
use axum_test::TestServer;
use plan_registry_testing::TestRegistry;
use plan_registry_testing::fixtures::{association, plan, scenario_plan};
use plan_registry_web::{AppState, CORRELATION_ID_HEADER, app};
use serde_json::{Value, json};

const PLANS: &str = "/api/v1/plan";

fn server() -> (TestServer, TestRegistry) {
    let registry = TestRegistry::new();
    let router = app(AppState::new(registry.orchestrator.clone()));
    (TestServer::new(router).unwrap(), registry)
}

fn etag_of(response: &axum_test::TestResponse) -> HeaderValue {
    response.header(header::ETAG)
}

async fn create_scenario(server: &TestServer) -> HeaderValue {
    let response = server.post(PLANS).json(&scenario_plan()).await;
    response.assert_status(StatusCode::CREATED);
    etag_of(&response)
}

// ============================================================================
// Create
// ============================================================================

#[tokio::test]
async fn post_stores_the_plan_and_returns_its_etag() {
    let (server, registry) = server();

    let response = server.post(PLANS).json(&scenario_plan()).await;

    response.assert_status(StatusCode::CREATED);
    response.assert_json(&json!({ "message": "Plan stored successfully", "objectId": "P1" }));
    let etag = etag_of(&response);
    assert!(etag.to_str().unwrap().starts_with('"'));
    assert_eq!(registry.primary.len(), 6);
    assert_eq!(registry.index.len(), 6);
}

#[tokio::test]
async fn post_of_an_invalid_plan_lists_field_errors() {
    let (server, registry) = server();
    let mut invalid = scenario_plan();
    invalid.as_object_mut().unwrap().remove("_org");

    let response = server.post(PLANS).json(&invalid).await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["code"], "VALIDATION_FAILED");
    assert_eq!(body["errors"][0]["path"], "/_org");
    assert!(registry.primary.is_empty());
}

#[tokio::test]
async fn post_of_malformed_json_is_a_bad_request() {
    let (server, _registry) = server();

    let response = server
        .post(PLANS)
        .content_type("application/json")
        .text("{ not json")
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn post_reusing_another_plans_entity_is_a_conflict() {
    let (server, registry) = server();
    create_scenario(&server).await;

    let response = server
        .post(PLANS)
        .json(&plan("P2", false, vec![association("A1", false, false)]))
        .await;

    response.assert_status(StatusCode::CONFLICT);
    assert_eq!(response.json::<Value>()["code"], "CONFLICT");
    assert_eq!(registry.primary.len(), 6);
}

// ============================================================================
// Read
// ============================================================================

#[tokio::test]
async fn get_returns_the_aggregate_or_not_modified() {
    let (server, _registry) = server();
    let etag = create_scenario(&server).await;

    let response = server.get(&format!("{PLANS}/P1")).await;
    response.assert_status_ok();
    response.assert_json(&scenario_plan());
    assert_eq!(etag_of(&response), etag);

    let response = server
        .get(&format!("{PLANS}/P1"))
        .add_header(header::IF_NONE_MATCH, etag.clone())
        .await;
    response.assert_status(StatusCode::NOT_MODIFIED);
    assert!(response.text().is_empty());

    let response = server
        .get(&format!("{PLANS}/P1"))
        .add_header(header::IF_NONE_MATCH, HeaderValue::from_static("\"stale\""))
        .await;
    response.assert_status_ok();
}

#[tokio::test]
async fn get_of_an_unknown_plan_is_not_found() {
    let (server, _registry) = server();

    let response = server.get(&format!("{PLANS}/missing")).await;

    response.assert_status_not_found();
    assert_eq!(response.json::<Value>()["code"], "NOT_FOUND");
}

// ============================================================================
// Update
// ============================================================================

#[tokio::test]
async fn patch_with_the_current_etag_merges_and_rotates_it() {
    let (server, registry) = server();
    let etag = create_scenario(&server).await;

    let response = server
        .patch(&format!("{PLANS}/P1"))
        .add_header(header::IF_MATCH, etag.clone())
        .json(&json!({ "planType": "outOfNetwork" }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["planType"], "outOfNetwork");
    assert_eq!(body["planCostShares"]["objectId"], "C1");
    assert_ne!(etag_of(&response), etag);
    assert_eq!(registry.primary.get_json("plan:P1").unwrap(), body);
}

#[tokio::test]
async fn patch_with_a_stale_etag_is_rejected_without_changes() {
    let (server, registry) = server();
    create_scenario(&server).await;
    let before = registry.primary.snapshot();

    let response = server
        .patch(&format!("{PLANS}/P1"))
        .add_header(header::IF_MATCH, HeaderValue::from_static("\"stale\""))
        .json(&json!({ "planType": "outOfNetwork" }))
        .await;

    response.assert_status(StatusCode::PRECONDITION_FAILED);
    assert_eq!(response.json::<Value>()["code"], "PRECONDITION_FAILED");
    assert_eq!(registry.primary.snapshot(), before);
}

#[tokio::test]
async fn patch_with_a_weak_etag_fails_the_precondition() {
    let (server, _registry) = server();
    let etag = create_scenario(&server).await;
    let weak = HeaderValue::from_str(&format!("W/{}", etag.to_str().unwrap())).unwrap();

    let response = server
        .patch(&format!("{PLANS}/P1"))
        .add_header(header::IF_MATCH, weak.clone())
        .json(&json!({ "planType": "outOfNetwork" }))
        .await;
    response.assert_status(StatusCode::PRECONDITION_FAILED);

    // The same weak tag is good enough for a conditional read.
    server
        .get(&format!("{PLANS}/P1"))
        .add_header(header::IF_NONE_MATCH, weak)
        .await
        .assert_status(StatusCode::NOT_MODIFIED);
}

#[tokio::test]
async fn patch_of_an_unknown_plan_is_not_found() {
    let (server, _registry) = server();

    let response = server
        .patch(&format!("{PLANS}/missing"))
        .json(&json!({ "planType": "outOfNetwork" }))
        .await;

    response.assert_status_not_found();
}

// ============================================================================
// Delete
// ============================================================================

#[tokio::test]
async fn delete_removes_the_tree_and_repeating_is_not_found() {
    let (server, registry) = server();
    create_scenario(&server).await;

    server
        .delete(&format!("{PLANS}/P1"))
        .await
        .assert_status(StatusCode::NO_CONTENT);
    assert!(registry.primary.is_empty());
    assert!(registry.index.is_empty());

    server
        .delete(&format!("{PLANS}/P1"))
        .await
        .assert_status_not_found();
}

// ============================================================================
// Search
// ============================================================================

#[tokio::test]
async fn search_returns_matching_documents() {
    let (server, _registry) = server();
    create_scenario(&server).await;

    let response = server
        .post(&format!("{PLANS}/search"))
        .json(&json!({
            "query": { "has_child": { "type": "service", "query": { "match": { "name": "physical" } } } }
        }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["message"], "Search successful");
    assert_eq!(body["results"].as_array().unwrap().len(), 1);
    assert_eq!(body["results"][0]["id"], "A1");
}

#[tokio::test]
async fn search_without_a_query_is_a_bad_request() {
    let (server, _registry) = server();

    let response = server.post(&format!("{PLANS}/search")).json(&json!({})).await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(
        response.json::<Value>()["message"],
        "Missing query in request body"
    );
}

#[tokio::test]
async fn search_with_an_unsupported_query_is_a_bad_request() {
    let (server, _registry) = server();

    let response = server
        .post(&format!("{PLANS}/search"))
        .json(&json!({ "query": { "fuzzy": { "name": "phys" } } }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["code"], "INVALID_QUERY");
}

// ============================================================================
// Failures and plumbing
// ============================================================================

#[tokio::test]
async fn store_outage_is_service_unavailable() {
    let (server, registry) = server();
    registry.index.set_unavailable(true);

    let response = server.post(PLANS).json(&scenario_plan()).await;

    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.json::<Value>()["code"], "STORE_UNAVAILABLE");
}

#[tokio::test]
async fn health_and_correlation_id() {
    let (server, _registry) = server();

    let response = server.get("/health").await;

    response.assert_status_ok();
    response.assert_text("ok");
    let correlation = response.header(HeaderName::from_static(CORRELATION_ID_HEADER));
    assert!(!correlation.is_empty());
}
