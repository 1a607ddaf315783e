//! End-to-end HTTP-layer tests for the gateway, exercising the scenarios in
//! spec §8 against the in-memory storage and bus backends.

use std::collections::HashMap;
use std::sync::Arc;

use http_body_util::BodyExt;
use order_control_plane::circuit::{CircuitBreakerConfig, CircuitBreakerRegistry};
use order_control_plane::config::ServerConfig;
use order_control_plane::discovery::{ServiceDiscovery, StaticServiceDiscovery};
use order_control_plane::gateway::{build_router, AppState};
use order_control_plane::router::RequestRouter;
use order_control_plane::saga::{order_processing_definition, SagaCoordinator};
use order_control_plane::storage::mock::MockStorage;
use order_control_plane::telemetry::Metrics;
use serde_json::{json, Value};
use tower::ServiceExt;

fn test_app() -> axum::Router {
    let storage = Arc::new(MockStorage::new());
    let metrics = Arc::new(Metrics::new());
    let circuits = Arc::new(CircuitBreakerRegistry::new(CircuitBreakerConfig::default()));
    let discovery: Arc<dyn ServiceDiscovery> = Arc::new(StaticServiceDiscovery::new(HashMap::new()));
    let router = Arc::new(RequestRouter::new(discovery.clone(), circuits.clone(), metrics.clone(), 100));
    let coordinator = Arc::new(SagaCoordinator::new(storage.clone(), order_processing_definition(router)));

    let state = AppState {
        storage,
        coordinator,
        discovery,
        circuits,
        metrics,
        config: Arc::new(ServerConfig::default()),
    };
    build_router(state)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn create_order_body() -> Value {
    json!({
        "customerId": "cust-1",
        "restaurantId": "rest-1",
        "items": [
            { "itemId": "item-1", "name": "Burrito", "quantity": 2, "unitPrice": 9.5 }
        ],
        "deliveryLocation": { "lat": 37.7, "lng": -122.4, "address": "1 Market St" }
    })
}

#[tokio::test]
async fn create_order_returns_pending_order_synchronously() {
    let app = test_app();
    let response = app
        .oneshot(
            axum::http::Request::builder()
                .method("POST")
                .uri("/api/v1/orders")
                .header("content-type", "application/json")
                .body(axum::body::Body::from(create_order_body().to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), axum::http::StatusCode::CREATED);
    let order = body_json(response).await;
    assert_eq!(order["status"], "Pending");
    assert!(order["id"].is_string());
}

#[tokio::test]
async fn get_unknown_order_returns_not_found_envelope() {
    let app = test_app();
    let missing = uuid::Uuid::new_v4();
    let response = app
        .oneshot(
            axum::http::Request::builder()
                .method("GET")
                .uri(format!("/api/v1/orders/{missing}"))
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), axum::http::StatusCode::NOT_FOUND);
    let envelope = body_json(response).await;
    assert_eq!(envelope["gateway"], "order-control-plane");
    assert!(envelope["correlationId"].is_string());
}

#[tokio::test]
async fn cancel_then_cancel_again_is_conflict() {
    let app = test_app();

    let create_response = app
        .clone()
        .oneshot(
            axum::http::Request::builder()
                .method("POST")
                .uri("/api/v1/orders")
                .header("content-type", "application/json")
                .body(axum::body::Body::from(create_order_body().to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let order = body_json(create_response).await;
    let id = order["id"].as_str().unwrap();

    let first_cancel = app
        .clone()
        .oneshot(
            axum::http::Request::builder()
                .method("POST")
                .uri(format!("/api/v1/orders/{id}/cancel"))
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(first_cancel.status(), axum::http::StatusCode::OK);

    let second_cancel = app
        .oneshot(
            axum::http::Request::builder()
                .method("POST")
                .uri(format!("/api/v1/orders/{id}/cancel"))
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(second_cancel.status(), axum::http::StatusCode::CONFLICT);
}

#[tokio::test]
async fn health_and_ready_do_not_require_auth() {
    let app = test_app();
    for path in ["/health", "/health/live", "/health/ready"] {
        let response = app
            .clone()
            .oneshot(axum::http::Request::builder().uri(path).body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK, "{path} should be reachable");
    }
}

#[tokio::test]
async fn admin_discovery_add_and_list_round_trips() {
    let app = test_app();

    let add = app
        .clone()
        .oneshot(
            axum::http::Request::builder()
                .method("POST")
                .uri("/api/v1/admin/discovery")
                .header("content-type", "application/json")
                .body(axum::body::Body::from(json!({"serviceName": "inventory-service", "url": "http://inventory:8080"}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(add.status(), axum::http::StatusCode::OK);

    let list = app
        .oneshot(axum::http::Request::builder().uri("/api/v1/admin/discovery").body(axum::body::Body::empty()).unwrap())
        .await
        .unwrap();
    let endpoints = body_json(list).await;
    assert!(endpoints.as_array().unwrap().iter().any(|e| e["url"] == "http://inventory:8080"));
}
