//! Admin routes for service discovery (spec §4.2 `addEndpoint`/`removeEndpoint`,
//! SPEC_FULL.md §C).

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::gateway::AppState;
use crate::storage::TransactionalStorage;

/// `GET /admin/discovery` — every known endpoint, healthy or not.
pub async fn list_endpoints<T: TransactionalStorage + 'static>(State(state): State<AppState<T>>) -> Response {
    Json(state.discovery.list_endpoints().await).into_response()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointRequest {
    pub service_name: String,
    pub url: String,
}

/// `POST /admin/discovery` — register a new endpoint URL (no-op if already present).
pub async fn add_endpoint<T: TransactionalStorage + 'static>(
    State(state): State<AppState<T>>,
    Json(body): Json<EndpointRequest>,
) -> Response {
    state.discovery.add_endpoint(&body.service_name, &body.url).await;
    Json(state.discovery.list_endpoints().await).into_response()
}

/// `POST /admin/discovery/remove` — drop an endpoint URL.
pub async fn remove_endpoint<T: TransactionalStorage + 'static>(
    State(state): State<AppState<T>>,
    Json(body): Json<EndpointRequest>,
) -> Response {
    state.discovery.remove_endpoint(&body.service_name, &body.url).await;
    Json(state.discovery.list_endpoints().await).into_response()
}
