//! Metrics endpoints (spec §6): `/metrics` (JSON), `/metrics/prometheus` (text).

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::gateway::AppState;
use crate::storage::TransactionalStorage;

pub async fn metrics_json<T: TransactionalStorage + 'static>(State(state): State<AppState<T>>) -> Response {
    let mut snapshot = state.metrics.snapshot_json();
    let circuits = state.circuits.snapshot().await;
    if let Some(obj) = snapshot.as_object_mut() {
        obj.insert("circuits".to_string(), serde_json::to_value(circuits).unwrap_or_default());
    }
    Json(snapshot).into_response()
}

pub async fn metrics_prometheus<T: TransactionalStorage + 'static>(State(state): State<AppState<T>>) -> Response {
    state.metrics.render_prometheus().into_response()
}
