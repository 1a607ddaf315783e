//! Health probe endpoints (spec §6): `/health`, `/health/ready`, `/health/live`.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::gateway::AppState;
use crate::storage::TransactionalStorage;

/// Liveness + a one-line summary; always 200 if the process can answer at all.
pub async fn health() -> Response {
    Json(serde_json::json!({ "status": "ok" })).into_response()
}

/// Process is up and the event loop is responsive — never touches storage.
pub async fn live() -> Response {
    Json(serde_json::json!({ "status": "live" })).into_response()
}

/// Process is ready to accept traffic — storage must be reachable. Uses the
/// relay's own read path (`poll_outbox` with a tiny limit) as the cheapest
/// available round-trip, rather than adding a dedicated ping query.
pub async fn ready<T: TransactionalStorage + 'static>(State(state): State<AppState<T>>) -> Response {
    match state.storage.poll_outbox(1).await {
        Ok(_) => Json(serde_json::json!({ "status": "ready" })).into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "status": "not_ready", "error": e.to_string() })),
        )
            .into_response(),
    }
}
