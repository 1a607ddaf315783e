//! Inbound HTTP surface (spec §6): route handlers, correlation-id/auth
//! middleware, error envelope rendering, health and metrics endpoints.

pub mod handlers;
mod middleware;

pub use middleware::RequestMeta;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::circuit::CircuitBreakerRegistry;
use crate::config::ServerConfig;
use crate::discovery::ServiceDiscovery;
use crate::saga::SagaCoordinator;
use crate::storage::TransactionalStorage;
use crate::telemetry::Metrics;

/// Everything a handler needs, generic over the storage backend. Manual
/// `Clone` because `#[derive(Clone)]` would add a spurious `T: Clone` bound —
/// every field here is already an `Arc`.
pub struct AppState<T> {
    pub storage: Arc<T>,
    pub coordinator: Arc<SagaCoordinator<T>>,
    pub discovery: Arc<dyn ServiceDiscovery>,
    pub circuits: Arc<CircuitBreakerRegistry>,
    pub metrics: Arc<Metrics>,
    pub config: Arc<ServerConfig>,
}

impl<T> Clone for AppState<T> {
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
            coordinator: self.coordinator.clone(),
            discovery: self.discovery.clone(),
            circuits: self.circuits.clone(),
            metrics: self.metrics.clone(),
            config: self.config.clone(),
        }
    }
}

/// Wire the full route table (spec §6): `/api/v1` order routes behind auth,
/// admin discovery routes behind auth, health/metrics routes open.
pub fn build_router<T: TransactionalStorage + 'static>(state: AppState<T>) -> Router {
    let auth_config = state.config.clone();

    let api = Router::new()
        .route("/orders", post(handlers::orders::create_order::<T>))
        .route("/orders/:id", get(handlers::orders::get_order::<T>).put(handlers::orders::update_order::<T>))
        .route("/orders/:id/status", get(handlers::orders::get_status::<T>))
        .route("/orders/:id/cancel", post(handlers::orders::cancel_order::<T>))
        .route("/orders/:id/events", get(handlers::orders::list_events::<T>))
        .route(
            "/admin/discovery",
            get(handlers::admin::list_endpoints::<T>).post(handlers::admin::add_endpoint::<T>),
        )
        .route("/admin/discovery/remove", post(handlers::admin::remove_endpoint::<T>))
        .layer(axum::middleware::from_fn(move |req, next| {
            let config = auth_config.clone();
            async move { middleware::auth_middleware(config, req, next).await }
        }));

    Router::new()
        .nest("/api/v1", api)
        .route("/health", get(handlers::health::health))
        .route("/health/ready", get(handlers::health::ready::<T>))
        .route("/health/live", get(handlers::health::live))
        .route("/metrics", get(handlers::metrics::metrics_json::<T>))
        .route("/metrics/prometheus", get(handlers::metrics::metrics_prometheus::<T>))
        .layer(axum::middleware::from_fn(middleware::correlation_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config))
        .with_state(state)
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    if config.cors_allowed_origins.is_empty() {
        return CorsLayer::new();
    }
    let origins: Vec<_> = config
        .cors_allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    CorsLayer::new().allow_origin(AllowOrigin::list(origins))
}
