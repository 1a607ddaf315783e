//! Correlation id propagation, bearer-token auth, and error envelope
//! rendering (spec §6 Headers, Error envelope).

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{FromRequestParts, Request};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::error::{ControlPlaneError, ErrorEnvelope};

const CORRELATION_HEADER: &str = "x-correlation-id";
const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone)]
struct CorrelationId(String);

#[derive(Clone)]
struct RequestId(String);

/// Attach `X-Correlation-ID`/`X-Request-ID` to the request (generating them
/// if absent), echo them on the response, and open a tracing span carrying
/// both as fields so they survive structured export.
pub async fn correlation_middleware(mut req: Request, next: Next) -> Response {
    let correlation_id = header_or_new(&req, CORRELATION_HEADER);
    let request_id = header_or_new(&req, REQUEST_ID_HEADER);

    req.extensions_mut().insert(CorrelationId(correlation_id.clone()));
    req.extensions_mut().insert(RequestId(request_id.clone()));

    let span = tracing::info_span!("request", correlation_id = %correlation_id, request_id = %request_id);
    let mut response = next.run(req).instrument(span).await;

    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        response.headers_mut().insert(CORRELATION_HEADER, value);
    }
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

fn header_or_new(req: &Request, name: &str) -> String {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Require `Authorization: Bearer <token>` when `config.auth_enabled`;
/// a no-op otherwise (spec §6 Headers — "unless auth is disabled in
/// development").
pub async fn auth_middleware(config: Arc<ServerConfig>, req: Request, next: Next) -> Response {
    if !config.auth_enabled {
        return next.run(req).await;
    }

    let presented = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match (presented, config.auth_token.as_deref()) {
        (Some(token), Some(expected)) if token == expected => next.run(req).await,
        _ => {
            let correlation_id = header_or_new(&req, CORRELATION_HEADER);
            let err = ControlPlaneError::Auth("missing or invalid bearer token".to_string());
            let envelope = ErrorEnvelope::new(&err, req.uri().path(), req.method().as_str(), correlation_id);
            (StatusCode::UNAUTHORIZED, Json(envelope)).into_response()
        }
    }
}

/// Bundles the request path, method, and correlation id a handler needs to
/// render the error envelope from spec §6 without threading them through
/// every fallible call by hand.
pub struct RequestMeta {
    pub path: String,
    pub method: String,
    pub correlation_id: String,
}

impl RequestMeta {
    pub fn error_response(&self, err: &ControlPlaneError) -> Response {
        let envelope = ErrorEnvelope::new(err, self.path.clone(), self.method.clone(), self.correlation_id.clone());
        let status = StatusCode::from_u16(envelope.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(envelope)).into_response()
    }
}

impl<S> FromRequestParts<S> for RequestMeta
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let correlation_id = parts
            .extensions
            .get::<CorrelationId>()
            .map(|c| c.0.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        Ok(Self {
            path: parts.uri.path().to_string(),
            method: parts.method.to_string(),
            correlation_id,
        })
    }
}
