//! Resilient Request Router (RRR) — the edge gateway layer (spec §4.3).

mod cache;
mod sanitize;

pub use cache::CachedResponse;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::circuit::CircuitBreakerRegistry;
use crate::discovery::ServiceDiscovery;
use crate::error::{ControlPlaneError, ErrorClass};
use crate::telemetry::Metrics;

use cache::{fingerprint, ResponseCache};

const MAX_RETRIES: u32 = 2;
const SLA_THRESHOLD: Duration = Duration::from_millis(2000);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl Method {
    fn is_read_only(self) -> bool {
        matches!(self, Method::Get)
    }

    fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
        }
    }
}

/// A proxied request (spec §4.3).
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    pub service: String,
    pub path: String,
    pub body: Vec<u8>,
    pub headers: Vec<(String, String)>,
    pub timeout: Duration,
    pub cache_ttl: Option<Duration>,
}

impl ProxyRequest {
    pub fn new(method: Method, service: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method,
            service: service.into(),
            path: path.into(),
            body: Vec::new(),
            headers: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            cache_ttl: None,
        }
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }
}

/// Response returned by the router.
#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub from_cache: bool,
    pub degraded: bool,
}

pub struct RequestRouter {
    discovery: Arc<dyn ServiceDiscovery>,
    circuits: Arc<CircuitBreakerRegistry>,
    http: reqwest::Client,
    cache: ResponseCache,
    metrics: Arc<Metrics>,
}

impl RequestRouter {
    pub fn new(
        discovery: Arc<dyn ServiceDiscovery>,
        circuits: Arc<CircuitBreakerRegistry>,
        metrics: Arc<Metrics>,
        cache_max_entries: usize,
    ) -> Self {
        Self {
            discovery,
            circuits,
            http: reqwest::Client::new(),
            cache: ResponseCache::new(cache_max_entries),
            metrics,
        }
    }

    /// Proxy a request per spec §4.3 steps 1-7.
    pub async fn proxy(&self, request: ProxyRequest) -> Result<ProxyResponse, ControlPlaneError> {
        let start = Instant::now();

        // Step 1: cache lookup for read-only requests with a TTL.
        let cache_key = fingerprint(request.method.as_str(), &request.service, &request.path, &request.body);
        if request.method.is_read_only() {
            if let Some(ttl) = request.cache_ttl {
                if ttl > Duration::ZERO {
                    if let Some(cached) = self.cache.get(&cache_key).await {
                        self.metrics.record_call(&request.service, request.method.as_str(), cached.status, start.elapsed(), None);
                        return Ok(ProxyResponse {
                            status: cached.status,
                            headers: cached.headers,
                            body: cached.body,
                            from_cache: true,
                            degraded: false,
                        });
                    }
                }
            }
        }

        let result = self.proxy_with_retry(&request, 0).await;

        let elapsed = start.elapsed();
        if elapsed > SLA_THRESHOLD {
            warn!(service = %request.service, elapsed_ms = elapsed.as_millis(), "SLA violation");
        }

        match &result {
            Ok(response) => {
                self.metrics.record_call(&request.service, request.method.as_str(), response.status, elapsed, None);
                // Step 7: cache GET 200s for the requested TTL.
                if request.method.is_read_only() && response.status == 200 {
                    if let Some(ttl) = request.cache_ttl {
                        if ttl > Duration::ZERO {
                            self.cache
                                .put(
                                    cache_key,
                                    CachedResponse {
                                        status: response.status,
                                        headers: response.headers.clone(),
                                        body: response.body.clone(),
                                    },
                                    ttl,
                                )
                                .await;
                        }
                    }
                }
            }
            Err(err) => {
                self.metrics.record_call(&request.service, request.method.as_str(), err.status_code(), elapsed, Some(err.class()));
            }
        }

        result
    }

    // Recursion through an async fn needs an explicit boxed-future return
    // (the alternative, boxing only the recursive call, still leaves the
    // compiler trying to size an infinitely-nested future type).
    fn proxy_with_retry<'a>(
        &'a self,
        request: &'a ProxyRequest,
        retry_count: u32,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<ProxyResponse, ControlPlaneError>> + Send + 'a>> {
        Box::pin(async move {
            // Step 2: resolve service name to a URL.
            let resolved = self
                .discovery
                .resolve(&request.service)
                .await
                .map_err(|e| ControlPlaneError::NotFound(e.to_string()))?;

            let service = request.service.clone();
            let outbound_headers = sanitize::build_outbound_headers(&request.headers);

            // Step 3: invoke through the circuit breaker guard.
            let call_result = self
                .circuits
                .execute(&service, || {
                    self.send_once(request, &resolved.url, &outbound_headers)
                })
                .await;

            match call_result {
                Ok(mut response) => {
                    response.degraded = resolved.degraded;
                    Ok(response)
                }
                Err(err) if err.is_retryable() && retry_count < MAX_RETRIES => {
                    // Step 5: sleep 2^retryCount seconds and recurse.
                    let delay = Duration::from_secs(2u64.pow(retry_count));
                    info!(service = %service, retry_count, delay_secs = delay.as_secs(), "retrying after transient failure");
                    tokio::time::sleep(delay).await;
                    self.proxy_with_retry(request, retry_count + 1).await
                }
                Err(err) => Err(err),
            }
        })
    }

    /// Perform a single outbound call, classifying the outcome per spec §4.3
    /// step 4/6.
    async fn send_once(
        &self,
        request: &ProxyRequest,
        base_url: &str,
        headers: &[(String, String)],
    ) -> Result<ProxyResponse, ControlPlaneError> {
        let service = request.service.clone();
        let url = format!("{}{}", base_url.trim_end_matches('/'), request.path);

        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
            Method::Patch => reqwest::Method::PATCH,
        };

        let mut builder = self.http.request(method, &url).timeout(request.timeout);
        for (name, value) in headers {
            builder = builder.header(name, value);
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder.send().await.map_err(|e| classify_reqwest_error(&service, e))?;

        let status = response.status();
        let resp_headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
            .collect();
        let body = response.bytes().await.map_err(|e| classify_reqwest_error(&service, e))?.to_vec();

        let status_code = status.as_u16();
        if status_code >= 500 && status_code != 501 {
            return Err(ControlPlaneError::Upstream5xx {
                service,
                status: status_code,
                message: String::from_utf8_lossy(&body).to_string(),
            });
        }

        // Status < 500 is non-retryable success for circuit purposes
        // (validation errors pass through to the caller untouched).
        Ok(ProxyResponse {
            status: status_code,
            headers: resp_headers,
            body,
            from_cache: false,
            degraded: false,
        })
    }
}

fn classify_reqwest_error(service: &str, err: reqwest::Error) -> ControlPlaneError {
    if err.is_timeout() {
        ControlPlaneError::Timeout {
            service: service.to_string(),
            message: err.to_string(),
        }
    } else {
        ControlPlaneError::Network {
            service: service.to_string(),
            message: err.to_string(),
        }
    }
}

/// Classify an error into the coarse buckets from spec §4.3 step 6, used by
/// the error envelope and by metrics.
pub fn classify(err: &ControlPlaneError) -> ErrorClass {
    err.class()
}

/// Map a non-2xx proxied response to the domain-meaningful error spec §4.3
/// step 6 names, for callers that need to branch on downstream status before
/// treating the body as a success schema. `proxy` already turns 5xx (other
/// than 501) into `Err(Upstream5xx)`, so a response ever reaching here only
/// carries a 2xx, a 3xx/4xx, or 501.
pub fn error_for_status(service: &str, response: &ProxyResponse) -> Option<ControlPlaneError> {
    if (200..300).contains(&response.status) {
        return None;
    }
    let message = String::from_utf8_lossy(&response.body).to_string();
    Some(match response.status {
        404 => ControlPlaneError::NotFound(format!("{service}: {message}")),
        409 => ControlPlaneError::Conflict(format!("{service}: {message}")),
        status => ControlPlaneError::Upstream4xx {
            service: service.to_string(),
            status,
            message,
        },
    })
}
