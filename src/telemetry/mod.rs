//! Tracing initialization and the in-process metrics registry backing
//! `GET /metrics` and `GET /metrics/prometheus` (spec §6, SPEC_FULL.md §C).
//!
//! A real deployment ships these to an OTel collector (out of scope, spec
//! §1); the counters and histograms themselves are ambient stack and are
//! implemented here regardless.

mod metrics;

pub use metrics::Metrics;

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber. `json` selects structured JSON
/// output (production); otherwise a human-readable format is used (dev).
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
