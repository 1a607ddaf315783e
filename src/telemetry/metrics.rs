//! In-process metrics registry.
//!
//! No scraping/export is implemented (metrics scraping is an external
//! collaborator per spec §1) — this just accumulates the counters and
//! histograms that `/metrics` and `/metrics/prometheus` render.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;

use crate::error::ErrorClass;

#[derive(Debug, Default, Clone, Serialize)]
pub struct CallStats {
    pub count: u64,
    pub error_count: u64,
    pub total_duration_ms: u64,
    pub max_duration_ms: u64,
}

impl CallStats {
    fn record(&mut self, duration: Duration, is_error: bool) {
        self.count += 1;
        if is_error {
            self.error_count += 1;
        }
        let ms = duration.as_millis() as u64;
        self.total_duration_ms += ms;
        self.max_duration_ms = self.max_duration_ms.max(ms);
    }

    fn avg_duration_ms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_duration_ms as f64 / self.count as f64
        }
    }
}

/// Per-(service, method) call counters, the outbox lag gauge, and the DLQ
/// counter. Kept intentionally small: a metrics *sink* is out of scope
/// (spec §1), this is just the registry an exporter would read from.
#[derive(Default)]
pub struct Metrics {
    calls: Mutex<HashMap<(String, String), CallStats>>,
    outbox_lag_seconds: Mutex<f64>,
    dlq_total: Mutex<u64>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_call(&self, service: &str, method: &str, status: u16, duration: Duration, error_class: Option<ErrorClass>) {
        let is_error = error_class.is_some() || status >= 400;
        let mut calls = self.calls.lock().expect("metrics mutex poisoned");
        calls
            .entry((service.to_string(), method.to_string()))
            .or_default()
            .record(duration, is_error);
    }

    pub fn record_outbox_lag(&self, seconds: f64) {
        *self.outbox_lag_seconds.lock().expect("metrics mutex poisoned") = seconds;
    }

    pub fn record_dlq(&self) {
        *self.dlq_total.lock().expect("metrics mutex poisoned") += 1;
    }

    pub fn snapshot_json(&self) -> serde_json::Value {
        let calls = self.calls.lock().expect("metrics mutex poisoned");
        let calls_json: Vec<serde_json::Value> = calls
            .iter()
            .map(|((service, method), stats)| {
                serde_json::json!({
                    "service": service,
                    "method": method,
                    "count": stats.count,
                    "error_count": stats.error_count,
                    "avg_duration_ms": stats.avg_duration_ms(),
                    "max_duration_ms": stats.max_duration_ms,
                })
            })
            .collect();
        serde_json::json!({
            "calls": calls_json,
            "outbox_lag_seconds": *self.outbox_lag_seconds.lock().expect("metrics mutex poisoned"),
            "dlq_total": *self.dlq_total.lock().expect("metrics mutex poisoned"),
        })
    }

    pub fn render_prometheus(&self) -> String {
        let calls = self.calls.lock().expect("metrics mutex poisoned");
        let mut out = String::new();
        out.push_str("# HELP rrr_call_total Total outbound calls by service/method\n");
        out.push_str("# TYPE rrr_call_total counter\n");
        for ((service, method), stats) in calls.iter() {
            out.push_str(&format!(
                "rrr_call_total{{service=\"{service}\",method=\"{method}\"}} {}\n",
                stats.count
            ));
        }
        out.push_str("# HELP rrr_call_errors_total Total failed outbound calls\n");
        out.push_str("# TYPE rrr_call_errors_total counter\n");
        for ((service, method), stats) in calls.iter() {
            out.push_str(&format!(
                "rrr_call_errors_total{{service=\"{service}\",method=\"{method}\"}} {}\n",
                stats.error_count
            ));
        }
        out.push_str("# HELP outbox_lag_seconds Age of the oldest unprocessed outbox event\n");
        out.push_str("# TYPE outbox_lag_seconds gauge\n");
        out.push_str(&format!(
            "outbox_lag_seconds {}\n",
            *self.outbox_lag_seconds.lock().expect("metrics mutex poisoned")
        ));
        out.push_str("# HELP outbox_dlq_total Total events routed to the dead-letter topic\n");
        out.push_str("# TYPE outbox_dlq_total counter\n");
        out.push_str(&format!("outbox_dlq_total {}\n", *self.dlq_total.lock().expect("metrics mutex poisoned")));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_calls_and_renders() {
        let metrics = Metrics::new();
        metrics.record_call("inventory-service", "POST", 200, Duration::from_millis(50), None);
        metrics.record_call("inventory-service", "POST", 500, Duration::from_millis(150), Some(ErrorClass::Upstream5xx));
        let rendered = metrics.render_prometheus();
        assert!(rendered.contains("rrr_call_total"));
        assert!(rendered.contains("rrr_call_errors_total{service=\"inventory-service\",method=\"POST\"} 1"));
    }
}
