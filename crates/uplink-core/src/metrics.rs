//! Metrics for gateway observability.
//!
//! Emitted through the `metrics` facade; without an installed recorder every
//! call is a no-op, so embedding applications choose the exporter.
//!
//! - `uplink_requests_total{service,outcome}` - Counter of settled requests
//! - `uplink_request_duration_seconds{service,outcome}` - Histogram of request durations
//! - `uplink_cache_total{op}` - Counter of cache hits, misses, stores, evictions
//! - `uplink_breaker_transitions_total{service,state}` - Counter of breaker state changes
//! - `uplink_rate_limited_total` - Counter of local rate-limit rejections

// Metrics: bounded counters only.
#![allow(clippy::arithmetic_side_effects, reason = "metrics: bounded counters")]

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::sync::Once;
use uplink_types::CircuitState;

static DESCRIBED: Once = Once::new();

/// Register metric descriptions with the installed recorder.
///
/// Call after installing a recorder; repeated calls are ignored.
pub fn init_metrics() {
    DESCRIBED.call_once(|| {
        describe_counter!("uplink_requests_total", "Gateway requests by service and outcome");
        describe_histogram!(
            "uplink_request_duration_seconds",
            "Wall time of gateway requests in seconds"
        );
        describe_counter!("uplink_cache_total", "Response cache operations by kind");
        describe_counter!(
            "uplink_breaker_transitions_total",
            "Circuit breaker state changes by service and new state"
        );
        describe_counter!(
            "uplink_rate_limited_total",
            "Requests rejected by the local token bucket"
        );
    });
}

/// Record a settled request.
///
/// Labels: outcome = "ok" | error variant in snake case
pub(crate) fn record_request(service: &str, outcome: &str, duration_ms: u64) {
    let labels = [("service", service.to_string()), ("outcome", outcome.to_string())];
    counter!("uplink_requests_total", &labels).increment(1);
    histogram!("uplink_request_duration_seconds", &labels).record(duration_ms as f64 / 1000.0);
}

/// Labels: op = "hit" | "miss" | "store" | "evict"
pub(crate) fn record_cache(op: &str) {
    let labels = [("op", op.to_string())];
    counter!("uplink_cache_total", &labels).increment(1);
}

pub(crate) fn record_breaker_transition(service: &str, state: CircuitState) {
    let labels = [("service", service.to_string()), ("state", state.to_string())];
    counter!("uplink_breaker_transitions_total", &labels).increment(1);
}

pub(crate) fn record_rate_limited() {
    counter!("uplink_rate_limited_total").increment(1);
}
