//! Metrics collection and exposition.
//!
//! # Metrics
//! - `branching_decisions_total` (counter): decisions by router, outcome
//!   (`branch`, `default`, `error`)
//! - `gateway_requests_total` (counter): requests by method, status
//! - `gateway_request_duration_seconds` (histogram): latency distribution
//! - `rate_limited_total` (counter): rejected requests by middleware

use std::net::SocketAddr;
use std::time::Instant;

use metrics::Counter;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Start the Prometheus exporter on `addr`. Requires a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;

    metrics::describe_counter!(
        "branching_decisions_total",
        "Branching decisions by router and outcome"
    );
    metrics::describe_counter!("gateway_requests_total", "Requests served by the gateway");
    metrics::describe_histogram!(
        "gateway_request_duration_seconds",
        "Gateway request duration in seconds"
    );
    metrics::describe_counter!("rate_limited_total", "Requests rejected by rate limiting");

    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

/// Per-router decision counters, registered once at router construction.
#[derive(Clone)]
pub struct DecisionCounters {
    pub branch: Counter,
    pub default: Counter,
    pub error: Counter,
}

impl DecisionCounters {
    pub fn new(router: &str) -> Self {
        let counter = |outcome: &'static str| {
            metrics::counter!(
                "branching_decisions_total",
                "router" => router.to_string(),
                "outcome" => outcome
            )
        };
        Self {
            branch: counter("branch"),
            default: counter("default"),
            error: counter("error"),
        }
    }
}

/// Record a completed gateway request.
pub fn record_request(method: &str, status: u16, start: Instant) {
    metrics::counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("gateway_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

/// Record a request rejected by a rate limiting middleware.
pub fn record_rate_limited(middleware: &str) {
    metrics::counter!("rate_limited_total", "middleware" => middleware.to_string()).increment(1);
}
