//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status, kind
//! - `gateway_request_duration_seconds` (histogram): latency by kind
//! - `gateway_resolution_failures_total` (counter): by resolver and reason
//! - `gateway_discovery_cycles_total` (counter): by outcome
//! - `gateway_address_table_entries` (gauge): size of the published table
//! - `gateway_active_tunnels` (gauge): open websocket tunnels
//!
//! Without an installed recorder every call is a no-op.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, kind: &'static str, elapsed: Duration) {
    counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "kind" => kind
    )
    .increment(1);
    histogram!("gateway_request_duration_seconds", "kind" => kind).record(elapsed.as_secs_f64());
}

pub fn record_resolution_failure(resolver: &'static str, reason: &'static str) {
    counter!(
        "gateway_resolution_failures_total",
        "resolver" => resolver,
        "reason" => reason
    )
    .increment(1);
}

pub fn record_discovery_cycle(outcome: &'static str) {
    counter!("gateway_discovery_cycles_total", "outcome" => outcome).increment(1);
}

pub fn set_address_table_size(entries: usize) {
    gauge!("gateway_address_table_entries").set(entries as f64);
}

pub fn tunnel_opened() {
    gauge!("gateway_active_tunnels").increment(1.0);
}

pub fn tunnel_closed() {
    gauge!("gateway_active_tunnels").decrement(1.0);
}
