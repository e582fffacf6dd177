//! # Metrics Collection
//!
//! Counters and gauges for sessions, admission control, conversions and
//! publishing. Recording is a no-op until a recorder is installed.

use std::net::SocketAddr;

use ::tracing::info;
use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::config::ObservabilityConfig;
use crate::errors::{Error, Result};

/// Install the Prometheus exporter on `0.0.0.0:{metrics_port}`
pub fn init_metrics(config: &ObservabilityConfig) -> Result<()> {
    let addr: SocketAddr = ([0, 0, 0, 0], config.metrics_port).into();

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .add_global_label("service", crate::APP_NAME)
        .install()
        .map_err(|e| Error::config(format!("Failed to initialize metrics exporter: {}", e)))?;

    register_metrics();
    info!(metrics_addr = %addr, "Prometheus metrics exporter started");
    Ok(())
}

fn register_metrics() {
    describe_gauge!("mcp_sessions_active", "Open SSE sessions");
    describe_counter!("mcp_sessions_opened_total", "SSE sessions opened");
    describe_counter!("mcp_requests_total", "JSON-RPC requests dispatched, by method");
    describe_counter!("rate_limit_rejections_total", "Requests rejected by the rate limiter");
    describe_counter!("auth_failures_total", "Requests rejected by the authenticator");
    describe_counter!("conversions_total", "Conversions attempted, by engine and status");
    describe_counter!(
        "publish_operations_total",
        "Publish workflow operations, by kind and status"
    );
}

pub fn record_session_opened() {
    counter!("mcp_sessions_opened_total").increment(1);
    gauge!("mcp_sessions_active").increment(1.0);
}

pub fn record_session_closed() {
    gauge!("mcp_sessions_active").decrement(1.0);
}

pub fn record_request(method: &str) {
    let labels = [("method", method.to_string())];
    counter!("mcp_requests_total", &labels).increment(1);
}

pub fn record_rate_limited() {
    counter!("rate_limit_rejections_total").increment(1);
}

pub fn record_auth_failure(reason: &'static str) {
    counter!("auth_failures_total", "reason" => reason).increment(1);
}

pub fn record_conversion(engine: &str, success: bool) {
    let status = if success { "success" } else { "error" };
    let labels = [("engine", engine.to_string()), ("status", status.to_string())];
    counter!("conversions_total", &labels).increment(1);
}

pub fn record_publish(operation: &'static str, success: bool) {
    let status = if success { "success" } else { "error" };
    counter!("publish_operations_total", "operation" => operation, "status" => status)
        .increment(1);
}
