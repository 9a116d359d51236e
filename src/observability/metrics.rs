//! # Metrics Collection
//!
//! Prometheus metrics for the broker. Recording is a no-op until
//! [`init_metrics`] installs the exporter, so components can hold a
//! [`MetricsRecorder`] unconditionally.

use crate::config::ObservabilityConfig;
use crate::errors::{Error, Result};
use ::tracing::{info, warn};
use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Metrics recorder that tracks broker metrics
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsRecorder;

impl MetricsRecorder {
    /// Create a new metrics recorder instance
    pub fn new() -> Self {
        Self
    }

    /// Record an HTTP request
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration: f64) {
        let request_labels = [("method", method.to_string()), ("path", path.to_string())];
        counter!("http_requests_total", &request_labels).increment(1);
        histogram!("http_request_duration_seconds").record(duration);

        let status_label = [("status", status.to_string())];
        counter!("http_responses_total", &status_label).increment(1);
    }

    /// Record one call to the backing store with its outcome
    pub fn record_store_call(&self, operation: &str, outcome: &str, duration: f64) {
        let labels = [("operation", operation.to_string()), ("outcome", outcome.to_string())];
        counter!("store_calls_total", &labels).increment(1);

        let duration_labels = [("operation", operation.to_string())];
        histogram!("store_call_duration_seconds", &duration_labels).record(duration);
    }

    /// Record a lease issued by the backing store
    pub fn record_lease_issued(&self, role: &str) {
        let labels = [("role", role.to_string())];
        counter!("leases_issued_total", &labels).increment(1);
    }

    /// Record a lease served from cache
    pub fn record_lease_cache_hit(&self, role: &str) {
        let labels = [("role", role.to_string())];
        counter!("lease_cache_hits_total", &labels).increment(1);
    }

    /// Record a failed lease issuance
    pub fn record_lease_issue_failure(&self, role: &str) {
        let labels = [("role", role.to_string())];
        counter!("lease_issue_failures_total", &labels).increment(1);
    }

    /// Record a lease revoked on request
    pub fn record_lease_revoked(&self, role: &str) {
        let labels = [("role", role.to_string())];
        counter!("leases_revoked_total", &labels).increment(1);
    }

    /// Record the outcome of a credential connection test
    pub fn record_connection_test(&self, role: &str, result: &str) {
        let labels = [("role", role.to_string()), ("result", result.to_string())];
        counter!("connection_tests_total", &labels).increment(1);
    }

    /// Record a static secret mutation
    pub fn record_static_write(&self, operation: &str) {
        let labels = [("operation", operation.to_string())];
        counter!("static_secret_writes_total", &labels).increment(1);
    }

    pub fn register_broker_metrics(&self) {
        describe_counter!("http_requests_total", Unit::Count, "HTTP requests by method and path");
        describe_histogram!(
            "http_request_duration_seconds",
            Unit::Seconds,
            "HTTP request latency"
        );
        describe_counter!(
            "store_calls_total",
            Unit::Count,
            "Backing store calls grouped by operation and outcome"
        );
        describe_histogram!(
            "store_call_duration_seconds",
            Unit::Seconds,
            "Backing store call latency"
        );
        describe_counter!("leases_issued_total", Unit::Count, "Dynamic leases issued per role");
        describe_counter!(
            "lease_cache_hits_total",
            Unit::Count,
            "Dynamic lease requests served from cache"
        );
        describe_counter!(
            "lease_issue_failures_total",
            Unit::Count,
            "Dynamic lease issuance failures per role"
        );
        describe_counter!("leases_revoked_total", Unit::Count, "Dynamic leases revoked per role");
        describe_counter!(
            "connection_tests_total",
            Unit::Count,
            "Credential connection tests grouped by result"
        );
        describe_counter!(
            "static_secret_writes_total",
            Unit::Count,
            "Static secret mutations grouped by operation"
        );
    }
}

/// Initialize metrics collection and Prometheus exporter
pub fn init_metrics(config: &ObservabilityConfig) -> Result<()> {
    if !config.enable_metrics {
        return Ok(());
    }

    let metrics_addr = match config.metrics_bind_address() {
        Some(addr) => addr,
        None => {
            warn!("Metrics disabled: no bind address configured");
            return Ok(());
        }
    };

    let socket_addr: SocketAddr = metrics_addr.parse().map_err(|e| {
        Error::config(format!("Invalid metrics bind address '{}': {}", metrics_addr, e))
    })?;

    PrometheusBuilder::new()
        .with_http_listener(socket_addr)
        .add_global_label("service", &config.service_name)
        .install()
        .map_err(|e| Error::config(format!("Failed to initialize metrics exporter: {}", e)))?;

    MetricsRecorder::new().register_broker_metrics();

    info!(
        metrics_addr = %metrics_addr,
        service_name = %config.service_name,
        "Metrics collection initialized"
    );

    Ok(())
}
