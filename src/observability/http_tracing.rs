//! # HTTP Request Metrics Middleware
//!
//! Records request counts and latency per matched route. Spans come from
//! `tower_http::trace::TraceLayer`.

use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use std::time::Instant;

use super::metrics::MetricsRecorder;

/// Axum middleware that records Prometheus metrics for each HTTP request
pub async fn trace_http_requests(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    // Route templates keep label cardinality bounded
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let start = Instant::now();

    let response = next.run(request).await;

    let status = response.status().as_u16();
    let elapsed = start.elapsed();
    MetricsRecorder::new().record_http_request(&method, &path, status, elapsed.as_secs_f64());

    tracing::debug!(
        method = %method,
        path = %path,
        status = status,
        elapsed_ms = elapsed.as_millis() as u64,
        "HTTP request completed"
    );

    response
}
