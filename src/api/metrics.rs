//! Prometheus metrics endpoint and HTTP request tracking middleware.

use axum::{
    body::Body,
    extract::{MatchedPath, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use std::time::Instant;

use crate::AppState;

pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";
pub const BOOKINGS_SETTLED_TOTAL: &str = "bookings_settled_total";
pub const CONFIRMATIONS_TOTAL: &str = "payment_confirmations_total";
pub const ENROLLMENTS_TOTAL: &str = "enrollments_total";
pub const SLOTS_EXPIRED_TOTAL: &str = "slots_expired_total";
pub const DRAFTS_ACTIVE: &str = "booking_drafts_active";

/// Install the Prometheus recorder. Call once during startup.
pub fn init_metrics() -> PrometheusHandle {
    let builder = PrometheusBuilder::new();
    let handle = builder
        .install_recorder()
        .expect("Failed to install Prometheus recorder");

    describe_counter!(
        HTTP_REQUESTS_TOTAL,
        "Total number of HTTP requests received"
    );
    describe_histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );
    describe_counter!(
        BOOKINGS_SETTLED_TOTAL,
        "Bookings written by the settlement transaction"
    );
    describe_counter!(
        CONFIRMATIONS_TOTAL,
        "Payment confirmation workers finished, by outcome"
    );
    describe_counter!(ENROLLMENTS_TOTAL, "Course enrollments created");
    describe_counter!(
        SLOTS_EXPIRED_TOTAL,
        "Availability slots auto-cancelled past their deadline"
    );
    describe_gauge!(DRAFTS_ACTIVE, "Booking drafts currently in progress");

    handle
}

/// GET /metrics, unauthenticated.
pub async fn metrics_endpoint(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    gauge!(DRAFTS_ACTIVE).set(state.drafts.len() as f64);

    match state.metrics_handle.as_ref() {
        Some(h) => (StatusCode::OK, h.render()),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Metrics not initialized".to_string(),
        ),
    }
}

/// Records request counts and durations with method, path, and status labels.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();

    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|mp| mp.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let method = request.method().to_string();

    let response = next.run(request).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(HTTP_REQUESTS_TOTAL, "method" => method.clone(), "path" => path.clone(), "status" => status).increment(1);
    histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method, "path" => path).record(duration);

    response
}
