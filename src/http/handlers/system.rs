//! Health and metrics handlers.

use axum::{
    Json,
    http::{StatusCode, header},
    response::IntoResponse,
};
use chrono::Utc;

use super::super::types::HealthResponse;
use crate::metrics;

/// GET /health - Liveness check.
pub(crate) async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// GET /metrics - Prometheus metrics endpoint.
pub(crate) async fn metrics_endpoint() -> impl IntoResponse {
    let body = metrics::render_metrics();
    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        body,
    )
}
