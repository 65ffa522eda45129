//! Prometheus metrics for the seedshare server.
//!
//! Metrics are exposed at `GET /metrics` in Prometheus text format.
//!
//! # Metrics Exposed
//!
//! ## Request Metrics
//! - `seedshare_http_requests_total` - Total HTTP requests (labels: method, path, status)
//! - `seedshare_http_request_duration_seconds` - Request duration histogram
//! - `seedshare_rate_limited_total` - Requests rejected by the rate limiter
//!
//! ## Content Metrics
//! - `seedshare_uploads_total` - Accepted uploads (labels: kind)
//! - `seedshare_upload_bytes_total` - Bytes stored by file uploads
//! - `seedshare_upload_rejections_total` - Rejected uploads (labels: reason)
//! - `seedshare_retrievals_total` - Successful retrievals (labels: mode)
//!
//! ## Sweep Metrics
//! - `seedshare_sweeps_total` - Expiry sweeps run (labels: outcome)
//! - `seedshare_swept_records_total` - Records removed by sweeps
//! - `seedshare_swept_files_total` - Files removed by sweeps

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

use crate::services::SweepReport;

/// Global Prometheus handle for rendering metrics.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initializes the metrics system.
///
/// Call once at startup before recording any metrics. Calling it again is a
/// no-op returning the existing handle.
///
/// # Errors
///
/// Returns an error if another global recorder is already installed.
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus recorder: {e}"))?;

    register_metrics();
    let _ = PROMETHEUS_HANDLE.set(handle.clone());

    Ok(handle)
}

/// Gets the global Prometheus handle.
pub fn get_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

fn register_metrics() {
    describe_counter!("seedshare_http_requests_total", "Total number of HTTP requests");
    describe_histogram!(
        "seedshare_http_request_duration_seconds",
        "HTTP request duration in seconds"
    );
    describe_counter!(
        "seedshare_rate_limited_total",
        "Requests rejected by the per-client rate limiter"
    );

    describe_counter!("seedshare_uploads_total", "Accepted uploads by kind");
    describe_counter!("seedshare_upload_bytes_total", "Bytes stored by file uploads");
    describe_counter!(
        "seedshare_upload_rejections_total",
        "Rejected uploads by reason"
    );
    describe_counter!("seedshare_retrievals_total", "Successful retrievals by mode");

    describe_counter!("seedshare_sweeps_total", "Expiry sweeps run");
    describe_counter!(
        "seedshare_swept_records_total",
        "Records removed by expiry sweeps"
    );
    describe_counter!(
        "seedshare_swept_files_total",
        "Files removed by expiry sweeps"
    );
}

// =============================================================================
// HTTP Metrics
// =============================================================================

/// Records an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let path = normalize_path(path);

    counter!(
        "seedshare_http_requests_total",
        "method" => method.to_string(),
        "path" => path.clone(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        "seedshare_http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => path
    )
    .record(duration_secs);
}

/// Records a rate-limit denial.
pub fn record_rate_limited() {
    counter!("seedshare_rate_limited_total").increment(1);
}

/// Maps a request path to a bounded label. Seed codes never become labels.
fn normalize_path(path: &str) -> String {
    const SEEDED: [&str; 2] = ["/api/download/", "/api/view-file/"];
    const FIXED: [&str; 4] = ["/api/upload", "/api/file-name", "/health", "/metrics"];

    if let Some(prefix) = SEEDED.iter().find(|p| path.starts_with(*p)) {
        return format!("{prefix}{{seed_code}}");
    }
    if FIXED.contains(&path) {
        return path.to_string();
    }
    "other".to_string()
}

// =============================================================================
// Content Metrics
// =============================================================================

/// Records an accepted upload.
pub fn record_upload(kind: &str, bytes: Option<u64>) {
    counter!("seedshare_uploads_total", "kind" => kind.to_string()).increment(1);
    if let Some(bytes) = bytes {
        counter!("seedshare_upload_bytes_total").increment(bytes);
    }
}

/// Records a rejected upload.
pub fn record_upload_rejection(reason: &'static str) {
    counter!("seedshare_upload_rejections_total", "reason" => reason).increment(1);
}

/// Records a successful retrieval (`file-name`, `download`, `view`).
pub fn record_retrieval(mode: &'static str) {
    counter!("seedshare_retrievals_total", "mode" => mode).increment(1);
}

// =============================================================================
// Sweep Metrics
// =============================================================================

/// Records the outcome of one expiry sweep.
pub fn record_sweep(report: &SweepReport) {
    let outcome = if report.is_clean() { "clean" } else { "partial" };
    counter!("seedshare_sweeps_total", "outcome" => outcome).increment(1);
    counter!("seedshare_swept_records_total").increment(report.records_removed as u64);
    counter!("seedshare_swept_files_total").increment(report.files_removed as u64);
}

/// Renders all metrics in Prometheus text format.
pub fn render_metrics() -> String {
    match get_handle() {
        Some(handle) => handle.render(),
        None => "# Metrics not initialized\n".to_string(),
    }
}
