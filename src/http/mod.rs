//! HTTP API server for sharing content by seed code.
//!
//! ## Endpoints
//!
//! ### Content (`/api`, rate-limited per client IP)
//! - `POST /api/upload` - Upload text or a file (multipart)
//! - `POST /api/file-name` - Text body or storage reference for a seed code
//! - `GET /api/download/{seed_code}` - Download as an attachment
//! - `GET /api/view-file/{seed_code}` - Inline text, streamed media, or metadata
//!
//! ### Observability
//! - `GET /metrics` - Prometheus metrics
//! - `GET /health` - Health check
//!
//! A client over its budget gets `429` with a plain-text body. All other
//! errors are JSON `{"error": "..."}`.

mod audit;
mod handlers;
pub mod types;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{ConnectInfo, DefaultBodyLimit, Request, State},
    http::{Extensions, HeaderValue, Method, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tracing::{debug, error, warn};

use self::audit::{AuditEvent, log_audit_event};
use self::types::ErrorResponse;
use crate::constants::{API_PREFIX, RATE_LIMITED_MESSAGE};
use crate::error::Error;
use crate::{logging, metrics};
use crate::reliability::{Admission, RateLimiter};
use crate::services::{Ingestor, Resolver};

// =============================================================================
// App State
// =============================================================================

/// Shared application state for HTTP handlers.
pub struct AppState {
    pub ingestor: Ingestor,
    pub resolver: Resolver,
    pub limiter: Arc<RateLimiter>,
    /// Base URL for download links, without a trailing slash.
    pub public_url: String,
}

pub type SharedState = Arc<AppState>;

/// Router-level settings that are not part of [`AppState`].
#[derive(Debug, Clone)]
pub struct RouterSettings {
    /// Request body cap in bytes.
    pub body_limit: u64,
    /// Timeout for retrieval routes. Uploads are not timed.
    pub request_timeout: Duration,
    /// CORS origins; `*` mirrors the request origin.
    pub allowed_origins: Vec<String>,
}

/// Build the application router.
pub fn router(state: SharedState, settings: &RouterSettings) -> Router {
    let body_limit = usize::try_from(settings.body_limit).unwrap_or(usize::MAX);

    // Uploads are bounded by the body limit, not by wall-clock time.
    let retrieval = Router::new()
        .route("/file-name", post(handlers::file_name))
        .route("/download/{seed_code}", get(handlers::download))
        .route("/view-file/{seed_code}", get(handlers::view_file))
        .layer(TimeoutLayer::new(settings.request_timeout));

    let api = Router::new()
        .route("/upload", post(handlers::upload))
        .merge(retrieval)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ));

    Router::new()
        .nest(API_PREFIX, api)
        .route("/metrics", get(handlers::metrics_endpoint))
        .route("/health", get(handlers::health))
        .with_state(state)
        .layer(cors_layer(&settings.allowed_origins))
        .layer(middleware::from_fn(metrics_middleware))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::mirror_request()
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                    None
                },
            })
            .collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

// =============================================================================
// Middleware
// =============================================================================

/// Identify the client by source IP.
///
/// Requests without connection info (in-process tests) share one key.
pub(crate) fn client_key(extensions: &Extensions) -> String {
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(
            || "unknown".to_string(),
            |ConnectInfo(addr)| addr.ip().to_string(),
        )
}

/// Middleware enforcing the per-client request budget on `/api` routes.
async fn rate_limit_middleware(
    State(state): State<SharedState>,
    request: Request,
    next: Next,
) -> Response {
    let client = client_key(request.extensions());

    match state.limiter.admit(&client) {
        Admission::Allow => next.run(request).await,
        Admission::Deny => {
            metrics::record_rate_limited();
            log_audit_event(AuditEvent::RateLimited {
                client: client.clone(),
                path: request.uri().path().to_string(),
            });
            AppError::from(Error::rate_limited(client)).into_response()
        },
    }
}

/// Middleware to record HTTP request metrics.
async fn metrics_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    let duration = start.elapsed();
    let status = response.status().as_u16();

    metrics::record_http_request(&method, &path, status, duration.as_secs_f64());
    logging::log_request_complete(
        &method,
        &path,
        status,
        u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
    );

    response
}

// =============================================================================
// Errors
// =============================================================================

/// Generic message for server-side failures.
const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

/// Handler error, rendered as `{"error": message}`.
#[derive(Debug)]
pub(crate) struct AppError(Error);

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let message = match &self.0 {
            Error::Storage(e) => {
                error!(error = %format!("{e:#}"), "Request failed");
                INTERNAL_ERROR_MESSAGE.to_string()
            },
            Error::RateLimited { .. } => {
                return (status, RATE_LIMITED_MESSAGE).into_response();
            },
            other => {
                debug!(error = %other, status = status.as_u16(), "Request rejected");
                other.to_string()
            },
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

// =============================================================================
// Server
// =============================================================================

/// Serve `app` on `listener` until `shutdown` completes.
///
/// # Errors
///
/// Returns an error if the server fails while accepting connections.
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .context("HTTP server error")
}
