//! Shared test harness for HTTP integration tests.
//!
//! [`TestHost`] builds the full router over an in-memory record store and a
//! temporary upload directory, then drives it in-process with
//! `tower::ServiceExt::oneshot`.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::extract::ConnectInfo;
use axum::http::{Request, Response, header};
use seedshare::constants::{MAX_FILE_SIZE_BYTES, MULTIPART_OVERHEAD_BYTES};
use seedshare::http::{AppState, RouterSettings, router};
use seedshare::reliability::{RateLimitConfig, RateLimiter};
use seedshare::services::{ContentStore, IngestConfig, Ingestor, Resolver};
use tempfile::TempDir;
use tower::ServiceExt;

pub const PUBLIC_URL: &str = "http://share.test";
const BOUNDARY: &str = "seedshare-test-boundary";

/// Builder for [`TestHost`].
pub struct TestHostBuilder {
    max_requests: u32,
    max_file_size: u64,
    retention: Duration,
}

impl TestHostBuilder {
    /// Requests allowed per client per minute.
    pub fn max_requests(mut self, max_requests: u32) -> Self {
        self.max_requests = max_requests;
        self
    }

    /// Record lifetime for new uploads.
    pub fn retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn start(self) -> TestHost {
        let upload_dir = TempDir::new().expect("Failed to create upload dir");
        let store = ContentStore::memory();

        let mut ingest = IngestConfig::new(upload_dir.path());
        ingest.max_file_size = self.max_file_size;
        ingest.retention = self.retention;

        let state = Arc::new(AppState {
            ingestor: Ingestor::new(store.clone(), ingest),
            resolver: Resolver::new(store.clone()),
            limiter: Arc::new(RateLimiter::new(RateLimitConfig {
                max_requests: self.max_requests,
                window: Duration::from_secs(60),
            })),
            public_url: PUBLIC_URL.to_string(),
        });
        let settings = RouterSettings {
            body_limit: self.max_file_size + MULTIPART_OVERHEAD_BYTES,
            request_timeout: Duration::from_secs(30),
            allowed_origins: vec!["*".to_string()],
        };

        TestHost {
            router: router(state, &settings),
            store,
            upload_dir,
        }
    }
}

/// In-process seedshare server.
pub struct TestHost {
    router: Router,
    pub store: ContentStore,
    upload_dir: TempDir,
}

impl TestHost {
    pub fn builder() -> TestHostBuilder {
        TestHostBuilder {
            max_requests: 1000,
            max_file_size: MAX_FILE_SIZE_BYTES,
            retention: Duration::from_secs(24 * 60 * 60),
        }
    }

    pub fn upload_dir(&self) -> &Path {
        self.upload_dir.path()
    }

    /// Files currently in the upload directory, staging files included.
    pub fn stored_files(&self) -> Vec<PathBuf> {
        std::fs::read_dir(self.upload_dir.path())
            .expect("Failed to read upload dir")
            .map(|entry| entry.expect("Failed to read entry").path())
            .collect()
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("Router is infallible")
    }

    /// Send `request` as if it came from `addr`.
    pub async fn send_from(&self, mut request: Request<Body>, addr: &str) -> Response<Body> {
        let addr: SocketAddr = addr.parse().expect("Invalid socket address");
        request.extensions_mut().insert(ConnectInfo(addr));
        self.send(request).await
    }

    pub async fn get(&self, path: &str) -> Response<Body> {
        self.send(Request::get(path).body(Body::empty()).unwrap())
            .await
    }

    pub async fn post_json(&self, path: &str, body: serde_json::Value) -> Response<Body> {
        let request = Request::post(path)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    pub async fn upload(&self, form: Multipart) -> Response<Body> {
        self.send(form.into_request()).await
    }

    /// Upload a text record.
    pub async fn upload_text(&self, seed_code: &str, text: &str) -> Response<Body> {
        self.upload(
            Multipart::new()
                .text("seed_code", seed_code)
                .text("upload_type", "text")
                .text("text_message", text),
        )
        .await
    }

    /// Upload a file record.
    pub async fn upload_file(&self, seed_code: &str, file_name: &str, bytes: &[u8]) -> Response<Body> {
        self.upload(
            Multipart::new()
                .text("seed_code", seed_code)
                .text("upload_type", "file")
                .file("file", file_name, bytes),
        )
        .await
    }
}

/// Minimal `multipart/form-data` body builder.
#[derive(Default)]
pub struct Multipart {
    body: Vec<u8>,
}

impl Multipart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, file_name: &str, bytes: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; \
                 filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(bytes);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn into_request(mut self) -> Request<Body> {
        self.body
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        Request::post("/api/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(self.body))
            .unwrap()
    }
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body")
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).expect("Body is not JSON")
}
