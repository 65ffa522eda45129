//! Centralized constants for limits and defaults.
//!
//! Every tunable number the service uses lives here so the limits can be
//! audited in one place. Most of them can be overridden via configuration.

use std::time::Duration;

// =============================================================================
// Upload Limits
// =============================================================================

/// Maximum accepted size of an uploaded file (10 MiB).
pub const MAX_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024;

/// Extra bytes allowed on top of the file cap for multipart framing and the
/// small text fields that travel alongside the file.
pub const MULTIPART_OVERHEAD_BYTES: u64 = 512;

/// Maximum length of an original filename (bytes).
/// The stored name adds a 13-digit timestamp and a separator on top of this.
pub const MAX_FILENAME_LEN: usize = 240;

/// Maximum length of a seed code (bytes).
pub const MAX_SEED_CODE_LEN: usize = 128;

// =============================================================================
// Lifecycle
// =============================================================================

/// How long a record lives after creation (24 hours).
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// Interval between expiry sweeps (24 hours).
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

// =============================================================================
// Rate Limiting
// =============================================================================

/// Requests admitted per client inside one window.
pub const DEFAULT_MAX_REQUESTS: u32 = 40;

/// Length of one rate-limit window.
pub const DEFAULT_RATE_WINDOW: Duration = Duration::from_secs(60);

/// Body returned with a 429 response.
pub const RATE_LIMITED_MESSAGE: &str = "Too many requests. Please try again later.";

// =============================================================================
// HTTP Surface
// =============================================================================

/// Default listen port.
pub const DEFAULT_PORT: u16 = 30601;

/// Default listen host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default origin allowed by CORS.
pub const DEFAULT_ALLOWED_ORIGIN: &str = "http://localhost:80";

/// Prefix of every client-facing route.
pub const API_PREFIX: &str = "/api";

/// Path prefix for download links handed back to clients.
pub const DOWNLOAD_PREFIX: &str = "/api/download/";

/// Default timeout for retrieval requests (seconds). Uploads are not timed.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

// =============================================================================
// Storage Defaults
// =============================================================================

/// Default upload directory, relative to the working directory.
pub const DEFAULT_UPLOAD_DIR: &str = "uploads";

/// Default SQLite database path, relative to the working directory.
pub const DEFAULT_DATABASE_URL: &str = "seedshare.db";

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "seedshare.toml";
