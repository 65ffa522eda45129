//! Configuration for the seedshare server.
//!
//! Settings come from three layers, later ones winning:
//!
//! 1. `seedshare.toml` (current directory, then the user config directory)
//! 2. Environment: `DATABASE_URL`, `SEEDSHARE_UPLOAD_DIR`, `HOST`, `PORT`
//! 3. Command-line flags
//!
//! Every field has a default, so an empty or missing file is a valid
//! configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants;
use crate::logging::{LogConfig, LogFormat};
use crate::reliability::RateLimitConfig;
use crate::services::IngestConfig;

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Non-fatal warnings that should be logged but don't prevent operation.
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if there are any warnings.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// seedshare.toml configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Base URL used in download links. Defaults to `http://localhost:<port>`.
    #[serde(default)]
    pub public_url: Option<String>,
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: None,
            allowed_origins: default_allowed_origins(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Record store and upload directory settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// SQLite database path, or `:memory:`.
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    /// Per-file cap in bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            upload_dir: default_upload_dir(),
            max_file_size: default_max_file_size(),
            retention_hours: default_retention_hours(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

/// Per-client throttle settings for the `/api` routes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitSettings {
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
    /// One of `trace`, `debug`, `info`, `warn`, `error`.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    constants::DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    constants::DEFAULT_PORT
}

fn default_allowed_origins() -> Vec<String> {
    vec![constants::DEFAULT_ALLOWED_ORIGIN.to_string()]
}

fn default_request_timeout_secs() -> u64 {
    constants::DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_database_url() -> String {
    constants::DEFAULT_DATABASE_URL.to_string()
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from(constants::DEFAULT_UPLOAD_DIR)
}

fn default_max_file_size() -> u64 {
    constants::MAX_FILE_SIZE_BYTES
}

fn default_retention_hours() -> u64 {
    constants::DEFAULT_RETENTION.as_secs() / 3600
}

fn default_sweep_interval_secs() -> u64 {
    constants::DEFAULT_SWEEP_INTERVAL.as_secs()
}

fn default_max_requests() -> u32 {
    constants::DEFAULT_MAX_REQUESTS
}

fn default_window_secs() -> u64 {
    constants::DEFAULT_RATE_WINDOW.as_secs()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration.
    ///
    /// With an explicit `path` the file must exist. Without one,
    /// `seedshare.toml` is looked up in the current directory and then in the
    /// user config directory; if neither exists, defaults are used.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from(path);
        }
        match Self::discover() {
            Some(found) => Self::load_from(found),
            None => Ok(Self::default()),
        }
    }

    /// Default config file locations that exist, in lookup order.
    fn discover() -> Option<PathBuf> {
        let local = PathBuf::from(constants::DEFAULT_CONFIG_FILE);
        let user = dirs::config_dir()
            .map(|dir| dir.join("seedshare").join(constants::DEFAULT_CONFIG_FILE));
        std::iter::once(local)
            .chain(user)
            .find(|candidate| candidate.is_file())
    }

    /// Load configuration from the specified path.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read (IO error)
    /// - The file contains invalid TOML syntax
    /// - Fields are unknown or have invalid types
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Apply overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if `PORT` is set but not a valid port number.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides read through `lookup`. Empty values are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if `PORT` is set but not a valid port number.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("DATABASE_URL") {
            self.storage.database_url = url;
        }
        if let Some(dir) = get("SEEDSHARE_UPLOAD_DIR") {
            self.storage.upload_dir = PathBuf::from(dir);
        }
        if let Some(host) = get("HOST") {
            self.server.host = host;
        }
        if let Some(port) = get("PORT") {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid PORT value: {port}"))?;
        }
        Ok(())
    }

    /// Base URL for download links, without a trailing slash.
    pub fn public_url(&self) -> String {
        self.server
            .public_url
            .as_deref()
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| format!("http://localhost:{}", self.server.port))
    }

    /// `host:port` to bind.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Request body cap: file cap plus multipart framing slack.
    pub const fn body_limit(&self) -> u64 {
        self.storage
            .max_file_size
            .saturating_add(constants::MULTIPART_OVERHEAD_BYTES)
    }

    /// Rate limiter settings.
    pub const fn rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig {
            max_requests: self.rate_limit.max_requests,
            window: Duration::from_secs(self.rate_limit.window_secs),
        }
    }

    /// Ingestion pipeline settings.
    pub fn ingest(&self) -> IngestConfig {
        IngestConfig {
            upload_dir: self.storage.upload_dir.clone(),
            max_file_size: self.storage.max_file_size,
            retention: self.retention(),
        }
    }

    /// How long records live.
    pub const fn retention(&self) -> Duration {
        Duration::from_secs(self.storage.retention_hours.saturating_mul(3600))
    }

    /// Period of the expiry sweep.
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.storage.sweep_interval_secs)
    }

    /// Timeout for retrieval requests. Uploads are not timed.
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Logging settings. Falls back to `info` for an unknown level.
    pub fn log_config(&self) -> LogConfig {
        let level = self
            .logging
            .level
            .parse()
            .unwrap_or(tracing::Level::INFO);
        LogConfig::default().format(self.logging.format).level(level)
    }

    /// Validate configuration with comprehensive checks.
    ///
    /// Returns a `ValidationResult` containing any non-fatal warnings.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails with one or more errors:
    /// - Port 0
    /// - Zero file size cap, retention, sweep interval or rate limits
    /// - Empty database URL or upload directory
    /// - Unknown log level
    pub fn validate(&self) -> Result<ValidationResult> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        // 1. Server
        if self.server.port == 0 {
            errors.push(
                "Server port cannot be 0. Use a valid port number (1-65535)\n  \
                 Default: 30601"
                    .to_string(),
            );
        }
        if self.server.port > 0 && self.server.port < 1024 {
            warnings.push(format!(
                "Server port {} is a system/privileged port (< 1024)\n  \
                 Recommendation: Use ports >= 1024 to avoid permission issues",
                self.server.port
            ));
        }
        if self.server.host.trim().is_empty() {
            errors.push("server.host cannot be empty".to_string());
        }
        if self.server.request_timeout_secs == 0 {
            errors.push("server.request_timeout_secs must be at least 1".to_string());
        }
        if self.server.allowed_origins.is_empty() {
            warnings.push(
                "server.allowed_origins is empty\n  \
                 Browsers on other origins will not be able to call the API"
                    .to_string(),
            );
        }
        for origin in &self.server.allowed_origins {
            if origin != "*" && !origin.starts_with("http://") && !origin.starts_with("https://") {
                errors.push(format!(
                    "Invalid allowed origin '{origin}'. Expected '*' or an http(s) origin"
                ));
            }
        }
        if let Some(url) = &self.server.public_url
            && !url.starts_with("http://")
            && !url.starts_with("https://")
        {
            errors.push(format!(
                "server.public_url must start with http:// or https:// (got: '{url}')"
            ));
        }

        // 2. Storage
        if self.storage.database_url.trim().is_empty() {
            errors.push("storage.database_url cannot be empty".to_string());
        }
        if self.storage.upload_dir.as_os_str().is_empty() {
            errors.push("storage.upload_dir cannot be empty".to_string());
        }
        if self.storage.max_file_size == 0 {
            errors.push("storage.max_file_size must be at least 1 byte".to_string());
        }
        if self.storage.max_file_size > 1024 * 1024 * 1024 {
            warnings.push(format!(
                "storage.max_file_size {} is very large (> 1 GiB)\n  \
                 Uploads are single requests and cannot be resumed",
                self.storage.max_file_size
            ));
        }
        if self.storage.retention_hours == 0 {
            errors.push("storage.retention_hours must be at least 1".to_string());
        }
        if self.storage.sweep_interval_secs == 0 {
            errors.push("storage.sweep_interval_secs must be at least 1".to_string());
        }
        if self.storage.sweep_interval_secs > self.storage.retention_hours.saturating_mul(3600)
            && self.storage.retention_hours > 0
        {
            warnings.push(format!(
                "storage.sweep_interval_secs ({}) exceeds the retention period\n  \
                 Expired content may stay retrievable for up to one extra interval",
                self.storage.sweep_interval_secs
            ));
        }

        // 3. Rate limiting
        if self.rate_limit.max_requests == 0 {
            errors.push("rate_limit.max_requests must be at least 1".to_string());
        }
        if self.rate_limit.window_secs == 0 {
            errors.push("rate_limit.window_secs must be at least 1".to_string());
        }

        // 4. Logging
        if self.logging.level.parse::<tracing::Level>().is_err() {
            errors.push(format!(
                "Invalid log level '{}'. Valid levels: trace, debug, info, warn, error",
                self.logging.level
            ));
        }

        if !errors.is_empty() {
            anyhow::bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }

        Ok(ValidationResult { warnings })
    }
}
