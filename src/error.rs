//! Error types for the content lifecycle.
//!
//! Every operation in the ingestion and retrieval paths returns [`Error`],
//! which carries enough structure for the HTTP layer to pick a status code
//! without inspecting message strings.

/// Result type for content operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Content lifecycle errors.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Missing or malformed input, including oversized uploads.
    #[error("{0}")]
    Validation(String),

    /// Another record already owns this seed code.
    #[error("Seed code already exists")]
    DuplicateKey { seed_code: String },

    /// No record for this seed code, or its backing file is gone.
    #[error("{what} Not Found")]
    NotFound { what: &'static str },

    /// Filesystem or record store failure.
    #[error("storage error: {0:#}")]
    Storage(anyhow::Error),

    /// The client exhausted its request budget.
    #[error("rate limit exceeded for {client}")]
    RateLimited { client: String },
}

impl Error {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a duplicate key error.
    pub fn duplicate(seed_code: impl Into<String>) -> Self {
        Self::DuplicateKey {
            seed_code: seed_code.into(),
        }
    }

    /// The seed code has no record.
    pub const fn seed_not_found() -> Self {
        Self::NotFound { what: "Seed Code" }
    }

    /// The record exists but its backing file does not.
    pub const fn file_not_found() -> Self {
        Self::NotFound { what: "File" }
    }

    /// Wrap an infrastructure failure.
    pub fn storage(err: impl Into<anyhow::Error>) -> Self {
        Self::Storage(err.into())
    }

    /// Create a rate limit error.
    pub fn rate_limited(client: impl Into<String>) -> Self {
        Self::RateLimited {
            client: client.into(),
        }
    }

    /// Get the appropriate HTTP status code for this error.
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::DuplicateKey { .. } => 400,
            Self::NotFound { .. } => 404,
            Self::RateLimited { .. } => 429,
            Self::Storage(_) => 500,
        }
    }

    /// Whether this error is a client mistake rather than a system fault.
    pub const fn is_client_error(&self) -> bool {
        !matches!(self, Self::Storage(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.into())
    }
}
