//! Record types for the content store.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a record's payload is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    /// Inline text stored directly in the record.
    Text,
    /// Reference to a file in the upload directory.
    File,
}

impl ContentKind {
    /// Persisted name of the kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::File => "file",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownKind(pub String);

impl fmt::Display for UnknownKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown content kind: {:?}", self.0)
    }
}

impl std::error::Error for UnknownKind {}

impl FromStr for ContentKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "file" => Ok(Self::File),
            other => Err(UnknownKind(other.to_string())),
        }
    }
}

/// The stored content of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Inline text. Never written to the upload directory.
    Text(String),
    /// Path of the stored file, as handed out by the ingestion pipeline.
    File(PathBuf),
}

impl Payload {
    /// Kind tag matching this payload.
    pub const fn kind(&self) -> ContentKind {
        match self {
            Self::Text(_) => ContentKind::Text,
            Self::File(_) => ContentKind::File,
        }
    }

    /// The value persisted in the record store's content column.
    pub fn to_column(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::File(path) => path.to_string_lossy().into_owned(),
        }
    }

    /// Rebuild a payload from its persisted kind and content column.
    pub fn from_column(kind: ContentKind, content: String) -> Self {
        match kind {
            ContentKind::Text => Self::Text(content),
            ContentKind::File => Self::File(PathBuf::from(content)),
        }
    }

    /// Path of the backing file, if any.
    pub fn file_path(&self) -> Option<&Path> {
        match self {
            Self::Text(_) => None,
            Self::File(path) => Some(path),
        }
    }
}

/// One shared item: inline text or a stored file, plus expiry and metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentRecord {
    /// Client-chosen unique key.
    pub seed_code: String,
    /// Text body or file reference.
    pub payload: Payload,
    /// Opaque client metadata, passed through unchanged.
    pub metadata: serde_json::Value,
    /// When the record becomes eligible for the sweep. Write-once.
    pub expire_at: DateTime<Utc>,
}

impl ContentRecord {
    /// Create a record.
    pub fn new(
        seed_code: impl Into<String>,
        payload: Payload,
        metadata: serde_json::Value,
        expire_at: DateTime<Utc>,
    ) -> Self {
        Self {
            seed_code: seed_code.into(),
            payload,
            metadata,
            expire_at,
        }
    }

    /// Kind of the payload.
    pub const fn kind(&self) -> ContentKind {
        self.payload.kind()
    }

    /// Whether the record is past its expiry at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expire_at < now
    }
}

/// Result of an insert-if-absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The record was stored.
    Inserted,
    /// A record with the same seed code already exists; nothing was written.
    Duplicate,
}

/// Summary of one expiry sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Expired records found.
    pub examined: usize,
    /// Records deleted from the store.
    pub records_removed: usize,
    /// Backing files deleted.
    pub files_removed: usize,
    /// Backing files that were already gone.
    pub files_missing: usize,
    /// Backing files that could not be deleted.
    pub file_errors: usize,
    /// Records that could not be deleted (retried next sweep).
    pub record_errors: usize,
    /// Whether the expired-record query itself failed.
    pub query_failed: bool,
}

impl SweepReport {
    /// True if nothing went wrong during the sweep.
    pub const fn is_clean(&self) -> bool {
        !self.query_failed && self.file_errors == 0 && self.record_errors == 0
    }
}
