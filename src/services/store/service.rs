//! High-level `ContentStore` wrapper over record backends.
//!
//! Maps backend outcomes onto the crate's error model and owns the expiry
//! sweep, which has to touch both records and their backing files.

use super::backend::RecordStore;
use super::memory::MemoryRecordStore;
use super::sqlite::SqliteRecordStore;
use super::types::{ContentRecord, InsertOutcome, SweepReport};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Durable mapping from seed code to content record.
///
/// # Thread Safety
///
/// `ContentStore` is `Clone` and can be shared across threads and tasks.
/// Concurrency guarantees come from the backend.
#[derive(Clone)]
pub struct ContentStore {
    backend: Arc<dyn RecordStore>,
}

impl ContentStore {
    /// Creates a store backed by SQLite at `database_url` (`:memory:` allowed).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn sqlite(database_url: &str) -> anyhow::Result<Self> {
        let backend = SqliteRecordStore::open(database_url)?;
        Ok(Self::custom(backend))
    }

    /// Creates a store backed by an in-memory map.
    pub fn memory() -> Self {
        Self::custom(MemoryRecordStore::new())
    }

    /// Creates a store with a custom backend.
    pub fn custom<B: RecordStore>(backend: B) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    /// Persists a new record.
    ///
    /// # Errors
    ///
    /// - [`Error::DuplicateKey`] if the seed code is taken (the existing
    ///   record is left untouched)
    /// - [`Error::Storage`] if the backend fails
    pub async fn create(&self, record: &ContentRecord) -> Result<()> {
        match self.backend.insert(record).await.map_err(Error::storage)? {
            InsertOutcome::Inserted => {
                debug!(
                    seed_code = %record.seed_code,
                    kind = %record.kind(),
                    expire_at = %record.expire_at,
                    "Record created"
                );
                Ok(())
            },
            InsertOutcome::Duplicate => Err(Error::duplicate(&record.seed_code)),
        }
    }

    /// Looks up a record by seed code.
    ///
    /// Expired records are returned until the sweep removes them.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if no record exists
    /// - [`Error::Storage`] if the backend fails
    pub async fn fetch(&self, seed_code: &str) -> Result<ContentRecord> {
        self.backend
            .get(seed_code)
            .await
            .map_err(Error::storage)?
            .ok_or_else(Error::seed_not_found)
    }

    /// Deletes every record expired as of now, together with its backing file.
    pub async fn sweep_expired(&self) -> SweepReport {
        self.sweep_expired_at(Utc::now()).await
    }

    /// Deletes every record with `expire_at` strictly before `now`.
    ///
    /// The backing file is removed before the record. A file that is already
    /// gone is logged and counted, and the record is still deleted. A record
    /// whose delete fails stays in place and is picked up again by the next
    /// sweep. No single failure aborts the sweep.
    pub async fn sweep_expired_at(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        let expired = match self.backend.expired(now).await {
            Ok(records) => records,
            Err(e) => {
                error!(error = %format!("{e:#}"), "Failed to list expired records");
                report.query_failed = true;
                return report;
            },
        };

        for record in expired {
            report.examined += 1;

            if let Some(path) = record.payload.file_path() {
                match tokio::fs::remove_file(path).await {
                    Ok(()) => {
                        report.files_removed += 1;
                        debug!(seed_code = %record.seed_code, path = %path.display(), "Removed expired file");
                    },
                    Err(e) if e.kind() == ErrorKind::NotFound => {
                        report.files_missing += 1;
                        warn!(seed_code = %record.seed_code, path = %path.display(), "Expired file already missing");
                    },
                    Err(e) => {
                        report.file_errors += 1;
                        warn!(
                            seed_code = %record.seed_code,
                            path = %path.display(),
                            error = %e,
                            "Failed to remove expired file"
                        );
                    },
                }
            }

            match self.backend.delete(&record.seed_code).await {
                Ok(_) => {
                    report.records_removed += 1;
                    info!(seed_code = %record.seed_code, "Deleted expired record");
                },
                Err(e) => {
                    report.record_errors += 1;
                    error!(
                        seed_code = %record.seed_code,
                        error = %format!("{e:#}"),
                        "Failed to delete expired record"
                    );
                },
            }
        }

        report
    }
}
