//! Backend trait for the record store.
//!
//! The content store needs only four operations from its persistence layer:
//! insert-if-absent, point lookup, delete, and "select all expired".
//! Implementing [`RecordStore`] is enough to plug in another database.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::types::{ContentRecord, InsertOutcome};

/// Persistence backend for content records.
///
/// All backends must be thread-safe (`Send + Sync`) for use with tokio.
///
/// # Example
///
/// ```ignore
/// use seedshare::services::store::{MemoryRecordStore, RecordStore};
///
/// let backend = MemoryRecordStore::new();
/// backend.insert(&record).await?;
/// let found = backend.get("abc123").await?;
/// ```
#[async_trait]
pub trait RecordStore: Send + Sync + 'static {
    /// Stores a record unless one with the same seed code exists.
    ///
    /// Must be atomic with respect to concurrent inserts of the same seed
    /// code: exactly one caller observes [`InsertOutcome::Inserted`].
    /// An existing record is never overwritten.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    async fn insert(&self, record: &ContentRecord) -> Result<InsertOutcome>;

    /// Retrieves a record by seed code.
    ///
    /// Expired records that have not been swept yet are still returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    async fn get(&self, seed_code: &str) -> Result<Option<ContentRecord>>;

    /// Deletes a record.
    ///
    /// Returns `Ok(true)` if the record existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    async fn delete(&self, seed_code: &str) -> Result<bool>;

    /// Lists every record whose `expire_at` is strictly before `now`.
    ///
    /// Expired rows that cannot be decoded are logged and purged instead of
    /// failing the whole listing.
    ///
    /// # Errors
    ///
    /// Returns an error if the query itself fails.
    async fn expired(&self, now: DateTime<Utc>) -> Result<Vec<ContentRecord>>;
}
