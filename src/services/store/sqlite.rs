//! SQLite-backed record store.
//!
//! Provides persistent storage of content records using rusqlite. The seed
//! code is the table's primary key, so duplicate detection is enforced by the
//! database itself.

use super::backend::RecordStore;
use super::types::{ContentKind, ContentRecord, InsertOutcome, Payload};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::warn;

/// Special database URL selecting a private in-memory database.
pub const IN_MEMORY_URL: &str = ":memory:";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS files (
    seed_code   TEXT PRIMARY KEY,
    content     TEXT NOT NULL,
    type        TEXT NOT NULL DEFAULT 'file',
    metadata    TEXT NOT NULL DEFAULT '{}',
    expire_time INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_files_expire_time ON files (expire_time);
";

/// Columns in the order every `SELECT` reads them.
const COLUMNS: &str = "seed_code, content, type, metadata, expire_time";

/// Raw row as read from SQLite, before decoding.
struct RawRow {
    seed_code: String,
    content: String,
    kind: String,
    metadata: String,
    expire_time: i64,
}

impl RawRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            seed_code: row.get(0)?,
            content: row.get(1)?,
            kind: row.get(2)?,
            metadata: row.get(3)?,
            expire_time: row.get(4)?,
        })
    }

    fn decode(self) -> Result<ContentRecord> {
        let kind: ContentKind = self
            .kind
            .parse()
            .with_context(|| format!("Invalid type column for '{}'", self.seed_code))?;
        let metadata = serde_json::from_str(&self.metadata)
            .with_context(|| format!("Invalid metadata column for '{}'", self.seed_code))?;
        let expire_at = DateTime::<Utc>::from_timestamp_millis(self.expire_time)
            .with_context(|| format!("Invalid expire_time column for '{}'", self.seed_code))?;

        Ok(ContentRecord {
            seed_code: self.seed_code,
            payload: Payload::from_column(kind, self.content),
            metadata,
            expire_at,
        })
    }
}

/// SQLite-backed record store.
///
/// # Thread Safety
///
/// `SqliteRecordStore` is `Clone` and can be shared across threads. The
/// underlying connection is protected by a Mutex and every call runs on the
/// blocking thread pool.
#[derive(Clone)]
pub struct SqliteRecordStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRecordStore {
    /// Opens or creates the database named by `database_url`.
    ///
    /// `:memory:` opens a private in-memory database. Anything else is a file
    /// path; parent directories are created as needed. The schema is created
    /// if missing.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Parent directory cannot be created
    /// - Database file cannot be opened (permissions, corruption, etc.)
    /// - Schema creation fails
    pub fn open(database_url: &str) -> Result<Self> {
        let conn = if database_url == IN_MEMORY_URL {
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?
        } else {
            let path = Path::new(database_url);
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create database directory: {}", parent.display())
                })?;
            }
            Connection::open(path)
                .with_context(|| format!("Failed to open SQLite database: {}", path.display()))?
        };

        conn.busy_timeout(std::time::Duration::from_secs(5))
            .context("Failed to set busy timeout")?;
        conn.execute_batch(SCHEMA)
            .context("Failed to create files table")?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Failed to acquire database lock: {e}"))
    }

    fn insert_sync(&self, record: &ContentRecord) -> Result<InsertOutcome> {
        let conn = self.lock()?;
        let metadata =
            serde_json::to_string(&record.metadata).context("Failed to encode metadata")?;

        // The primary key makes this a single atomic check-and-insert.
        let affected = conn
            .execute(
                "INSERT INTO files (seed_code, content, type, metadata, expire_time)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (seed_code) DO NOTHING",
                params![
                    record.seed_code,
                    record.payload.to_column(),
                    record.kind().as_str(),
                    metadata,
                    record.expire_at.timestamp_millis(),
                ],
            )
            .with_context(|| format!("Failed to insert record '{}'", record.seed_code))?;

        Ok(if affected == 0 {
            InsertOutcome::Duplicate
        } else {
            InsertOutcome::Inserted
        })
    }

    fn get_sync(&self, seed_code: &str) -> Result<Option<ContentRecord>> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM files WHERE seed_code = ?1"),
                params![seed_code],
                RawRow::read,
            )
            .optional()
            .with_context(|| format!("Failed to read record '{seed_code}'"))?;

        raw.map(RawRow::decode).transpose()
    }

    fn delete_sync(&self, seed_code: &str) -> Result<bool> {
        let conn = self.lock()?;
        let affected = conn
            .execute("DELETE FROM files WHERE seed_code = ?1", params![seed_code])
            .with_context(|| format!("Failed to delete record '{seed_code}'"))?;
        Ok(affected > 0)
    }

    fn expired_sync(&self, now: DateTime<Utc>) -> Result<Vec<ContentRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {COLUMNS} FROM files WHERE expire_time < ?1 ORDER BY expire_time"
            ))
            .context("Failed to prepare expired-record query")?;

        let rows = stmt
            .query_map(params![now.timestamp_millis()], RawRow::read)
            .context("Failed to query expired records")?;

        let mut records = Vec::new();
        let mut unreadable = Vec::new();
        for row in rows {
            let raw = match row {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable expired row");
                    continue;
                },
            };
            let seed_code = raw.seed_code.clone();
            match raw.decode() {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(
                        seed_code = %seed_code,
                        error = %format!("{e:#}"),
                        "Purging unreadable expired record"
                    );
                    unreadable.push(seed_code);
                },
            }
        }

        // Undecodable rows never reach the sweep, so they are dropped here.
        for seed_code in &unreadable {
            if let Err(e) =
                conn.execute("DELETE FROM files WHERE seed_code = ?1", params![seed_code])
            {
                warn!(seed_code = %seed_code, error = %e, "Failed to purge unreadable record");
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn insert(&self, record: &ContentRecord) -> Result<InsertOutcome> {
        let backend = self.clone();
        let record = record.clone();
        tokio::task::spawn_blocking(move || backend.insert_sync(&record))
            .await
            .context("Task join error")?
    }

    async fn get(&self, seed_code: &str) -> Result<Option<ContentRecord>> {
        let backend = self.clone();
        let seed_code = seed_code.to_string();
        tokio::task::spawn_blocking(move || backend.get_sync(&seed_code))
            .await
            .context("Task join error")?
    }

    async fn delete(&self, seed_code: &str) -> Result<bool> {
        let backend = self.clone();
        let seed_code = seed_code.to_string();
        tokio::task::spawn_blocking(move || backend.delete_sync(&seed_code))
            .await
            .context("Task join error")?
    }

    async fn expired(&self, now: DateTime<Utc>) -> Result<Vec<ContentRecord>> {
        let backend = self.clone();
        tokio::task::spawn_blocking(move || backend.expired_sync(now))
            .await
            .context("Task join error")?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_parent_directories() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("dir").join("store.db");

        SqliteRecordStore::open(path.to_str().unwrap()).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_reopen_keeps_records() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("store.db");
        let url = path.to_str().unwrap();

        let record = ContentRecord::new(
            "persisted",
            Payload::Text("still here".into()),
            serde_json::json!({"a": 1}),
            Utc::now(),
        );
        {
            let store = SqliteRecordStore::open(url).unwrap();
            assert_eq!(store.insert_sync(&record).unwrap(), InsertOutcome::Inserted);
        }

        let store = SqliteRecordStore::open(url).unwrap();
        let found = store.get_sync("persisted").unwrap().unwrap();
        assert_eq!(found.payload, Payload::Text("still here".into()));
        assert_eq!(found.metadata, serde_json::json!({"a": 1}));
    }

    #[test]
    fn test_unreadable_expired_rows_are_purged() {
        let store = SqliteRecordStore::open(IN_MEMORY_URL).unwrap();
        {
            let conn = store.lock().unwrap();
            conn.execute(
                "INSERT INTO files (seed_code, content, type, metadata, expire_time)
                 VALUES ('bad', 'x', 'folder', '{}', 0), ('good', 'y', 'text', '{}', 0)",
                [],
            )
            .unwrap();
        }

        let expired = store.expired_sync(Utc::now()).unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].seed_code, "good");
        assert!(store.get_sync("bad").unwrap().is_none());

        let again = store.expired_sync(Utc::now()).unwrap();
        assert_eq!(again.len(), 1);
    }

    #[test]
    fn test_unreadable_live_rows_are_left_alone() {
        let store = SqliteRecordStore::open(IN_MEMORY_URL).unwrap();
        let future = (Utc::now() + chrono::Duration::hours(1)).timestamp_millis();
        {
            let conn = store.lock().unwrap();
            conn.execute(
                "INSERT INTO files (seed_code, content, type, metadata, expire_time)
                 VALUES ('odd', 'x', 'text', 'not json', ?1)",
                params![future],
            )
            .unwrap();
        }

        assert!(store.expired_sync(Utc::now()).unwrap().is_empty());
        let count: i64 = store
            .lock()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
