//! In-memory record store.
//!
//! Non-persistent backend on top of DashMap. Used by tests and by
//! deployments that do not need records to survive a restart.

use super::backend::RecordStore;
use super::types::{ContentRecord, InsertOutcome};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

/// In-memory record store using DashMap.
///
/// All data is lost when the process exits.
#[derive(Default)]
pub struct MemoryRecordStore {
    records: DashMap<String, ContentRecord>,
}

impl MemoryRecordStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held, expired or not.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert(&self, record: &ContentRecord) -> Result<InsertOutcome> {
        // The entry API holds the shard lock across the check and the insert.
        match self.records.entry(record.seed_code.clone()) {
            Entry::Occupied(_) => Ok(InsertOutcome::Duplicate),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(InsertOutcome::Inserted)
            },
        }
    }

    async fn get(&self, seed_code: &str) -> Result<Option<ContentRecord>> {
        Ok(self.records.get(seed_code).map(|r| r.value().clone()))
    }

    async fn delete(&self, seed_code: &str) -> Result<bool> {
        Ok(self.records.remove(seed_code).is_some())
    }

    async fn expired(&self, now: DateTime<Utc>) -> Result<Vec<ContentRecord>> {
        let mut expired: Vec<ContentRecord> = self
            .records
            .iter()
            .filter(|r| r.value().is_expired_at(now))
            .map(|r| r.value().clone())
            .collect();
        expired.sort_by_key(|r| r.expire_at);
        Ok(expired)
    }
}
