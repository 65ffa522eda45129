//! Content store with pluggable backends.
//!
//! Maps seed codes to content records and sweeps expired ones. Backends:
//!
//! - **SqliteRecordStore**: persistent storage (default for the server)
//! - **MemoryRecordStore**: non-persistent storage (tests, throwaway runs)
//!
//! # Example
//!
//! ```ignore
//! use seedshare::services::store::ContentStore;
//!
//! let store = ContentStore::sqlite("seedshare.db")?;
//! store.create(&record).await?;
//! let record = store.fetch("abc123").await?;
//! ```

mod backend;
mod memory;
mod service;
mod sqlite;
mod types;


pub use backend::RecordStore;
pub use memory::MemoryRecordStore;
pub use service::ContentStore;
pub use sqlite::{IN_MEMORY_URL, SqliteRecordStore};
pub use types::{
    ContentKind, ContentRecord, InsertOutcome, Payload, SweepReport, UnknownKind,
};
