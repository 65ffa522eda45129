//! Content lifecycle services.
//!
//! - [`store`] - seed code to record mapping, expiry sweep
//! - [`ingest`] - upload validation and file placement
//! - [`resolve`] - response shaping for lookups, downloads and views
//! - [`reaper`] - periodic expiry sweep

pub mod ingest;
pub mod links;
pub mod reaper;
pub mod resolve;
pub mod store;

pub use ingest::{IngestConfig, Ingestor, StagedFile, Submission, UploadReceipt};
pub use reaper::ExpiryReaper;
pub use resolve::{Download, NameLookup, Resolver, StoredFile, View, ViewBucket};
pub use store::{ContentKind, ContentRecord, ContentStore, Payload, SweepReport};
