// =============================================================================
// Lint Configuration
// =============================================================================

#![deny(unsafe_code)]
#![deny(unused_must_use)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(rust_2018_idioms)]
#![allow(clippy::missing_errors_doc)] // Error returns self-documenting via type
#![allow(clippy::module_name_repetitions)] // e.g., store::ContentStore is clearer
#![allow(clippy::doc_markdown)] // Too many false positives in code docs
#![allow(clippy::must_use_candidate)] // Not all returned values need annotation
#![allow(clippy::redundant_pub_crate)] // Explicit pub(crate) documents intent

//! seedshare - ephemeral content sharing keyed by seed codes.
//!
//! A client uploads a text snippet or a file under a seed code it chooses;
//! anyone holding the seed code can look it up, download it or view it until
//! the record expires and the reaper removes it.
//!
//! # Layout
//!
//! - [`services`] - record store, ingestion, retrieval and the expiry reaper
//! - [`reliability`] - per-client rate limiting and filename sanitization
//! - [`http`] - axum router, handlers and error mapping
//! - [`config`] - TOML configuration with environment overrides
//! - [`server`] - wiring for `seedshare serve` and `seedshare sweep`

pub mod background;
pub mod config;
pub mod constants;
pub mod error;
pub mod http;
pub mod logging;
pub mod metrics;
pub mod reliability;
pub mod server;
pub mod services;

pub use error::{Error, Result};
