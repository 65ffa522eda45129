//! HTTP API handlers organized by surface.

pub mod content;
pub mod system;
pub mod upload;

pub(crate) use content::{download, file_name, view_file};
pub(crate) use system::{health, metrics_endpoint};
pub(crate) use upload::upload;
