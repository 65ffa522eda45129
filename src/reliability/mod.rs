//! Request admission and input hardening.
//!
//! - [`RateLimiter`] - per-client fixed-window throttle for the `/api` routes
//! - [`sanitize_upload_name`] - reduces client filenames to a safe component

pub mod rate_limit;
pub mod security;

pub use rate_limit::{Admission, RateLimitConfig, RateLimiter};
pub use security::{FilenameError, sanitize_upload_name};
