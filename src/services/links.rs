//! Public URL construction for stored content.

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};

use crate::constants::DOWNLOAD_PREFIX;

/// Characters escaped when a seed code is placed in a path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Host-relative download path for a seed code, e.g. `/api/download/abc123`.
pub fn download_path(seed_code: &str) -> String {
    format!("{DOWNLOAD_PREFIX}{}", utf8_percent_encode(seed_code, SEGMENT))
}

/// Absolute download link under `public_url`.
pub fn download_link(public_url: &str, seed_code: &str) -> String {
    format!("{}{}", public_url.trim_end_matches('/'), download_path(seed_code))
}
