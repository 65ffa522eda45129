//! Request and response bodies for the HTTP API.

use serde::{Deserialize, Serialize};

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Response for a successful upload.
#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub message: String,
    pub seed_code: String,
    pub download_link: String,
}

/// Request body for `POST /api/file-name`.
#[derive(Debug, Deserialize)]
pub struct FileNameRequest {
    #[serde(default)]
    pub seed_code: Option<String>,
}

/// Response for `POST /api/file-name`: exactly one of the two keys.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum FileNameResponse {
    /// Inline text of a text record.
    Text { text: String },
    /// Storage reference of a file record.
    File { file: String },
}

/// JSON shapes returned by `GET /api/view-file/{seed_code}`.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ViewResponse {
    /// Text content shown inline.
    #[serde(rename_all = "camelCase")]
    Inline {
        file_content: String,
        file_name: String,
        file_type: String,
    },
    /// Files that are not shown inline.
    #[serde(rename_all = "camelCase")]
    Metadata {
        file_name: String,
        file_type: String,
        download_url: String,
    },
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}
