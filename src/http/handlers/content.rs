//! Retrieval handlers: file-name lookup, download and view.

use axum::{
    Json,
    body::Body,
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderMap, HeaderName, HeaderValue, Request, StatusCode, header},
    response::{IntoResponse, Response},
};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use tower_http::services::ServeFile;

use super::super::types::{FileNameRequest, FileNameResponse, ViewResponse};
use super::super::{AppError, SharedState};
use crate::error::{Error, Result};
use crate::metrics;
use crate::services::{Download, NameLookup, StoredFile, View};

const SEED_REQUIRED_MESSAGE: &str = "seed_code is required";

/// Client headers forwarded to the file server for ranges and revalidation.
const FORWARDED_HEADERS: [HeaderName; 4] = [
    header::RANGE,
    header::IF_RANGE,
    header::IF_MODIFIED_SINCE,
    header::IF_UNMODIFIED_SINCE,
];

/// RFC 5987 `attr-char`: everything else in `filename*` is percent-encoded.
const ATTR_CHAR: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'|')
    .remove(b'~');

/// POST /api/file-name - Text body or storage reference for a seed code.
pub(crate) async fn file_name(
    State(state): State<SharedState>,
    payload: std::result::Result<Json<FileNameRequest>, JsonRejection>,
) -> std::result::Result<Json<FileNameResponse>, AppError> {
    // An unreadable body is reported the same way as a missing seed code.
    let seed_code = payload
        .ok()
        .and_then(|Json(req)| req.seed_code)
        .filter(|seed| !seed.is_empty())
        .ok_or_else(|| Error::validation(SEED_REQUIRED_MESSAGE))?;

    let response = match state.resolver.lookup_name(&seed_code).await? {
        NameLookup::Text(text) => FileNameResponse::Text { text },
        NameLookup::File(file) => FileNameResponse::File { file },
    };
    metrics::record_retrieval("file-name");
    Ok(Json(response))
}

/// GET /api/download/{seed_code} - Download as an attachment.
pub(crate) async fn download(
    State(state): State<SharedState>,
    Path(seed_code): Path<String>,
    headers: HeaderMap,
) -> std::result::Result<Response, AppError> {
    let response = match state.resolver.download(&seed_code).await? {
        Download::Text { file_name, body } => (
            [
                (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    content_disposition("attachment", &file_name),
                ),
            ],
            body,
        )
            .into_response(),
        Download::File(file) => serve_file(file, "attachment", &headers).await?,
    };
    metrics::record_retrieval("download");
    Ok(response)
}

/// GET /api/view-file/{seed_code} - Inline text, streamed media, or metadata.
pub(crate) async fn view_file(
    State(state): State<SharedState>,
    Path(seed_code): Path<String>,
    headers: HeaderMap,
) -> std::result::Result<Response, AppError> {
    let response = match state.resolver.view(&seed_code).await? {
        View::Text { content, file_name } => Json(ViewResponse::Inline {
            file_content: content,
            file_name,
            file_type: "text".to_string(),
        })
        .into_response(),
        View::Stream(file) => serve_file(file, "inline", &headers).await?,
        View::Metadata {
            file_name,
            file_type,
            download_url,
        } => Json(ViewResponse::Metadata {
            file_name,
            file_type,
            download_url,
        })
        .into_response(),
    };
    metrics::record_retrieval("view");
    Ok(response)
}

/// Serve a stored file from disk without reading it into memory.
///
/// Single byte ranges (`206`/`416`) and conditional requests (`304`) are
/// answered from the client's headers; browsers rely on ranges to seek
/// video.
async fn serve_file(
    file: StoredFile,
    disposition: &str,
    headers: &HeaderMap,
) -> Result<Response> {
    let StoredFile {
        path,
        content_type,
        file_name,
        ..
    } = file;

    let mut request = Request::new(Body::empty());
    for name in FORWARDED_HEADERS {
        if let Some(value) = headers.get(&name) {
            request.headers_mut().insert(name, value.clone());
        }
    }

    let response = ServeFile::new(&path).try_call(request).await?;
    if response.status() == StatusCode::NOT_FOUND {
        return Err(Error::file_not_found());
    }

    let mut response = response.map(Body::new);
    let response_headers = response.headers_mut();
    response_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&content_type).map_err(Error::storage)?,
    );
    response_headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&content_disposition(disposition, &file_name))
            .map_err(Error::storage)?,
    );
    Ok(response)
}

/// Build a `Content-Disposition` value carrying `file_name`.
///
/// The quoted `filename` is an ASCII fallback with quotes, backslashes and
/// non-printable characters replaced by `_`. When that loses anything, the
/// exact name follows as `filename*` in UTF-8.
fn content_disposition(disposition: &str, file_name: &str) -> String {
    let fallback: String = file_name
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() || c == ' ') && c != '"' && c != '\\' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if fallback == file_name {
        format!("{disposition}; filename=\"{fallback}\"")
    } else {
        format!(
            "{disposition}; filename=\"{fallback}\"; filename*=UTF-8''{}",
            utf8_percent_encode(file_name, ATTR_CHAR)
        )
    }
}
