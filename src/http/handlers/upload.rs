//! Upload handler.
//!
//! Reads the multipart form field by field. The `file` part is streamed
//! straight into the ingestor's staging file, so an oversized upload is cut
//! off as soon as it crosses the cap and nothing is buffered in memory.

use std::convert::Infallible;

use axum::{
    Json,
    extract::{
        FromRequestParts, State,
        multipart::{Field, Multipart, MultipartError, MultipartRejection},
    },
    http::{StatusCode, request::Parts},
};
use futures::TryStreamExt;
use tracing::debug;

use super::super::audit::{AuditEvent, log_audit_event};
use super::super::types::UploadResponse;
use super::super::{AppError, SharedState, client_key};
use crate::error::{Error, Result};
use crate::metrics;
use crate::services::ingest::FILE_TOO_LARGE_MESSAGE;
use crate::services::links::download_link;
use crate::services::Submission;

const UPLOAD_SUCCESS_MESSAGE: &str = "File uploaded successfully";

/// Source IP of the caller, `"unknown"` without connection info.
pub(crate) struct ClientAddr(pub String);

impl<S> FromRequestParts<S> for ClientAddr
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        Ok(Self(client_key(&parts.extensions)))
    }
}

/// POST /api/upload - Store text or a file under a seed code.
pub(crate) async fn upload(
    State(state): State<SharedState>,
    ClientAddr(client): ClientAddr,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> std::result::Result<(StatusCode, Json<UploadResponse>), AppError> {
    let outcome = match multipart {
        Ok(multipart) => accept(&state, &client, multipart).await,
        Err(rejection) => Err(Error::validation(format!(
            "Invalid multipart body: {}",
            rejection.body_text()
        ))),
    };

    match outcome {
        Ok(response) => Ok((StatusCode::CREATED, Json(response))),
        Err(err) => {
            metrics::record_upload_rejection(rejection_reason(&err));
            if matches!(err, Error::DuplicateKey { .. }) {
                log_audit_event(AuditEvent::DuplicateSeed { client });
            }
            Err(err.into())
        },
    }
}

async fn accept(
    state: &SharedState,
    client: &str,
    mut multipart: Multipart,
) -> Result<UploadResponse> {
    let limit = state.ingestor.config().max_file_size;
    let mut submission = Submission::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(client, limit, &e))?
    {
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };
        match name.as_str() {
            "file" => {
                let raw_name = field.file_name().unwrap_or_default().to_owned();
                if raw_name.is_empty() {
                    continue;
                }
                let chunks = field.map_err(|e| multipart_error(client, limit, &e));
                submission.file = Some(state.ingestor.stage_file(&raw_name, chunks).await?);
            },
            "seed_code" => submission.seed_code = Some(read_text(field, client, limit).await?),
            "upload_type" => submission.upload_type = Some(read_text(field, client, limit).await?),
            "text_message" => {
                submission.text_message = Some(read_text(field, client, limit).await?);
            },
            "metadata" => submission.metadata = Some(read_text(field, client, limit).await?),
            other => debug!(field = %other, "Ignoring unknown multipart field"),
        }
    }

    let size = submission.file.as_ref().map(|f| f.size());
    let receipt = state.ingestor.submit(submission).await?;
    metrics::record_upload(receipt.kind.as_str(), size);

    Ok(UploadResponse {
        message: UPLOAD_SUCCESS_MESSAGE.to_string(),
        download_link: download_link(&state.public_url, &receipt.seed_code),
        seed_code: receipt.seed_code,
    })
}

async fn read_text(field: Field<'_>, client: &str, limit: u64) -> Result<String> {
    field
        .text()
        .await
        .map_err(|e| multipart_error(client, limit, &e))
}

/// Map a multipart read failure to a client error.
///
/// Hitting the request body cap surfaces here as `413`; it is reported the
/// same way as a file that crosses the cap while staging.
fn multipart_error(client: &str, limit: u64, err: &MultipartError) -> Error {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        log_audit_event(AuditEvent::OversizedUpload {
            client: client.to_string(),
            limit,
        });
        Error::validation(FILE_TOO_LARGE_MESSAGE)
    } else {
        Error::validation(format!("Invalid multipart body: {}", err.body_text()))
    }
}

fn rejection_reason(err: &Error) -> &'static str {
    match err {
        Error::Validation(message) if message == FILE_TOO_LARGE_MESSAGE => "too_large",
        Error::Validation(_) => "invalid",
        Error::DuplicateKey { .. } => "duplicate",
        _ => "storage",
    }
}
