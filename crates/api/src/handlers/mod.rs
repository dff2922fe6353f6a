//! Request handlers.
//!
//! Each submodule provides the async handler functions for one resource.
//! Handlers delegate to the repositories in `pressline_db` and map errors
//! via [`AppError`]. The helpers below are shared by the job and workflow
//! creation paths and by every download route.

use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE, ETAG};
use axum::http::{HeaderValue, StatusCode};
use axum::response::Response;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::Instrument;

use pressline_core::error::CoreError;
use pressline_core::ids::{from_hex, to_hex};
use pressline_core::kinds::ArtifactKind;
use pressline_core::types::DbId;
use pressline_db::models::artifact::{Artifact, CreateArtifact};
use pressline_db::models::job::Job;
use pressline_worker::sweeper::dispatch_target;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

pub mod artifacts;
pub mod jobs;
pub mod quality;
pub mod variants;
pub mod workflow;

// ---------------------------------------------------------------------------
// Ids
// ---------------------------------------------------------------------------

/// Parse a path id given as 32-char hex or hyphenated UUID.
///
/// Malformed ids are a 400, not axum's default path rejection.
pub fn parse_id(raw: &str) -> AppResult<DbId> {
    Ok(from_hex(raw)?)
}

pub fn job_not_found(id: DbId) -> AppError {
    AppError::Core(CoreError::NotFound { entity: "Job", id })
}

// ---------------------------------------------------------------------------
// Bodies
// ---------------------------------------------------------------------------

/// Decode a JSON request body. Malformed bodies are a 400 with serde's
/// message, not axum's default rejection.
pub fn json_body<T: DeserializeOwned>(body: &Bytes) -> AppResult<T> {
    serde_json::from_slice(body).map_err(|e| AppError::BadRequest(format!("Invalid request body: {e}")))
}

// ---------------------------------------------------------------------------
// Blob upload
// ---------------------------------------------------------------------------

/// Store `data` and describe the artifact row that should point at it.
///
/// The row is not inserted here: callers insert it inside their own
/// transaction and call [`discard_blob`] if that transaction fails.
pub async fn upload_blob(
    state: &AppState,
    data: Vec<u8>,
    kind: ArtifactKind,
    file_name: &str,
    metadata: serde_json::Value,
) -> AppResult<CreateArtifact> {
    let checksum_md5 = state.store.checksum(&data);
    let mime = kind.default_mime();
    let stored = state
        .store
        .upload(data, kind, Some(file_name), Some(mime))
        .await?;

    tracing::debug!(uri = %stored.uri, size = stored.size, "Blob uploaded");

    Ok(CreateArtifact {
        kind,
        storage: state.store.storage_kind(),
        storage_uri: stored.uri,
        file_name: stored.file_name,
        file_size: stored.size as i64,
        mime_type: Some(mime.to_string()),
        checksum_md5,
        metadata,
    })
}

/// Best-effort removal of a blob whose row never committed.
pub async fn discard_blob(state: &AppState, uri: &str) {
    if let Err(e) = state.store.delete(uri).await {
        tracing::warn!(uri = %uri, error = %e, "Failed to remove orphaned blob");
    }
}

// ---------------------------------------------------------------------------
// Enqueue
// ---------------------------------------------------------------------------

/// Enqueue `job` in the background once its row is committed.
///
/// A failure here leaves the job `pending`; the worker's stale-pending
/// sweeper picks it up later.
pub fn spawn_enqueue(state: &AppState, job: &Job) {
    let Some((queue, function_ref)) = job.kind().and_then(dispatch_target) else {
        tracing::warn!(job_id = %job.id, job_type = %job.job_type, "No queue for job type");
        return;
    };

    let adapter = Arc::clone(&state.queue);
    let job_id = job.id;
    let task = async move {
        let args = vec![json!(to_hex(job_id))];
        match adapter
            .enqueue(queue, function_ref, args, queue.default_timeout())
            .await
        {
            Ok(envelope) => {
                tracing::info!(job_id = %job_id, queue = %queue, envelope = %envelope, "Job enqueued")
            }
            Err(e) => tracing::error!(
                job_id = %job_id,
                queue = %queue,
                error = %e,
                "Enqueue failed, job left pending for the sweeper"
            ),
        }
    };
    tokio::spawn(task.instrument(tracing::Span::current()));
}

// ---------------------------------------------------------------------------
// Downloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Inline,
    Attachment,
}

/// Stream an artifact's blob with its content type, file name and checksum.
pub async fn artifact_response(
    state: &AppState,
    artifact: &Artifact,
    disposition: Disposition,
) -> AppResult<Response> {
    let data = state.store.download(&artifact.storage_uri).await?;

    let mime = artifact
        .mime_type
        .clone()
        .or_else(|| {
            ArtifactKind::parse(&artifact.artifact_type)
                .ok()
                .map(|kind| kind.default_mime().to_string())
        })
        .unwrap_or_else(|| "application/octet-stream".to_string());

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_LENGTH, data.len())
        .header(CONTENT_DISPOSITION, content_disposition(disposition, &artifact.file_name));
    if let Ok(value) = HeaderValue::from_str(&mime) {
        builder = builder.header(CONTENT_TYPE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", artifact.checksum_md5)) {
        builder = builder.header(ETAG, value);
    }

    builder
        .body(Body::from(data))
        .map_err(|e| AppError::InternalError(e.to_string()))
}

/// `inline; filename="..."`, dropping the file name when it cannot be
/// carried in a header.
fn content_disposition(disposition: Disposition, file_name: &str) -> HeaderValue {
    let kind = match disposition {
        Disposition::Inline => "inline",
        Disposition::Attachment => "attachment",
    };
    let escaped = file_name.replace(['"', '\\'], "_");
    HeaderValue::from_str(&format!("{kind}; filename=\"{escaped}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}
