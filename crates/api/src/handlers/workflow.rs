//! Handler for `POST /v1/workflow/run`.
//!
//! Accepts a multipart form with a required `bundle` file (a zip holding
//! `manifest.json` and the extracted decks) and an optional `options_json`
//! text field with workflow overrides. The bundle is size-checked while it
//! streams in and inspected before anything is written.

use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Map, Value};

use pressline_core::ids::{new_id, to_hex};
use pressline_core::kinds::ArtifactKind;
use pressline_db::models::job::{CreateJob, JobWithArtifacts};
use pressline_db::models::status::JobKind;
use pressline_db::repositories::{ArtifactRepo, JobRepo};
use pressline_events::BusEvent;
use pressline_worker::bundle::inspect_bundle;
use pressline_worker::jobs::workflow::WorkflowOptions;

use super::{discard_blob, spawn_enqueue, upload_blob};
use crate::error::{AppError, AppResult};
use crate::middleware::api_key::RequireApiKey;
use crate::middleware::correlation::CorrelationId;
use crate::state::AppState;

pub const WORKFLOW_CHANNEL: &str = "workflow";

const MAX_PRIORITY: i64 = 1000;

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(err.body_text())
    } else {
        AppError::BadRequest(err.body_text())
    }
}

/// Split `options_json` into the job priority and the remaining workflow
/// overrides, rejecting anything that does not parse as overrides.
fn parse_options(raw: Option<&str>) -> AppResult<(i32, Map<String, Value>, WorkflowOptions)> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty()).unwrap_or("{}");
    let mut options = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(_) => return Err(AppError::BadRequest("options_json must be a JSON object".into())),
        Err(e) => return Err(AppError::BadRequest(format!("options_json is not valid JSON: {e}"))),
    };

    let priority = match options.remove("priority") {
        None | Some(Value::Null) => 0,
        Some(value) => match value.as_i64() {
            Some(p) if (0..=MAX_PRIORITY).contains(&p) => p as i32,
            _ => {
                return Err(AppError::BadRequest(format!(
                    "priority must be an integer between 0 and {MAX_PRIORITY}"
                )))
            }
        },
    };

    let parsed = WorkflowOptions::from_metadata(&json!({ "options": options }))
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    Ok((priority, options, parsed))
}

/// Stored name for an uploaded bundle: a single safe path segment, unique
/// per upload, always ending in `.zip`.
fn stored_bundle_name(original: Option<&str>) -> String {
    let base = original
        .and_then(|name| name.rsplit(['/', '\\']).next())
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or("bundle.zip");
    let mut safe: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    if !safe.to_ascii_lowercase().ends_with(".zip") {
        safe.push_str(".zip");
    }
    format!("bundle_{}_{safe}", to_hex(new_id()))
}

/// POST /v1/workflow/run
///
/// Returns 201 with the pending workflow job and its bundle artifact.
pub async fn run_workflow(
    _key: RequireApiKey,
    correlation: CorrelationId,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<JobWithArtifacts>)> {
    let max_bytes = state.config.max_workflow_bundle_bytes;
    let mut bundle: Option<(Option<String>, Vec<u8>)> = None;
    let mut options_raw: Option<String> = None;

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "bundle" => {
                let file_name = field.file_name().map(str::to_string);
                let mut data = Vec::new();
                while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
                    if data.len() + chunk.len() > max_bytes {
                        tracing::warn!(max_bytes, "Workflow bundle rejected: too large");
                        return Err(AppError::PayloadTooLarge(format!(
                            "Workflow bundle exceeds {} MB",
                            max_bytes / (1024 * 1024)
                        )));
                    }
                    data.extend_from_slice(&chunk);
                }
                bundle = Some((file_name, data));
            }
            "options_json" => {
                options_raw = Some(field.text().await.map_err(multipart_error)?);
            }
            _ => {}
        }
    }

    let (original_name, data) =
        bundle.ok_or_else(|| AppError::BadRequest("Missing required 'bundle' field".into()))?;
    if data.is_empty() {
        return Err(AppError::BadRequest("Workflow bundle is empty".into()));
    }
    let (priority, options, parsed) = parse_options(options_raw.as_deref())?;
    let summary = inspect_bundle(&data)
        .map_err(|e| AppError::BadRequest(format!("Invalid workflow bundle: {e}")))?;
    parsed
        .check(summary.has_gamma_dir)
        .map_err(|e| AppError::BadRequest(format!("Invalid workflow options: {e}")))?;
    tracing::debug!(
        manifest = %summary.manifest,
        gamma = summary.has_gamma_dir,
        size = data.len(),
        "Workflow bundle accepted"
    );

    let file_name = stored_bundle_name(original_name.as_deref());
    let input = upload_blob(
        &state,
        data,
        ArtifactKind::WorkflowBundle,
        &file_name,
        json!({
            "correlation_id": correlation.as_str(),
            "original_file_name": original_name,
        }),
    )
    .await?;

    let metadata = json!({
        "correlation_id": correlation.as_str(),
        "options": options,
    });
    let persisted = async {
        let mut tx = state.pool.begin().await?;
        let artifact = ArtifactRepo::create(&mut *tx, &input).await?;
        let job = JobRepo::create(
            &mut *tx,
            &CreateJob {
                kind: JobKind::Workflow,
                priority,
                input_artifact_id: Some(artifact.id),
                metadata,
            },
        )
        .await?;
        tx.commit().await?;
        Ok::<_, sqlx::Error>((job, artifact))
    }
    .await;
    let (job, artifact) = match persisted {
        Ok(rows) => rows,
        Err(e) => {
            discard_blob(&state, &input.storage_uri).await;
            return Err(e.into());
        }
    };

    tracing::info!(job_id = %job.id, priority, "Workflow job created");

    spawn_enqueue(&state, &job);
    state.bus.publish(
        BusEvent::new(WORKFLOW_CHANNEL, "workflow.job.created")
            .with_data(json!({ "job_id": job.id, "status": job.status }))
            .with_correlation_id(Some(correlation.as_str())),
    );

    Ok((
        StatusCode::CREATED,
        Json(JobWithArtifacts {
            job,
            input_artifact: Some(artifact),
            output_artifact: None,
        }),
    ))
}
