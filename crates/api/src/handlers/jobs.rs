//! Handlers for the `/jobs` resource.
//!
//! Creation is guarded by [`RequireApiKey`]; reads are open.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use validator::Validate;

use pressline_core::ids::{new_id, to_hex};
use pressline_core::kinds::ArtifactKind;
use pressline_core::layout::validate_descriptor;
use pressline_db::models::job::{CreateJob, JobWithArtifacts};
use pressline_db::models::page::Page;
use pressline_db::models::status::JobKind;
use pressline_db::repositories::job_log_repo::DEFAULT_LOG_LIMIT;
use pressline_db::repositories::{ArtifactRepo, JobLogRepo, JobRepo, PageRepo};
use pressline_events::BusEvent;
use pressline_worker::jobs::JOBS_CHANNEL;

use super::{
    artifact_response, discard_blob, job_not_found, json_body, parse_id, spawn_enqueue,
    upload_blob, Disposition,
};
use crate::error::{AppError, AppResult};
use crate::middleware::api_key::RequireApiKey;
use crate::middleware::correlation::CorrelationId;
use crate::state::AppState;

/// Largest log tail a client may ask for.
const MAX_LOG_LIMIT: i64 = 1000;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Body of `POST /v1/jobs`.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateJobRequest {
    pub layout_json: Value,
    #[serde(default)]
    #[validate(range(min = 0, max = 1000))]
    pub priority: i32,
    #[serde(default)]
    pub metadata: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct PageResponse {
    #[serde(flatten)]
    pub page: Page,
    /// Route serving the page preview, once one is rendered.
    pub preview_url: Option<String>,
}

impl PageResponse {
    fn new(page: Page) -> Self {
        let preview_url = page
            .png_artifact_id
            .map(|_| format!("/v1/jobs/{}/preview/{}", page.job_id, page.page_number));
        Self { page, preview_url }
    }
}

/// Job metadata: the correlation id plus whatever the client sent.
fn job_metadata(correlation_id: &str, client: Option<Value>) -> AppResult<Value> {
    let mut metadata = match client {
        None | Some(Value::Null) => serde_json::Map::new(),
        Some(Value::Object(map)) => map,
        Some(_) => return Err(AppError::BadRequest("metadata must be a JSON object".into())),
    };
    metadata.insert("correlation_id".into(), json!(correlation_id));
    Ok(Value::Object(metadata))
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

/// POST /v1/jobs
///
/// Validate a layout descriptor, store it, and create a pending compile
/// job. The enqueue happens after the transaction commits. Returns 201
/// with the job and its input artifact.
pub async fn create_job(
    _key: RequireApiKey,
    correlation: CorrelationId,
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<(StatusCode, Json<JobWithArtifacts>)> {
    let request: CreateJobRequest = json_body(&body)?;
    request
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let layout = request.layout_json;
    let encoded = serde_json::to_vec(&layout).map_err(|e| AppError::InternalError(e.to_string()))?;
    state.config.layout_limits().check(&layout, encoded.len())?;

    let errors = validate_descriptor(&layout);
    if !errors.is_empty() {
        tracing::info!(errors = errors.len(), "Layout descriptor rejected");
        return Err(AppError::SchemaInvalid {
            message: "Layout JSON failed schema validation".into(),
            validation_errors: errors.iter().map(ToString::to_string).collect(),
        });
    }

    let metadata = job_metadata(correlation.as_str(), request.metadata)?;
    let file_name = format!("layout_{}.json", to_hex(new_id()));
    let input = upload_blob(
        &state,
        encoded,
        ArtifactKind::LayoutJson,
        &file_name,
        json!({ "correlation_id": correlation.as_str() }),
    )
    .await?;

    let persisted = async {
        let mut tx = state.pool.begin().await?;
        let artifact = ArtifactRepo::create(&mut *tx, &input).await?;
        let job = JobRepo::create(
            &mut *tx,
            &CreateJob {
                kind: JobKind::Compile,
                priority: request.priority,
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

    tracing::info!(job_id = %job.id, priority = job.priority, "Compile job created");

    spawn_enqueue(&state, &job);
    state.bus.publish(
        BusEvent::new(JOBS_CHANNEL, "job.created")
            .with_data(json!({
                "job_id": job.id,
                "job_type": job.job_type,
                "status": job.status,
                "input_artifact_id": artifact.id,
            }))
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

// ---------------------------------------------------------------------------
// Read
// ---------------------------------------------------------------------------

/// GET /v1/jobs/{id}
///
/// Completed and failed jobs are served from the response cache when it
/// holds them.
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let job_id = parse_id(&id)?;
    if let Some(cached) = state.cache.get(job_id).await {
        tracing::debug!(job_id = %job_id, "Job served from cache");
        return Ok(Json(cached));
    }

    let found = JobRepo::find_with_artifacts(&state.pool, job_id)
        .await?
        .ok_or_else(|| job_not_found(job_id))?;
    let body = serde_json::to_value(&found).map_err(|e| AppError::InternalError(e.to_string()))?;
    state.cache.put(job_id, found.job.status(), &body).await;

    Ok(Json(body))
}

/// GET /v1/jobs/{id}/logs?limit=
///
/// Oldest first; at most `limit` entries from the tail.
pub async fn job_logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<LogsQuery>,
) -> AppResult<Json<Value>> {
    let job_id = parse_id(&id)?;
    let limit = params.limit.unwrap_or(DEFAULT_LOG_LIMIT).clamp(1, MAX_LOG_LIMIT);

    JobRepo::find_by_id(&state.pool, job_id)
        .await?
        .ok_or_else(|| job_not_found(job_id))?;
    let logs = JobLogRepo::list_for_job(&state.pool, job_id, limit).await?;

    Ok(Json(json!({ "job_id": job_id, "logs": logs })))
}

/// GET /v1/jobs/{id}/pages
pub async fn job_pages(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let job_id = parse_id(&id)?;
    JobRepo::find_by_id(&state.pool, job_id)
        .await?
        .ok_or_else(|| job_not_found(job_id))?;

    let pages: Vec<PageResponse> = PageRepo::list_for_job(&state.pool, job_id)
        .await?
        .into_iter()
        .map(PageResponse::new)
        .collect();

    Ok(Json(json!({ "job_id": job_id, "pages": pages })))
}

/// GET /v1/jobs/{id}/preview/{page}
pub async fn job_preview(
    State(state): State<AppState>,
    Path((id, page_number)): Path<(String, i32)>,
) -> AppResult<Response> {
    let job_id = parse_id(&id)?;
    let page = PageRepo::find_by_number(&state.pool, job_id, page_number)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Page {page_number} of job {job_id} not found")))?;
    let artifact_id = page
        .png_artifact_id
        .ok_or_else(|| AppError::NotFound(format!("Page {page_number} has no preview yet")))?;
    let artifact = ArtifactRepo::find_by_id(&state.pool, artifact_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Preview artifact {artifact_id} not found")))?;

    artifact_response(&state, &artifact, Disposition::Inline).await
}

/// GET /v1/jobs/{id}/artifact/pdf
pub async fn job_pdf(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let job_id = parse_id(&id)?;
    JobRepo::find_by_id(&state.pool, job_id)
        .await?
        .ok_or_else(|| job_not_found(job_id))?;
    let artifact = ArtifactRepo::find_pdf_for_job(&state.pool, job_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No PDF for job {job_id}")))?;

    artifact_response(&state, &artifact, Disposition::Inline).await
}
