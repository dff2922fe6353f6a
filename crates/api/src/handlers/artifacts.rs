//! Handler for the `/artifacts` resource.

use axum::extract::{Path, State};
use axum::response::Response;

use pressline_core::error::CoreError;
use pressline_db::repositories::ArtifactRepo;

use super::{artifact_response, parse_id, Disposition};
use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// GET /v1/artifacts/{id}
///
/// Download any artifact by id as an attachment.
pub async fn get_artifact(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let artifact_id = parse_id(&id)?;
    let artifact = ArtifactRepo::find_by_id(&state.pool, artifact_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Artifact",
            id: artifact_id,
        }))?;

    tracing::debug!(artifact_id = %artifact.id, kind = %artifact.artifact_type, "Serving artifact");
    artifact_response(&state, &artifact, Disposition::Attachment).await
}
