//! Route definitions for the `/jobs` resource.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;

use super::ENVELOPE_MARGIN;
use crate::handlers::jobs;
use crate::state::AppState;

/// Routes mounted at `/jobs`.
///
/// ```text
/// POST   /                      -> create_job (API key)
/// GET    /{id}                  -> get_job
/// GET    /{id}/logs             -> job_logs
/// GET    /{id}/pages            -> job_pages
/// GET    /{id}/preview/{page}   -> job_preview
/// GET    /{id}/artifact/pdf     -> job_pdf
/// ```
///
/// `max_json_bytes` bounds the descriptor; larger bodies are cut off
/// before they are buffered.
pub fn router(max_json_bytes: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/",
            post(jobs::create_job).layer(DefaultBodyLimit::max(max_json_bytes + ENVELOPE_MARGIN)),
        )
        .route("/{id}", get(jobs::get_job))
        .route("/{id}/logs", get(jobs::job_logs))
        .route("/{id}/pages", get(jobs::job_pages))
        .route("/{id}/preview/{page}", get(jobs::job_preview))
        .route("/{id}/artifact/pdf", get(jobs::job_pdf))
}
