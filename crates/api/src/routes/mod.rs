pub mod artifacts;
pub mod health;
pub mod jobs;
pub mod quality;
pub mod variants;
pub mod workflow;

use axum::Router;

use crate::config::ServerConfig;
use crate::state::AppState;

/// Room for the request envelope around a posted descriptor.
pub(crate) const ENVELOPE_MARGIN: usize = 64 * 1024;

/// Build the `/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /jobs                                 create (POST, API key)
/// /jobs/{id}                            job with input/output artifacts
/// /jobs/{id}/logs                       log tail (?limit=)
/// /jobs/{id}/pages                      per-page artifact references
/// /jobs/{id}/preview/{page}             rendered page preview (PNG)
/// /jobs/{id}/artifact/pdf               final PDF
///
/// /workflow/run                         create workflow job (POST multipart, API key)
///
/// /quality/{preflight,amazon,check}     synchronous checks (POST, API key)
/// /variants/{grayscale,format,bleed}    inline descriptor transforms (POST, API key)
/// /variants/kdp-validate                page-bounds check (POST, API key)
///
/// /artifacts/{id}                       artifact download
/// ```
pub fn api_routes(config: &ServerConfig) -> Router<AppState> {
    Router::new()
        .nest("/jobs", jobs::router(config.max_json_bytes))
        .nest("/workflow", workflow::router(config.max_workflow_bundle_bytes))
        .nest("/quality", quality::router(config.max_json_bytes))
        .nest("/variants", variants::router(config.max_json_bytes))
        .nest("/artifacts", artifacts::router())
}
