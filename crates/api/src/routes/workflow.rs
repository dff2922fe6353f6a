//! Route definitions for the `/workflow` resource.

use axum::extract::DefaultBodyLimit;
use axum::routing::post;
use axum::Router;

use crate::handlers::workflow;
use crate::state::AppState;

/// Multipart boundaries and the options field on top of the bundle.
const FORM_MARGIN: usize = 1024 * 1024;

/// Routes mounted at `/workflow`.
///
/// ```text
/// POST   /run    -> run_workflow (API key, multipart)
/// ```
pub fn router(max_bundle_bytes: usize) -> Router<AppState> {
    Router::new().route(
        "/run",
        post(workflow::run_workflow).layer(DefaultBodyLimit::max(max_bundle_bytes + FORM_MARGIN)),
    )
}
