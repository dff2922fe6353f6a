//! Route definitions for the `/quality` resource.

use axum::extract::DefaultBodyLimit;
use axum::routing::post;
use axum::Router;

use super::ENVELOPE_MARGIN;
use crate::handlers::quality;
use crate::state::AppState;

/// Routes mounted at `/quality`. All require the API key.
///
/// ```text
/// POST   /preflight   -> preflight
/// POST   /amazon      -> amazon
/// POST   /check       -> check
/// ```
pub fn router(max_json_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/preflight", post(quality::preflight))
        .route("/amazon", post(quality::amazon))
        .route("/check", post(quality::check))
        .layer(DefaultBodyLimit::max(max_json_bytes + ENVELOPE_MARGIN))
}
