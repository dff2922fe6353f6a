//! Route definitions for the `/variants` resource.

use axum::extract::DefaultBodyLimit;
use axum::routing::post;
use axum::Router;

use super::ENVELOPE_MARGIN;
use crate::handlers::variants;
use crate::state::AppState;

/// Routes mounted at `/variants`. All require the API key.
///
/// ```text
/// POST   /grayscale      -> grayscale
/// POST   /format         -> format
/// POST   /bleed          -> bleed
/// POST   /kdp-validate   -> kdp_validate
/// ```
pub fn router(max_json_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/grayscale", post(variants::grayscale))
        .route("/format", post(variants::format))
        .route("/bleed", post(variants::bleed))
        .route("/kdp-validate", post(variants::kdp_validate))
        .layer(DefaultBodyLimit::max(max_json_bytes + ENVELOPE_MARGIN))
}
