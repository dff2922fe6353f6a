//! Symmetric API key extractor for write routes.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use pressline_core::error::CoreError;

use crate::error::AppError;
use crate::state::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Proof that the request carried the configured API key.
///
/// Add it as a handler parameter on every route that writes:
///
/// ```ignore
/// async fn create(_key: RequireApiKey, State(state): State<AppState>) -> AppResult<()> {
///     Ok(())
/// }
/// ```
///
/// When `API_KEY_ENABLED` is false the extractor always succeeds.
#[derive(Debug, Clone, Copy)]
pub struct RequireApiKey;

impl FromRequestParts<AppState> for RequireApiKey {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if !state.config.api_key_enabled {
            return Ok(RequireApiKey);
        }

        let expected = state.config.api_key.as_deref().unwrap_or_default();
        let presented = parts
            .headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                AppError::Core(CoreError::Unauthorized("Missing X-API-Key header".into()))
            })?;

        if expected.is_empty() || !keys_match(presented.as_bytes(), expected.as_bytes()) {
            return Err(AppError::Core(CoreError::Unauthorized(
                "Invalid or missing API key".into(),
            )));
        }

        Ok(RequireApiKey)
    }
}

/// Compare without short-circuiting on the first differing byte.
fn keys_match(presented: &[u8], expected: &[u8]) -> bool {
    if presented.len() != expected.len() {
        return false;
    }
    presented
        .iter()
        .zip(expected)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
