//! Correlation ids.
//!
//! Every request gets one: taken from the configured header when the client
//! sent it, generated otherwise. The id is echoed on the response, recorded
//! on the request span and available to handlers through [`CorrelationId`].

use axum::body::Body;
use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use tracing::Instrument;

use crate::state::AppState;

/// Longest client-supplied id accepted as is.
const MAX_CORRELATION_ID_LEN: usize = 128;

/// The request's correlation id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<S: Send + Sync> FromRequestParts<S> for CorrelationId {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<CorrelationId>()
            .cloned()
            .unwrap_or_else(|| CorrelationId(uuid::Uuid::new_v4().to_string())))
    }
}

/// Client value when usable, a fresh UUID otherwise.
pub fn resolve(header: Option<&HeaderValue>) -> String {
    header
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty() && v.len() <= MAX_CORRELATION_ID_LEN)
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

pub async fn correlation_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let header = HeaderName::try_from(state.config.correlation_header.as_str())
        .unwrap_or_else(|_| HeaderName::from_static("x-correlation-id"));
    let id = resolve(req.headers().get(&header));
    req.extensions_mut().insert(CorrelationId(id.clone()));

    let span = tracing::info_span!("correlated", correlation_id = %id);
    let mut response = next.run(req).instrument(span).await;

    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(header, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_value_is_kept() {
        let value = HeaderValue::from_static("abc-123");
        assert_eq!(resolve(Some(&value)), "abc-123");
    }

    #[test]
    fn missing_or_blank_value_is_generated() {
        assert_eq!(resolve(None).len(), 36);
        let blank = HeaderValue::from_static("   ");
        assert_eq!(resolve(Some(&blank)).len(), 36);
    }

    #[test]
    fn oversized_value_is_replaced() {
        let long = "x".repeat(MAX_CORRELATION_ID_LEN + 1);
        let value = HeaderValue::from_str(&long).unwrap();
        assert_ne!(resolve(Some(&value)), long);
    }
}
