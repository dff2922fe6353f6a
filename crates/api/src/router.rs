//! The application router, shared by `main.rs` and the integration tests so
//! both run behind identical middleware.

use std::time::Duration;

use axum::http::header::{CONTENT_TYPE, RETRY_AFTER};
use axum::http::{HeaderName, Method, StatusCode};
use axum::middleware::from_fn_with_state;
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::config::ServerConfig;
use crate::middleware::api_key::API_KEY_HEADER;
use crate::middleware::correlation::correlation_middleware;
use crate::middleware::rate_limit::rate_limit_middleware;
use crate::routes;
use crate::state::AppState;

const REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// `/health*` at the root, everything else under `/v1`.
///
/// Each middleware is its own `Router::layer` call, innermost first. A
/// request passes CORS, request id, tracing, timeout, panic recovery,
/// correlation and finally the rate limiter. Correlation wraps the limiter
/// so 429 responses still carry the id.
pub fn build_app_router(state: AppState, config: &ServerConfig) -> Router {
    Router::new()
        .merge(routes::health::router())
        .nest("/v1", routes::api_routes(config))
        .layer(from_fn_with_state(state.clone(), rate_limit_middleware))
        .layer(from_fn_with_state(state.clone(), correlation_middleware))
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.request_timeout_secs),
        ))
        .layer(PropagateRequestIdLayer::new(REQUEST_ID))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::new(REQUEST_ID, MakeRequestUuid))
        .layer(build_cors_layer(config))
        .with_state(state)
}

/// CORS for the configured origins. Clients may send the API key and the
/// correlation header, and may read back the ids and `Retry-After`.
///
/// Invalid origins panic: the service should not start half-configured.
pub fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins: Vec<_> = config
        .cors_origins
        .iter()
        .map(|o| o.parse().unwrap_or_else(|e| panic!("Invalid CORS origin '{o}': {e}")))
        .collect();
    let correlation = correlation_header(config);

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE, HeaderName::from_static(API_KEY_HEADER), correlation.clone()])
        .expose_headers([correlation, REQUEST_ID, RETRY_AFTER])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600))
}

/// `ServerConfig::validate` has already checked the name.
fn correlation_header(config: &ServerConfig) -> HeaderName {
    HeaderName::try_from(config.correlation_header.as_str())
        .unwrap_or_else(|e| panic!("Invalid correlation header '{}': {e}", config.correlation_header))
}
