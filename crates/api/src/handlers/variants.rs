//! Handlers for the `/variants` resource: single-descriptor transforms
//! returned inline, plus the KDP bounds check. Events go to the `variants`
//! channel.

use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use validator::Validate;

use pressline_core::layout::validate_descriptor;
use pressline_core::preflight::check_page_bounds;
use pressline_core::project_config::{DEFAULT_BLEED_MM, SUPPORTED_FORMATS};
use pressline_events::BusEvent;
use pressline_pipeline::steps::variants::{apply_bleed, convert_format, to_grayscale};

use super::json_body;
use super::quality::{LayoutRequest, ValidityResponse};
use crate::error::{AppError, AppResult};
use crate::middleware::api_key::RequireApiKey;
use crate::middleware::correlation::CorrelationId;
use crate::state::AppState;

pub const VARIANTS_CHANNEL: &str = "variants";

/// Schema errors returned alongside a transformed descriptor.
const MAX_SCHEMA_ERRORS: usize = 50;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct FormatRequest {
    pub layout_json: Value,
    /// `A4` or `8x11.5`.
    pub target_format: String,
}

fn default_bleed_mm() -> f64 {
    DEFAULT_BLEED_MM
}

#[derive(Debug, Deserialize, Validate)]
pub struct BleedRequest {
    pub layout_json: Value,
    #[serde(default = "default_bleed_mm")]
    #[validate(range(min = 0.0, max = 20.0))]
    pub bleed_mm: f64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct KdpValidateRequest {
    pub layout_json: Value,
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub safety_margin_px: f64,
}

/// A transformed descriptor and how it fares against the schema.
#[derive(Debug, Serialize)]
pub struct VariantResponse {
    pub layout_json: Value,
    pub schema_valid: bool,
    pub schema_errors: Vec<String>,
}

impl VariantResponse {
    fn new(layout_json: Value) -> Self {
        let errors = validate_descriptor(&layout_json);
        Self {
            schema_valid: errors.is_empty(),
            schema_errors: errors.iter().take(MAX_SCHEMA_ERRORS).map(ToString::to_string).collect(),
            layout_json,
        }
    }
}

fn publish(state: &AppState, correlation: &CorrelationId, event_type: &str, data: Value) {
    state.bus.publish(
        BusEvent::new(VARIANTS_CHANNEL, event_type)
            .with_data(data)
            .with_correlation_id(Some(correlation.as_str())),
    );
}

fn check_size(state: &AppState, layout: &Value, body: &Bytes) -> AppResult<()> {
    state.config.layout_limits().check(layout, body.len())?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /v1/variants/grayscale
pub async fn grayscale(
    _key: RequireApiKey,
    correlation: CorrelationId,
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<Json<VariantResponse>> {
    let request: LayoutRequest = json_body(&body)?;
    check_size(&state, &request.layout_json, &body)?;

    let response = VariantResponse::new(to_grayscale(&request.layout_json));
    publish(
        &state,
        &correlation,
        "variants.grayscale.created",
        json!({ "schema_valid": response.schema_valid }),
    );
    Ok(Json(response))
}

/// POST /v1/variants/format
pub async fn format(
    _key: RequireApiKey,
    correlation: CorrelationId,
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<Json<VariantResponse>> {
    let request: FormatRequest = json_body(&body)?;
    check_size(&state, &request.layout_json, &body)?;

    let converted = convert_format(&request.layout_json, &request.target_format).map_err(|e| {
        AppError::BadRequest(format!("{e} (expected one of {})", SUPPORTED_FORMATS.join(", ")))
    })?;
    let response = VariantResponse::new(converted);
    publish(
        &state,
        &correlation,
        "variants.format.created",
        json!({ "target_format": request.target_format, "schema_valid": response.schema_valid }),
    );
    Ok(Json(response))
}

/// POST /v1/variants/bleed
pub async fn bleed(
    _key: RequireApiKey,
    correlation: CorrelationId,
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<Json<VariantResponse>> {
    let request: BleedRequest = json_body(&body)?;
    request.validate().map_err(|e| AppError::BadRequest(e.to_string()))?;
    check_size(&state, &request.layout_json, &body)?;

    let response = VariantResponse::new(apply_bleed(&request.layout_json, request.bleed_mm));
    publish(
        &state,
        &correlation,
        "variants.bleed.applied",
        json!({ "bleed_mm": request.bleed_mm, "schema_valid": response.schema_valid }),
    );
    Ok(Json(response))
}

/// POST /v1/variants/kdp-validate
pub async fn kdp_validate(
    _key: RequireApiKey,
    correlation: CorrelationId,
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<Json<ValidityResponse>> {
    let request: KdpValidateRequest = json_body(&body)?;
    request.validate().map_err(|e| AppError::BadRequest(e.to_string()))?;
    check_size(&state, &request.layout_json, &body)?;

    let outcome = check_page_bounds(&request.layout_json, request.safety_margin_px);
    let response = ValidityResponse::from(outcome);
    publish(&state, &correlation, "variants.kdp.validated", json!({ "valid": response.valid }));
    Ok(Json(response))
}
