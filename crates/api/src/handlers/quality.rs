//! Handlers for the `/quality` resource.
//!
//! Synchronous checks over a posted layout descriptor. Nothing is stored;
//! every call publishes one event on the `quality` channel.

use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use pressline_core::preflight::{check_page_bounds, run_preflight, CheckOutcome, PREFLIGHT_CHECKS};
use pressline_core::project_config::ProjectConfig;
use pressline_core::quality_gate::{run_gate, GateSummary};
use pressline_events::BusEvent;

use super::json_body;
use crate::error::{AppError, AppResult};
use crate::middleware::api_key::RequireApiKey;
use crate::middleware::correlation::CorrelationId;
use crate::state::AppState;

pub const QUALITY_CHANNEL: &str = "quality";

/// Errors returned per check.
const MAX_ERRORS: usize = 100;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct LayoutRequest {
    pub layout_json: Value,
}

/// Body of `POST /v1/quality/preflight` and `/check`.
#[derive(Debug, Deserialize)]
pub struct PreflightRequest {
    pub layout_json: Value,
    /// Subset of the semantic check groups; empty runs them all.
    #[serde(default)]
    pub checks: Vec<String>,
    /// Project configuration for the gate. Only read by `/check`.
    #[serde(default)]
    pub project_init: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct ValidityResponse {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl From<CheckOutcome> for ValidityResponse {
    fn from(outcome: CheckOutcome) -> Self {
        Self {
            valid: outcome.is_valid(),
            errors: outcome.errors.into_iter().take(MAX_ERRORS).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct QualityCheckResponse {
    pub preflight_valid: bool,
    pub preflight_errors: Vec<String>,
    pub amazon_valid: bool,
    pub amazon_errors: Vec<String>,
    pub gate: GateSummary,
}

fn selected_checks(requested: &[String]) -> AppResult<Vec<&str>> {
    requested
        .iter()
        .map(|name| {
            PREFLIGHT_CHECKS
                .iter()
                .copied()
                .find(|known| *known == name.as_str())
                .ok_or_else(|| {
                    AppError::BadRequest(format!(
                        "Unknown check '{name}' (expected one of {})",
                        PREFLIGHT_CHECKS.join(", ")
                    ))
                })
        })
        .collect()
}

fn project_config(raw: Option<Value>) -> AppResult<ProjectConfig> {
    match raw {
        None | Some(Value::Null) => Ok(ProjectConfig::default()),
        Some(raw @ Value::Object(_)) => Ok(ProjectConfig::new(raw)),
        Some(_) => Err(AppError::BadRequest("project_init must be a JSON object".into())),
    }
}

/// Body limits apply to synchronous checks exactly as they do to jobs.
fn checked_layout(state: &AppState, layout: &Value, body: &Bytes) -> AppResult<()> {
    state.config.layout_limits().check(layout, body.len())?;
    Ok(())
}

fn publish(state: &AppState, correlation: &CorrelationId, event_type: &str, data: Value) {
    state.bus.publish(
        BusEvent::new(QUALITY_CHANNEL, event_type)
            .with_data(data)
            .with_correlation_id(Some(correlation.as_str())),
    );
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /v1/quality/preflight
pub async fn preflight(
    _key: RequireApiKey,
    correlation: CorrelationId,
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<Json<ValidityResponse>> {
    let request: PreflightRequest = json_body(&body)?;
    checked_layout(&state, &request.layout_json, &body)?;
    let checks = selected_checks(&request.checks)?;

    let response = ValidityResponse::from(run_preflight(&request.layout_json, &checks));
    publish(&state, &correlation, "quality.preflight.checked", json!({ "valid": response.valid }));
    Ok(Json(response))
}

/// POST /v1/quality/amazon
///
/// Every object must lie inside the page.
pub async fn amazon(
    _key: RequireApiKey,
    correlation: CorrelationId,
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<Json<ValidityResponse>> {
    let request: LayoutRequest = json_body(&body)?;
    checked_layout(&state, &request.layout_json, &body)?;

    let response = ValidityResponse::from(check_page_bounds(&request.layout_json, 0.0));
    publish(&state, &correlation, "quality.amazon.checked", json!({ "valid": response.valid }));
    Ok(Json(response))
}

/// POST /v1/quality/check
///
/// Preflight, the page-bounds check and the policy gate in one call.
pub async fn check(
    _key: RequireApiKey,
    correlation: CorrelationId,
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<Json<QualityCheckResponse>> {
    let request: PreflightRequest = json_body(&body)?;
    checked_layout(&state, &request.layout_json, &body)?;
    let checks = selected_checks(&request.checks)?;
    let project = project_config(request.project_init)?;
    let doc = &request.layout_json;

    let preflight = ValidityResponse::from(run_preflight(doc, &checks));
    let amazon = ValidityResponse::from(check_page_bounds(doc, 0.0));
    let gate = run_gate(doc, &project);
    tracing::debug!(
        preflight = preflight.valid,
        amazon = amazon.valid,
        gate = gate.passed,
        "Quality check finished"
    );

    publish(
        &state,
        &correlation,
        "quality.check.completed",
        json!({
            "preflight_valid": preflight.valid,
            "amazon_valid": amazon.valid,
            "gate_passed": gate.passed,
        }),
    );
    Ok(Json(QualityCheckResponse {
        preflight_valid: preflight.valid,
        preflight_errors: preflight.errors,
        amazon_valid: amazon.valid,
        amazon_errors: amazon.errors,
        gate,
    }))
}
