use std::future::Future;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Liveness payload.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
}

/// One dependency probe.
#[derive(Debug, Serialize)]
pub struct CheckResult {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Checks {
    pub database: CheckResult,
    pub queue: CheckResult,
    pub store: CheckResult,
}

#[derive(Debug, Serialize)]
pub struct DetailedHealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub checks: Checks,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

async fn probe<F, E>(check: F) -> CheckResult
where
    F: Future<Output = Result<(), E>>,
    E: std::fmt::Display,
{
    let started = Instant::now();
    match check.await {
        Ok(()) => CheckResult {
            status: "ok",
            latency_ms: Some((started.elapsed().as_secs_f64() * 1000.0 * 100.0).round() / 100.0),
            error: None,
        },
        Err(e) => CheckResult {
            status: "error",
            latency_ms: None,
            error: Some(e.to_string()),
        },
    }
}

/// `ok` when every probe passed, `error` when the database is down,
/// `degraded` otherwise.
fn overall_status(checks: &Checks) -> &'static str {
    let failed = |c: &CheckResult| c.status != "ok";
    if failed(&checks.database) {
        "error"
    } else if failed(&checks.queue) || failed(&checks.store) {
        "degraded"
    } else {
        "ok"
    }
}

/// GET /health -- process liveness only.
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// GET /health/detailed -- probes the database, the queue broker and the
/// artifact store. 200 when all pass, 503 otherwise.
async fn detailed_health_check(State(state): State<AppState>) -> impl IntoResponse {
    let (database, queue, store) = tokio::join!(
        probe(pressline_db::health_check(&state.pool)),
        probe(state.queue.ping()),
        probe(state.store.ping()),
    );
    let checks = Checks {
        database,
        queue,
        store,
    };
    let status = overall_status(&checks);
    if status != "ok" {
        tracing::warn!(status, ?checks, "Dependency health check failed");
    }

    let code = if status == "ok" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        code,
        Json(DetailedHealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION"),
            checks,
            timestamp: chrono::Utc::now(),
        }),
    )
}

/// Mount health check routes (root level, NOT under `/v1`).
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/detailed", get(detailed_health_check))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok() -> CheckResult {
        CheckResult {
            status: "ok",
            latency_ms: Some(1.0),
            error: None,
        }
    }

    fn down() -> CheckResult {
        CheckResult {
            status: "error",
            latency_ms: None,
            error: Some("connection refused".into()),
        }
    }

    #[test]
    fn database_outage_is_an_error() {
        let checks = Checks {
            database: down(),
            queue: ok(),
            store: ok(),
        };
        assert_eq!(overall_status(&checks), "error");
    }

    #[test]
    fn other_outages_degrade() {
        let checks = Checks {
            database: ok(),
            queue: ok(),
            store: down(),
        };
        assert_eq!(overall_status(&checks), "degraded");
        let checks = Checks {
            database: ok(),
            queue: ok(),
            store: ok(),
        };
        assert_eq!(overall_status(&checks), "ok");
    }
}
