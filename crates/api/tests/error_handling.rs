//! Tests for `AppError` → HTTP response mapping.
//!
//! These call `IntoResponse` directly on `AppError` values; no server or
//! database is involved.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use http_body_util::BodyExt;
use pressline_api::error::AppError;
use pressline_core::error::CoreError;
use pressline_core::types::DbId;
use pressline_queue::QueueError;
use pressline_storage::StorageError;

/// Convert an `AppError` into its status code, headers and parsed JSON body.
async fn error_to_response(err: AppError) -> (StatusCode, axum::http::HeaderMap, serde_json::Value) {
    let response = err.into_response();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    (status, headers, json)
}

#[tokio::test]
async fn not_found_names_the_entity() {
    let id = DbId::new_v4();
    let err = AppError::Core(CoreError::NotFound { entity: "Job", id });

    let (status, _, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
    assert_eq!(json["detail"], format!("Job {id} not found"));
}

#[tokio::test]
async fn sub_resource_not_found_keeps_its_message() {
    let (status, _, json) = error_to_response(AppError::NotFound("Page 3 not found".into())).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["detail"], "Page 3 not found");
}

#[tokio::test]
async fn bad_request_and_validation_are_400() {
    let (status, _, json) = error_to_response(AppError::BadRequest("invalid field value".into())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "BAD_REQUEST");
    assert_eq!(json["detail"], "invalid field value");

    let err = AppError::Core(CoreError::Validation("Invalid id: nope".into()));
    let (status, _, json) = error_to_response(err).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn schema_errors_are_listed() {
    let err = AppError::SchemaInvalid {
        message: "Layout JSON failed schema validation".into(),
        validation_errors: vec!["pages: required".into(), "document.dpi: must be > 0".into()],
    };

    let (status, _, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert_eq!(json["detail"], "Layout JSON failed schema validation");
    assert_eq!(json["validation_errors"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn payload_too_large_is_413() {
    let err = AppError::PayloadTooLarge("Workflow bundle exceeds 64 bytes".into());
    let (status, _, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(json["code"], "PAYLOAD_TOO_LARGE");
}

#[tokio::test]
async fn rate_limited_sets_retry_after() {
    let (status, headers, json) = error_to_response(AppError::RateLimited { retry_after: 17 }).await;

    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(headers["retry-after"], "17");
    assert_eq!(json["code"], "RATE_LIMITED");
    assert_eq!(json["retry_after"], 17);
}

#[tokio::test]
async fn rate_limited_never_advertises_zero() {
    let (_, headers, json) = error_to_response(AppError::RateLimited { retry_after: 0 }).await;

    assert_eq!(headers["retry-after"], "1");
    assert_eq!(json["retry_after"], 1);
}

#[tokio::test]
async fn unauthorized_is_401() {
    let err = AppError::Core(CoreError::Unauthorized("Invalid or missing API key".into()));
    let (status, _, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn missing_blob_is_404_and_store_outage_is_503() {
    let err = AppError::Storage(StorageError::NotFound("local://layouts/a.json".into()));
    let (status, _, json) = error_to_response(err).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["detail"], "Artifact content not found");

    let err = AppError::Storage(StorageError::Unavailable("connection refused".into()));
    let (status, _, json) = error_to_response(err).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["code"], "STORAGE_UNAVAILABLE");
    assert!(!json["detail"].as_str().unwrap().contains("refused"));
}

#[tokio::test]
async fn queue_outage_is_503() {
    let err = AppError::Queue(QueueError::Transport("broken pipe".into()));
    let (status, _, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["code"], "QUEUE_UNAVAILABLE");
}

#[tokio::test]
async fn database_errors_are_classified() {
    let (status, _, _) = error_to_response(AppError::Database(sqlx::Error::RowNotFound)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, json) = error_to_response(AppError::Database(sqlx::Error::PoolTimedOut)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["code"], "DATABASE_UNAVAILABLE");

    let err = AppError::Database(sqlx::Error::Protocol("secret table name".into()));
    let (status, _, json) = error_to_response(err).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["detail"], "An internal error occurred");
}

#[tokio::test]
async fn internal_errors_are_sanitized() {
    let err = AppError::InternalError("password=hunter2 leaked".into());
    let (status, _, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "INTERNAL_ERROR");
    assert!(!json["detail"].as_str().unwrap().contains("hunter2"));
}
