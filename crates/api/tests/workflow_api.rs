//! HTTP-level integration tests for `POST /v1/workflow/run`.

mod common;

use axum::http::StatusCode;
use common::{body_json, build_test_app, count_rows, minimal_bundle, multipart_request, send, zip_of};
use sqlx::PgPool;

use pressline_core::types::DbId;
use pressline_db::repositories::JobRepo;
use pressline_queue::{QueueName, WORKFLOW_FUNCTION};

const RUN: &str = "/v1/workflow/run";

// ---------------------------------------------------------------------------
// Test: a valid bundle creates a pending workflow job
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn bundle_creates_workflow_job(pool: PgPool) {
    let app = build_test_app(pool.clone()).await;
    let mut events = app.state.bus.subscribe();

    let bundle = minimal_bundle();
    let request = multipart_request(
        RUN,
        &[("bundle", "spring deck", &bundle)],
        &[("options_json", r#"{"priority": 7, "quality_check": true, "retry_max": 2}"#)],
    );
    let response = send(app.app(), request).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let json = body_json(response).await;
    assert_eq!(json["job_type"], "workflow");
    assert_eq!(json["status"], "pending");
    assert_eq!(json["priority"], 7);
    assert_eq!(json["metadata"]["options"]["quality_check"], true);
    assert!(json["metadata"]["options"].get("priority").is_none());
    assert_eq!(json["input_artifact"]["artifact_type"], "workflow_bundle");
    assert!(json["input_artifact"]["file_name"]
        .as_str()
        .unwrap()
        .ends_with("_spring_deck.zip"));
    assert_eq!(json["input_artifact"]["metadata"]["original_file_name"], "spring deck");

    let job_id: DbId = json["id"].as_str().unwrap().parse().unwrap();
    let job = JobRepo::find_by_id(&pool, job_id).await.unwrap().unwrap();
    assert_eq!(job.metadata["options"]["retry_max"], 2);

    let queued = app.wait_for_enqueued(QueueName::Workflow, 1).await;
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].func, WORKFLOW_FUNCTION);
    assert_eq!(queued[0].timeout_secs, QueueName::Workflow.default_timeout().as_secs());

    let event = events.recv().await.unwrap();
    assert_eq!(event.channel, "workflow");
    assert_eq!(event.event_type, "workflow.job.created");
    assert_eq!(event.data["job_id"], job_id.to_string());
    assert_eq!(event.data["correlation_id"], json["metadata"]["correlation_id"]);
}

// ---------------------------------------------------------------------------
// Test: rejected uploads write nothing
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn oversized_bundle_is_413(pool: PgPool) {
    let app = build_test_app(pool.clone()).await;

    // The test limit is 64 KiB; the size check runs before the archive is read.
    let big = vec![0u8; 80 * 1024];
    let response = send(app.app(), multipart_request(RUN, &[("bundle", "big.zip", &big)], &[])).await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body_json(response).await["code"], "PAYLOAD_TOO_LARGE");

    assert_eq!(count_rows(&pool, "jobs").await, 0);
    assert_eq!(count_rows(&pool, "artifacts").await, 0);
    assert!(app.queue.pending(QueueName::Workflow).await.is_empty());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn bundle_without_manifest_is_400(pool: PgPool) {
    let app = build_test_app(pool.clone()).await;

    let bundle = zip_of(&[("json/deck.json", b"{}")]);
    let response = send(app.app(), multipart_request(RUN, &[("bundle", "deck.zip", &bundle)], &[])).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert!(json["detail"].as_str().unwrap().contains("manifest.json"));
    assert_eq!(count_rows(&pool, "jobs").await, 0);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn traversal_in_bundle_is_400(pool: PgPool) {
    let app = build_test_app(pool).await;

    let bundle = zip_of(&[("manifest.json", b"{}"), ("../escape.txt", b"x")]);
    let response = send(app.app(), multipart_request(RUN, &[("bundle", "deck.zip", &bundle)], &[])).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn missing_bundle_or_bad_options_is_400(pool: PgPool) {
    let app = build_test_app(pool.clone()).await;

    let response = send(app.app(), multipart_request(RUN, &[], &[("options_json", "{}")])).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let bundle = minimal_bundle();
    for options in ["not json", r#"{"priority": 5000}"#, r#"{"force": "yes"}"#] {
        let request = multipart_request(RUN, &[("bundle", "deck.zip", &bundle)], &[("options_json", options)]);
        let response = send(app.app(), request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "options {options}");
    }
    assert_eq!(count_rows(&pool, "jobs").await, 0);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn contradictory_gamma_options_are_400_before_upload(pool: PgPool) {
    let app = build_test_app(pool.clone()).await;
    let bundle = minimal_bundle();

    for options in [
        r#"{"gamma_attach_to_variants": true}"#,
        r#"{"gamma_attach_to_variants": true, "gamma_sync": true}"#,
        r#"{"gamma_sync": true, "gamma_crop_kinds": []}"#,
    ] {
        let request = multipart_request(RUN, &[("bundle", "deck.zip", &bundle)], &[("options_json", options)]);
        let response = send(app.app(), request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "options {options}");
        let json = body_json(response).await;
        assert!(json["detail"].as_str().unwrap().contains("requires"), "{json}");
    }
    assert_eq!(count_rows(&pool, "jobs").await, 0);
    assert_eq!(count_rows(&pool, "artifacts").await, 0);

    // With gamma PNGs beside the manifest the same attach request is accepted.
    let with_gamma = zip_of(&[
        ("manifest.json", br#"{"files": [{"name": "deck", "json": "json/deck.json"}]}"#),
        ("json/deck.json", br#"{"slides": []}"#),
        ("gamma/slide_1.png", b"png"),
    ]);
    let request = multipart_request(
        RUN,
        &[("bundle", "deck.zip", &with_gamma)],
        &[("options_json", r#"{"gamma_attach_to_variants": true, "gamma_sync": true}"#)],
    );
    assert_eq!(send(app.app(), request).await.status(), StatusCode::CREATED);
}
