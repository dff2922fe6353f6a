//! Worker jobs against a real database, the in-memory queue and the local
//! artifact store.

use std::io::{Cursor, Write};
use std::sync::Arc;

use serde_json::{json, Value};
use sqlx::PgPool;

use pressline_core::hashing::md5_hex;
use pressline_core::ids::to_hex;
use pressline_core::kinds::ArtifactKind;
use pressline_db::models::artifact::CreateArtifact;
use pressline_db::models::job::{CreateJob, Job};
use pressline_db::models::status::{JobKind, JobStatus, LogLevel};
use pressline_db::repositories::{ArtifactRepo, JobLogRepo, JobRepo, PageRepo};
use pressline_events::EventBus;
use pressline_queue::{MemoryQueue, QueueAdapter, QueueName, COMPILE_FUNCTION, WORKFLOW_FUNCTION};
use pressline_worker::{sweeper, Worker, WorkerConfig, WorkerContext};

struct Harness {
    _dir: tempfile::TempDir,
    ctx: WorkerContext,
    queue: Arc<MemoryQueue>,
    bus: Arc<EventBus>,
}

async fn harness(pool: PgPool) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let config = WorkerConfig::local(dir.path());
    let store = pressline_storage::connect(&config.store).await;
    let queue = Arc::new(MemoryQueue::new());
    let bus = Arc::new(EventBus::default());
    let ctx = WorkerContext::new(
        pool,
        store,
        Arc::clone(&queue) as Arc<dyn QueueAdapter>,
        Arc::clone(&bus),
        config,
    );
    Harness {
        _dir: dir,
        ctx,
        queue,
        bus,
    }
}

fn descriptor() -> Value {
    let page = |n: i64| {
        json!({"pageNumber": n, "objects": [
            {"id": format!("t{n}"), "type": "text", "bbox": {"x": 100, "y": 100, "w": 800, "h": 200},
             "content": "Hello", "fontFamily": "Arial", "fontSize": 12},
            {"id": format!("i{n}"), "type": "image", "bbox": {"x": 100, "y": 400, "w": 800, "h": 600},
             "imageUrl": "https://example.com/a.png"}
        ]})
    };
    json!({
        "version": "1.0.0",
        "document": {"width": 2480, "height": 3508, "dpi": 300},
        "pages": [page(1), page(2)]
    })
}

async fn insert_job(h: &Harness, kind: JobKind, kind_of_input: ArtifactKind, data: Vec<u8>, metadata: Value) -> Job {
    let stored = h.ctx.store.upload(data.clone(), kind_of_input, None, None).await.unwrap();
    let artifact = ArtifactRepo::create(
        &h.ctx.pool,
        &CreateArtifact {
            kind: kind_of_input,
            storage: h.ctx.store.storage_kind(),
            storage_uri: stored.uri,
            file_name: stored.file_name,
            file_size: data.len() as i64,
            mime_type: Some(kind_of_input.default_mime().to_string()),
            checksum_md5: md5_hex(&data),
            metadata: json!({}),
        },
    )
    .await
    .unwrap();
    JobRepo::create(
        &h.ctx.pool,
        &CreateJob {
            kind,
            priority: 0,
            input_artifact_id: Some(artifact.id),
            metadata,
        },
    )
    .await
    .unwrap()
}

async fn enqueue(h: &Harness, queue: QueueName, func: &str, job: &Job) {
    h.queue
        .enqueue(queue, func, vec![json!(to_hex(job.id))], queue.default_timeout())
        .await
        .unwrap();
}

// ---------------------------------------------------------------------------
// Compile
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn compile_job_produces_sla_pages_and_previews(pool: PgPool) {
    let h = harness(pool).await;
    let mut events = h.bus.subscribe();
    let data = serde_json::to_vec(&descriptor()).unwrap();
    let job = insert_job(&h, JobKind::Compile, ArtifactKind::LayoutJson, data, json!({"correlation_id": "corr-7"})).await;
    enqueue(&h, QueueName::Compile, COMPILE_FUNCTION, &job).await;

    let worker = Worker::new(h.ctx.clone());
    assert_eq!(worker.run_until_idle().await, 1);

    let done = JobRepo::find_by_id(&h.ctx.pool, job.id).await.unwrap().unwrap();
    assert_eq!(done.status(), JobStatus::Completed);
    assert!(done.started_at.is_some() && done.completed_at.is_some());

    let sla = ArtifactRepo::find_by_id(&h.ctx.pool, done.output_artifact_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sla.artifact_type, "sla");
    let blob = h.ctx.store.download(&sla.storage_uri).await.unwrap();
    assert_eq!(sla.checksum_md5, md5_hex(&blob));
    assert!(String::from_utf8(blob).unwrap().contains("SCRIBUSUTF8NEW"));

    let pages = PageRepo::list_for_job(&h.ctx.pool, job.id).await.unwrap();
    assert_eq!(pages.iter().map(|p| p.page_number).collect::<Vec<_>>(), vec![1, 2]);
    assert!(pages.iter().all(|p| p.png_artifact_id.is_some() && p.pdf_artifact_id.is_some()));
    assert!(ArtifactRepo::find_pdf_for_job(&h.ctx.pool, job.id).await.unwrap().is_some());

    let mut types = Vec::new();
    while let Ok(event) = events.try_recv() {
        assert_eq!(event.data["correlation_id"], "corr-7");
        types.push(event.event_type);
    }
    assert_eq!(types, vec!["job.compilation.completed", "job.export.completed"]);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn invalid_descriptor_fails_the_job_with_an_error_log(pool: PgPool) {
    let h = harness(pool).await;
    let mut events = h.bus.subscribe();
    let data = serde_json::to_vec(&json!({"pages": "nope"})).unwrap();
    let job = insert_job(&h, JobKind::Compile, ArtifactKind::LayoutJson, data, json!({})).await;
    enqueue(&h, QueueName::Compile, COMPILE_FUNCTION, &job).await;

    Worker::new(h.ctx.clone()).run_until_idle().await;

    let failed = JobRepo::find_by_id(&h.ctx.pool, job.id).await.unwrap().unwrap();
    assert_eq!(failed.status(), JobStatus::Failed);
    assert!(failed.error_message.unwrap().contains("schema error"));

    let logs = JobLogRepo::list_for_job(&h.ctx.pool, job.id, 50).await.unwrap();
    let error = logs.iter().find(|l| l.log_level == LogLevel::Error.as_str()).unwrap();
    assert_eq!(error.context.as_ref().unwrap()["error_kind"], "validation");
    assert_eq!(events.try_recv().unwrap().event_type, "job.failed");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn unusable_page_numbers_fail_the_job_without_page_rows(pool: PgPool) {
    let h = harness(pool).await;
    for bad in [json!(1), json!(0), json!(4_294_967_297u64)] {
        let mut doc = descriptor();
        doc["pages"][1]["pageNumber"] = bad.clone();
        let job = insert_job(&h, JobKind::Compile, ArtifactKind::LayoutJson, serde_json::to_vec(&doc).unwrap(), json!({})).await;
        enqueue(&h, QueueName::Compile, COMPILE_FUNCTION, &job).await;

        Worker::new(h.ctx.clone()).run_until_idle().await;

        let failed = JobRepo::find_by_id(&h.ctx.pool, job.id).await.unwrap().unwrap();
        assert_eq!(failed.status(), JobStatus::Failed, "pageNumber {bad}");
        assert!(failed.error_message.unwrap().contains("/pages/1/pageNumber"));
        assert!(PageRepo::list_for_job(&h.ctx.pool, job.id).await.unwrap().is_empty());
    }
}

/// Every artifact row still describes the bytes at its URI. Returns
/// `(rows, distinct uris)`.
async fn artifact_checksums_hold(h: &Harness) -> (usize, usize) {
    let rows: Vec<(String, String)> = sqlx::query_as("SELECT storage_uri, checksum_md5 FROM artifacts")
        .fetch_all(&h.ctx.pool)
        .await
        .unwrap();
    for (uri, checksum) in &rows {
        let blob = h.ctx.store.download(uri).await.unwrap();
        assert_eq!(&md5_hex(&blob), checksum, "{uri}");
    }
    let uris: std::collections::HashSet<_> = rows.iter().map(|(uri, _)| uri.as_str()).collect();
    (rows.len(), uris.len())
}

/// Puts a finished job back in `running` and queues it again, the way a
/// worker crash after completion would leave it.
async fn redeliver(h: &Harness, queue: QueueName, func: &str, job: &Job) {
    sqlx::query("UPDATE jobs SET status = 'running' WHERE id = $1")
        .bind(job.id)
        .execute(&h.ctx.pool)
        .await
        .unwrap();
    enqueue(h, queue, func, job).await;
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn redelivered_compile_keeps_every_checksum_valid(pool: PgPool) {
    let h = harness(pool).await;
    let data = serde_json::to_vec(&descriptor()).unwrap();
    let job = insert_job(&h, JobKind::Compile, ArtifactKind::LayoutJson, data, json!({})).await;
    enqueue(&h, QueueName::Compile, COMPILE_FUNCTION, &job).await;
    Worker::new(h.ctx.clone()).run_until_idle().await;
    let first = JobRepo::find_by_id(&h.ctx.pool, job.id).await.unwrap().unwrap();

    redeliver(&h, QueueName::Compile, COMPILE_FUNCTION, &job).await;
    assert_eq!(Worker::new(h.ctx.clone()).run_until_idle().await, 1);

    let second = JobRepo::find_by_id(&h.ctx.pool, job.id).await.unwrap().unwrap();
    assert_eq!(second.status(), JobStatus::Completed, "{:?}", second.error_message);
    assert_ne!(second.output_artifact_id, first.output_artifact_id);

    // input + 2 runs x (sla, build, pdf, 2 previews)
    let (rows, uris) = artifact_checksums_hold(&h).await;
    assert_eq!(rows, 11);
    assert_eq!(uris, rows);

    let pages = PageRepo::list_for_job(&h.ctx.pool, job.id).await.unwrap();
    assert_eq!(pages.iter().map(|p| p.page_number).collect::<Vec<_>>(), vec![1, 2]);
    let pdf = ArtifactRepo::find_pdf_for_job(&h.ctx.pool, job.id).await.unwrap().unwrap();
    assert!(pages.iter().all(|p| p.pdf_artifact_id == Some(pdf.id)));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn terminal_jobs_are_not_reprocessed(pool: PgPool) {
    let h = harness(pool).await;
    let data = serde_json::to_vec(&descriptor()).unwrap();
    let job = insert_job(&h, JobKind::Compile, ArtifactKind::LayoutJson, data, json!({})).await;
    JobRepo::fail(&h.ctx.pool, job.id, "cancelled by test").await.unwrap();
    enqueue(&h, QueueName::Compile, COMPILE_FUNCTION, &job).await;

    Worker::new(h.ctx.clone()).run_until_idle().await;

    let row = JobRepo::find_by_id(&h.ctx.pool, job.id).await.unwrap().unwrap();
    assert_eq!(row.error_message.as_deref(), Some("cancelled by test"));
    assert!(PageRepo::list_for_job(&h.ctx.pool, job.id).await.unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

fn bundle() -> Vec<u8> {
    let deck = json!({
        "name": "deck_a",
        "slides": [{
            "slide": 1,
            "text_boxes": [{"role": "title", "text": "Title", "rel_bbox": [0.1, 0.05, 0.9, 0.15]}],
            "image_boxes": [{"rel_bbox": [0.1, 0.3, 0.6, 0.7], "image": "img/a.png"}]
        }]
    });
    let manifest = json!({"files": [{"name": "deck_a", "json": "json/deck_a.json"}]});
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, body) in [("manifest.json", manifest), ("json/deck_a.json", deck)] {
        writer.start_file(name, zip::write::SimpleFileOptions::default()).unwrap();
        writer.write_all(body.to_string().as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn workflow_job_uploads_report_zip(pool: PgPool) {
    let h = harness(pool).await;
    let job = insert_job(
        &h,
        JobKind::Workflow,
        ArtifactKind::WorkflowBundle,
        bundle(),
        json!({"options": {"quality_check": true}}),
    )
    .await;
    enqueue(&h, QueueName::Workflow, WORKFLOW_FUNCTION, &job).await;

    Worker::new(h.ctx.clone()).run_until_idle().await;

    let done = JobRepo::find_by_id(&h.ctx.pool, job.id).await.unwrap().unwrap();
    assert_eq!(done.status(), JobStatus::Completed, "{:?}", done.error_message);
    let report = ArtifactRepo::find_by_id(&h.ctx.pool, done.output_artifact_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.artifact_type, "workflow_report");
    assert!(report.file_name.starts_with("workflow_report_"));

    let blob = h.ctx.store.download(&report.storage_uri).await.unwrap();
    let archive = zip::ZipArchive::new(Cursor::new(blob)).unwrap();
    assert!(archive.file_names().any(|n| n == "temp_analysis/workflow_state.json"));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn redelivered_workflow_stores_a_second_report(pool: PgPool) {
    let h = harness(pool).await;
    let job = insert_job(
        &h,
        JobKind::Workflow,
        ArtifactKind::WorkflowBundle,
        bundle(),
        json!({"options": {"quality_check": true}}),
    )
    .await;
    enqueue(&h, QueueName::Workflow, WORKFLOW_FUNCTION, &job).await;
    Worker::new(h.ctx.clone()).run_until_idle().await;
    let first = JobRepo::find_by_id(&h.ctx.pool, job.id).await.unwrap().unwrap();
    assert_eq!(first.status(), JobStatus::Completed, "{:?}", first.error_message);

    redeliver(&h, QueueName::Workflow, WORKFLOW_FUNCTION, &job).await;
    Worker::new(h.ctx.clone()).run_until_idle().await;

    let second = JobRepo::find_by_id(&h.ctx.pool, job.id).await.unwrap().unwrap();
    assert_eq!(second.status(), JobStatus::Completed, "{:?}", second.error_message);
    assert_ne!(second.output_artifact_id, first.output_artifact_id);
    assert_eq!(artifact_checksums_hold(&h).await, (3, 3));
}

// ---------------------------------------------------------------------------
// Sweeper
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn sweeper_requeues_stale_pending_jobs(pool: PgPool) {
    let h = harness(pool).await;
    let data = serde_json::to_vec(&descriptor()).unwrap();
    let job = insert_job(&h, JobKind::Compile, ArtifactKind::LayoutJson, data, json!({})).await;
    // The trigger would overwrite a backdated updated_at.
    for statement in [
        "ALTER TABLE jobs DISABLE TRIGGER set_updated_at_jobs",
        "UPDATE jobs SET updated_at = NOW() - INTERVAL '1 hour'",
        "ALTER TABLE jobs ENABLE TRIGGER set_updated_at_jobs",
    ] {
        sqlx::query(statement).execute(&h.ctx.pool).await.unwrap();
    }

    let requeued = sweeper::sweep_once(&h.ctx, std::time::Duration::from_secs(600)).await.unwrap();
    assert_eq!(requeued, 1);
    let pending = h.queue.pending(QueueName::Compile).await;
    assert_eq!(pending[0].first_arg_str(), Some(to_hex(job.id).as_str()));

    // Touched: not swept again right away.
    assert_eq!(sweeper::sweep_once(&h.ctx, std::time::Duration::from_secs(600)).await.unwrap(), 0);
}
