use pressline_db::models::artifact::CreateArtifact;
use pressline_db::models::job::CreateJob;
use pressline_db::models::page::CreatePage;
use pressline_db::models::status::{ArtifactKind, JobKind, JobStatus, LogLevel, StorageKind};
use pressline_db::repositories::{ArtifactRepo, JobLogRepo, JobRepo, PageRepo};
use serde_json::json;
use sqlx::PgPool;

fn artifact_input(kind: ArtifactKind, name: &str) -> CreateArtifact {
    CreateArtifact {
        kind,
        storage: StorageKind::Local,
        storage_uri: format!("local://artifacts/{}/{name}", kind.as_str()),
        file_name: name.to_string(),
        file_size: 3,
        mime_type: Some(kind.default_mime().to_string()),
        checksum_md5: "900150983cd24fb0d6963f7d28e17f72".to_string(),
        metadata: json!({}),
    }
}

async fn seed_job(pool: &PgPool) -> (pressline_db::models::job::Job, pressline_db::models::artifact::Artifact) {
    let input = ArtifactRepo::create(pool, &artifact_input(ArtifactKind::LayoutJson, "layout.json"))
        .await
        .unwrap();
    let job = JobRepo::create(
        pool,
        &CreateJob {
            kind: JobKind::Compile,
            priority: 0,
            input_artifact_id: Some(input.id),
            metadata: json!({"correlation_id": "abc"}),
        },
    )
    .await
    .unwrap();
    (job, input)
}

// ---------------------------------------------------------------------------
// Bootstrap
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_health_check(pool: PgPool) {
    pressline_db::health_check(&pool).await.unwrap();
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_job_lifecycle(pool: PgPool) {
    let (job, input) = seed_job(&pool).await;
    assert_eq!(job.status(), JobStatus::Pending);
    assert!(job.started_at.is_none());

    assert!(JobRepo::mark_running(&pool, job.id).await.unwrap());
    let running = JobRepo::find_by_id(&pool, job.id).await.unwrap().unwrap();
    assert_eq!(running.status(), JobStatus::Running);
    assert!(running.started_at.is_some());

    let sla = ArtifactRepo::create(&pool, &artifact_input(ArtifactKind::Sla, "layout.sla"))
        .await
        .unwrap();
    JobRepo::complete(&pool, job.id, Some(sla.id)).await.unwrap();

    let done = JobRepo::find_with_artifacts(&pool, job.id).await.unwrap().unwrap();
    assert_eq!(done.job.status(), JobStatus::Completed);
    assert!(done.job.completed_at.is_some());
    assert_eq!(done.input_artifact.unwrap().id, input.id);
    assert_eq!(done.output_artifact.unwrap().artifact_type, "sla");

    // Terminal jobs cannot be restarted.
    assert!(!JobRepo::mark_running(&pool, job.id).await.unwrap());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_job_failure_records_message(pool: PgPool) {
    let (job, _) = seed_job(&pool).await;
    JobRepo::mark_running(&pool, job.id).await.unwrap();
    JobRepo::fail(&pool, job.id, "boom").await.unwrap();

    let failed = JobRepo::find_by_id(&pool, job.id).await.unwrap().unwrap();
    assert_eq!(failed.status(), JobStatus::Failed);
    assert_eq!(failed.error_message.as_deref(), Some("boom"));
    assert!(failed.completed_at.is_some());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_job_create_in_transaction_rolls_back(pool: PgPool) {
    let mut tx = pool.begin().await.unwrap();
    let artifact = ArtifactRepo::create(&mut *tx, &artifact_input(ArtifactKind::WorkflowBundle, "b.zip"))
        .await
        .unwrap();
    tx.rollback().await.unwrap();

    assert!(ArtifactRepo::find_by_id(&pool, artifact.id).await.unwrap().is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_stale_pending_sweep(pool: PgPool) {
    let (job, _) = seed_job(&pool).await;

    // The trigger keeps updated_at current, so backdate with it disabled.
    sqlx::query("ALTER TABLE jobs DISABLE TRIGGER set_updated_at_jobs")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("UPDATE jobs SET updated_at = NOW() - INTERVAL '1 hour' WHERE id = $1")
        .bind(job.id)
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("ALTER TABLE jobs ENABLE TRIGGER set_updated_at_jobs")
        .execute(&pool)
        .await
        .unwrap();

    let stale = JobRepo::list_stale_pending(&pool, 600).await.unwrap();
    assert_eq!(stale.len(), 1);

    JobRepo::touch(&pool, job.id).await.unwrap();
    assert!(JobRepo::list_stale_pending(&pool, 600).await.unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Logs and pages
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_logs_are_returned_oldest_first(pool: PgPool) {
    let (job, _) = seed_job(&pool).await;
    for msg in ["one", "two", "three"] {
        JobLogRepo::append(&pool, job.id, LogLevel::Info, msg, None)
            .await
            .unwrap();
    }
    JobLogRepo::append(&pool, job.id, LogLevel::Error, "bad", Some(&json!({"error": "x"})))
        .await
        .unwrap();

    let tail = JobLogRepo::list_for_job(&pool, job.id, 2).await.unwrap();
    let messages: Vec<_> = tail.iter().map(|l| l.message.as_str()).collect();
    assert_eq!(messages, vec!["three", "bad"]);
    assert_eq!(tail[1].log_level, "ERROR");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_pages_and_pdf_lookup(pool: PgPool) {
    let (job, _) = seed_job(&pool).await;
    for n in [2, 1] {
        PageRepo::create(
            &pool,
            &CreatePage {
                job_id: job.id,
                page_number: n,
                master_page: Some("A-Normal".into()),
                object_count: 2,
            },
        )
        .await
        .unwrap();
    }

    let pages = PageRepo::list_for_job(&pool, job.id).await.unwrap();
    assert_eq!(pages.iter().map(|p| p.page_number).collect::<Vec<_>>(), vec![1, 2]);

    let png = ArtifactRepo::create(&pool, &artifact_input(ArtifactKind::Png, "p1.png"))
        .await
        .unwrap();
    PageRepo::set_png_artifact(&pool, pages[0].id, png.id).await.unwrap();
    let first = PageRepo::find_by_number(&pool, job.id, 1).await.unwrap().unwrap();
    assert_eq!(first.png_artifact_id, Some(png.id));

    assert!(ArtifactRepo::find_pdf_for_job(&pool, job.id).await.unwrap().is_none());
    let pdf = ArtifactRepo::create(&pool, &artifact_input(ArtifactKind::Pdf, "out.pdf"))
        .await
        .unwrap();
    PageRepo::set_pdf_artifact(&pool, job.id, pdf.id).await.unwrap();
    assert_eq!(
        ArtifactRepo::find_pdf_for_job(&pool, job.id).await.unwrap().unwrap().id,
        pdf.id
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_duplicate_page_number_is_rejected(pool: PgPool) {
    let (job, _) = seed_job(&pool).await;
    let page = |object_count| CreatePage {
        job_id: job.id,
        page_number: 1,
        master_page: None,
        object_count,
    };

    PageRepo::create(&pool, &page(2)).await.unwrap();
    let err = PageRepo::create(&pool, &page(5)).await.unwrap_err();
    assert!(matches!(&err, sqlx::Error::Database(db) if db.is_unique_violation()), "{err}");

    let pages = PageRepo::list_for_job(&pool, job.id).await.unwrap();
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].object_count, 2);

    assert_eq!(PageRepo::delete_for_job(&pool, job.id).await.unwrap(), 1);
    PageRepo::create(&pool, &page(5)).await.unwrap();
}
