use sqlx::PgPool;

/// Full bootstrap test: connect, migrate, verify schema.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_full_bootstrap(pool: PgPool) {
    pressline_db::health_check(&pool).await.unwrap();

    for table in ["artifacts", "jobs", "job_logs", "pages"] {
        let count: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&pool)
            .await
            .unwrap_or_else(|e| panic!("{table} query failed: {e}"));
        assert_eq!(count.0, 0, "{table} should start empty");
    }
}

/// Running migrations against an up-to-date database is a no-op.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_migrations_are_idempotent(pool: PgPool) {
    pressline_db::run_migrations(&pool).await.unwrap();
    pressline_db::run_migrations(&pool).await.unwrap();
}

/// The `updated_at` trigger fires on job updates.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_jobs_updated_at_trigger(pool: PgPool) {
    let id = uuid::Uuid::new_v4();
    sqlx::query(
        "INSERT INTO jobs (id, job_type, updated_at) VALUES ($1, 'compile', NOW() - INTERVAL '1 hour')",
    )
    .bind(id)
    .execute(&pool)
    .await
    .unwrap();

    sqlx::query("UPDATE jobs SET status = 'running' WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await
        .unwrap();

    let (fresh,): (bool,) =
        sqlx::query_as("SELECT updated_at > NOW() - INTERVAL '1 minute' FROM jobs WHERE id = $1")
            .bind(id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert!(fresh, "updated_at should be refreshed by the trigger");
}
