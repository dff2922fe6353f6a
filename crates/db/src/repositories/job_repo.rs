//! Repository for the `jobs` table.
//!
//! Status transitions go through `JobStatus`; no status literal appears in
//! the SQL text.

use sqlx::{PgExecutor, PgPool};
use pressline_core::ids::new_id;
use pressline_core::types::DbId;

use crate::models::job::{CreateJob, Job, JobWithArtifacts};
use crate::models::status::JobStatus;
use crate::repositories::ArtifactRepo;

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    id, job_type, status, priority, input_artifact_id, output_artifact_id, \
    error_message, metadata, created_at, updated_at, started_at, completed_at";

/// Maximum number of stale jobs returned per sweep.
const STALE_BATCH_LIMIT: i64 = 100;

pub struct JobRepo;

impl JobRepo {
    /// Insert a new pending job.
    pub async fn create<'e, E>(executor: E, input: &CreateJob) -> Result<Job, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "INSERT INTO jobs (id, job_type, status, priority, input_artifact_id, metadata) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(new_id())
            .bind(input.kind.as_str())
            .bind(JobStatus::Pending.as_str())
            .bind(input.priority)
            .bind(input.input_artifact_id)
            .bind(&input.metadata)
            .fetch_one(executor)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1");
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a job together with its input and output artifacts.
    pub async fn find_with_artifacts(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<JobWithArtifacts>, sqlx::Error> {
        let Some(job) = Self::find_by_id(pool, id).await? else {
            return Ok(None);
        };
        let input_artifact = match job.input_artifact_id {
            Some(aid) => ArtifactRepo::find_by_id(pool, aid).await?,
            None => None,
        };
        let output_artifact = match job.output_artifact_id {
            Some(aid) => ArtifactRepo::find_by_id(pool, aid).await?,
            None => None,
        };
        Ok(Some(JobWithArtifacts {
            job,
            input_artifact,
            output_artifact,
        }))
    }

    /// Move a job to `running` and stamp `started_at`.
    ///
    /// Redelivered jobs that are already running are accepted again; returns
    /// `false` only when the job is terminal or missing.
    pub async fn mark_running(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs SET status = $2, started_at = NOW(), completed_at = NULL, error_message = NULL \
             WHERE id = $1 AND status IN ($3, $2)",
        )
        .bind(id)
        .bind(JobStatus::Running.as_str())
        .bind(JobStatus::Pending.as_str())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_output_artifact(
        pool: &PgPool,
        id: DbId,
        artifact_id: DbId,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE jobs SET output_artifact_id = $2 WHERE id = $1")
            .bind(id)
            .bind(artifact_id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Mark a job completed, optionally attaching its primary artifact.
    pub async fn complete(
        pool: &PgPool,
        id: DbId,
        output_artifact_id: Option<DbId>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE jobs \
             SET status = $2, completed_at = NOW(), \
                 output_artifact_id = COALESCE($3, output_artifact_id) \
             WHERE id = $1",
        )
        .bind(id)
        .bind(JobStatus::Completed.as_str())
        .bind(output_artifact_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Mark a job failed with the error text.
    pub async fn fail(pool: &PgPool, id: DbId, error: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE jobs SET status = $2, error_message = $3, completed_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(JobStatus::Failed.as_str())
        .bind(error)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Pending jobs not touched for `older_than_secs`, oldest first.
    pub async fn list_stale_pending(
        pool: &PgPool,
        older_than_secs: i64,
    ) -> Result<Vec<Job>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM jobs \
             WHERE status = $1 AND updated_at < NOW() - make_interval(secs => $2) \
             ORDER BY created_at ASC \
             LIMIT $3"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(JobStatus::Pending.as_str())
            .bind(older_than_secs as f64)
            .bind(STALE_BATCH_LIMIT)
            .fetch_all(pool)
            .await
    }

    /// Bump `updated_at` so a re-enqueued job is not swept again right away.
    pub async fn touch(pool: &PgPool, id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE jobs SET updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }
}
