//! Repository for the append-only `job_logs` table.

use sqlx::PgPool;
use pressline_core::ids::new_id;
use pressline_core::types::DbId;

use crate::models::job_log::JobLog;
use crate::models::status::LogLevel;

const COLUMNS: &str = "id, job_id, log_level, message, context, created_at";

/// Default number of entries returned by [`JobLogRepo::list_for_job`].
pub const DEFAULT_LOG_LIMIT: i64 = 500;

pub struct JobLogRepo;

impl JobLogRepo {
    pub async fn append(
        pool: &PgPool,
        job_id: DbId,
        level: LogLevel,
        message: &str,
        context: Option<&serde_json::Value>,
    ) -> Result<JobLog, sqlx::Error> {
        let query = format!(
            "INSERT INTO job_logs (id, job_id, log_level, message, context) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, JobLog>(&query)
            .bind(new_id())
            .bind(job_id)
            .bind(level.as_str())
            .bind(message)
            .bind(context)
            .fetch_one(pool)
            .await
    }

    /// Oldest first, at most `limit` entries (the tail when there are more).
    pub async fn list_for_job(
        pool: &PgPool,
        job_id: DbId,
        limit: i64,
    ) -> Result<Vec<JobLog>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM ( \
                 SELECT {COLUMNS} FROM job_logs WHERE job_id = $1 \
                 ORDER BY created_at DESC, id DESC LIMIT $2 \
             ) tail ORDER BY created_at ASC, id ASC"
        );
        sqlx::query_as::<_, JobLog>(&query)
            .bind(job_id)
            .bind(limit)
            .fetch_all(pool)
            .await
    }
}
