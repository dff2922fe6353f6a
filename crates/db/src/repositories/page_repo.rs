//! Repository for the `pages` table.

use sqlx::PgPool;
use pressline_core::ids::new_id;
use pressline_core::types::DbId;

use crate::models::page::{CreatePage, Page};

const COLUMNS: &str = "\
    id, job_id, page_number, master_page, object_count, \
    png_artifact_id, pdf_artifact_id, created_at";

pub struct PageRepo;

impl PageRepo {
    /// Insert a page row. A second row for the same `(job_id, page_number)`
    /// violates the unique constraint and is returned as an error.
    pub async fn create(pool: &PgPool, input: &CreatePage) -> Result<Page, sqlx::Error> {
        let query = format!(
            "INSERT INTO pages (id, job_id, page_number, master_page, object_count) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Page>(&query)
            .bind(new_id())
            .bind(input.job_id)
            .bind(input.page_number)
            .bind(&input.master_page)
            .bind(input.object_count)
            .fetch_one(pool)
            .await
    }

    /// Drop every page row of a job. Returns the number removed.
    pub async fn delete_for_job(pool: &PgPool, job_id: DbId) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM pages WHERE job_id = $1")
            .bind(job_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn list_for_job(pool: &PgPool, job_id: DbId) -> Result<Vec<Page>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM pages WHERE job_id = $1 ORDER BY page_number");
        sqlx::query_as::<_, Page>(&query)
            .bind(job_id)
            .fetch_all(pool)
            .await
    }

    pub async fn find_by_number(
        pool: &PgPool,
        job_id: DbId,
        page_number: i32,
    ) -> Result<Option<Page>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM pages WHERE job_id = $1 AND page_number = $2");
        sqlx::query_as::<_, Page>(&query)
            .bind(job_id)
            .bind(page_number)
            .fetch_optional(pool)
            .await
    }

    pub async fn set_png_artifact(
        pool: &PgPool,
        page_id: DbId,
        artifact_id: DbId,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE pages SET png_artifact_id = $2 WHERE id = $1")
            .bind(page_id)
            .bind(artifact_id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Attach the job's PDF to every page of the job.
    pub async fn set_pdf_artifact(
        pool: &PgPool,
        job_id: DbId,
        artifact_id: DbId,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE pages SET pdf_artifact_id = $2 WHERE job_id = $1")
            .bind(job_id)
            .bind(artifact_id)
            .execute(pool)
            .await?;
        Ok(())
    }
}
