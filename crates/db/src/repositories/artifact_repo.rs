//! Repository for the `artifacts` table.

use sqlx::{PgExecutor, PgPool};
use pressline_core::ids::new_id;
use pressline_core::types::DbId;

use crate::models::artifact::{Artifact, CreateArtifact};
use crate::models::status::ArtifactKind;

/// Column list for `artifacts` queries.
const COLUMNS: &str = "\
    id, artifact_type, storage_type, storage_uri, file_name, file_size, \
    mime_type, checksum_md5, metadata, created_at";

/// Artifacts are insert-only.
pub struct ArtifactRepo;

impl ArtifactRepo {
    /// Record an uploaded blob.
    pub async fn create<'e, E>(executor: E, input: &CreateArtifact) -> Result<Artifact, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "INSERT INTO artifacts \
                (id, artifact_type, storage_type, storage_uri, file_name, file_size, \
                 mime_type, checksum_md5, metadata) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Artifact>(&query)
            .bind(new_id())
            .bind(input.kind.as_str())
            .bind(input.storage.as_str())
            .bind(&input.storage_uri)
            .bind(&input.file_name)
            .bind(input.file_size)
            .bind(&input.mime_type)
            .bind(&input.checksum_md5)
            .bind(&input.metadata)
            .fetch_one(executor)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Artifact>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM artifacts WHERE id = $1");
        sqlx::query_as::<_, Artifact>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// The final PDF of a job: the most recent `pdf` artifact referenced by
    /// one of its pages.
    pub async fn find_pdf_for_job(
        pool: &PgPool,
        job_id: DbId,
    ) -> Result<Option<Artifact>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM artifacts a \
             WHERE a.artifact_type = $2 \
               AND a.id IN (SELECT pdf_artifact_id FROM pages WHERE job_id = $1) \
             ORDER BY a.created_at DESC \
             LIMIT 1",
            prefixed_columns("a")
        );
        sqlx::query_as::<_, Artifact>(&query)
            .bind(job_id)
            .bind(ArtifactKind::Pdf.as_str())
            .fetch_optional(pool)
            .await
    }
}

fn prefixed_columns(alias: &str) -> String {
    COLUMNS
        .split(',')
        .map(|c| format!("{alias}.{}", c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}
