//! Per-page rows written by the compile job.

use serde::Serialize;
use sqlx::FromRow;
use pressline_core::types::{DbId, Timestamp};

/// A row from the `pages` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Page {
    pub id: DbId,
    pub job_id: DbId,
    pub page_number: i32,
    pub master_page: Option<String>,
    pub object_count: i32,
    pub png_artifact_id: Option<DbId>,
    pub pdf_artifact_id: Option<DbId>,
    pub created_at: Timestamp,
}

/// DTO for inserting a page row.
#[derive(Debug, Clone)]
pub struct CreatePage {
    pub job_id: DbId,
    pub page_number: i32,
    pub master_page: Option<String>,
    pub object_count: i32,
}
