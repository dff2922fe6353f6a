//! Append-only job log entries.

use serde::Serialize;
use sqlx::FromRow;
use pressline_core::types::{DbId, Timestamp};

/// A row from the `job_logs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct JobLog {
    pub id: DbId,
    pub job_id: DbId,
    pub log_level: String,
    pub message: String,
    pub context: Option<serde_json::Value>,
    pub created_at: Timestamp,
}
