//! Job rows and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use pressline_core::types::{DbId, Timestamp};

use super::artifact::Artifact;
use super::status::{JobKind, JobStatus};

/// A row from the `jobs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Job {
    pub id: DbId,
    pub job_type: String,
    pub status: String,
    pub priority: i32,
    pub input_artifact_id: Option<DbId>,
    pub output_artifact_id: Option<DbId>,
    pub error_message: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
}

impl Job {
    /// Parsed status; unknown values (impossible under the CHECK constraint)
    /// read as pending.
    pub fn status(&self) -> JobStatus {
        JobStatus::parse(&self.status).unwrap_or(JobStatus::Pending)
    }

    pub fn kind(&self) -> Option<JobKind> {
        JobKind::parse(&self.job_type).ok()
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }
}

/// DTO for inserting a new pending job.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateJob {
    pub kind: JobKind,
    pub priority: i32,
    pub input_artifact_id: Option<DbId>,
    pub metadata: serde_json::Value,
}

/// A job joined with its input and output artifact rows.
#[derive(Debug, Clone, Serialize)]
pub struct JobWithArtifacts {
    #[serde(flatten)]
    pub job: Job,
    pub input_artifact: Option<Artifact>,
    pub output_artifact: Option<Artifact>,
}
