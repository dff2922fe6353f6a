//! Artifact rows and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use pressline_core::types::{DbId, Timestamp};

use super::status::{ArtifactKind, StorageKind};

/// A row from the `artifacts` table. Never updated after insert.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Artifact {
    pub id: DbId,
    pub artifact_type: String,
    pub storage_type: String,
    pub storage_uri: String,
    pub file_name: String,
    pub file_size: i64,
    pub mime_type: Option<String>,
    pub checksum_md5: String,
    pub metadata: serde_json::Value,
    pub created_at: Timestamp,
}

/// DTO for recording an uploaded blob.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateArtifact {
    pub kind: ArtifactKind,
    pub storage: StorageKind,
    pub storage_uri: String,
    pub file_name: String,
    pub file_size: i64,
    pub mime_type: Option<String>,
    pub checksum_md5: String,
    pub metadata: serde_json::Value,
}
