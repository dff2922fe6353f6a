//! Process-wide handles shared by every job a worker runs.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use sqlx::PgPool;

use pressline_core::kinds::ArtifactKind;
use pressline_core::types::DbId;
use pressline_db::models::artifact::{Artifact, CreateArtifact};
use pressline_db::models::status::LogLevel;
use pressline_db::repositories::{ArtifactRepo, JobLogRepo};
use pressline_events::EventBus;
use pressline_queue::backoff::{retry_with_backoff, BackoffConfig};
use pressline_queue::QueueAdapter;
use pressline_storage::{SharedStore, StorageError};

use crate::config::WorkerConfig;
use crate::error::JobError;

/// Retries granted to a single upload or download.
const STORAGE_RETRIES: u32 = 3;

#[derive(Clone)]
pub struct WorkerContext {
    pub pool: PgPool,
    pub store: SharedStore,
    pub queue: Arc<dyn QueueAdapter>,
    pub bus: Arc<EventBus>,
    pub config: Arc<WorkerConfig>,
    pub storage_backoff: BackoffConfig,
}

impl WorkerContext {
    pub fn new(
        pool: PgPool,
        store: SharedStore,
        queue: Arc<dyn QueueAdapter>,
        bus: Arc<EventBus>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            pool,
            store,
            queue,
            bus,
            config: Arc::new(config),
            storage_backoff: BackoffConfig {
                initial_delay: Duration::from_millis(500),
                max_delay: Duration::from_secs(8),
                multiplier: 2.0,
            },
        }
    }

    /// Upload `data` and record it as an artifact row.
    pub async fn store_artifact(
        &self,
        data: Vec<u8>,
        kind: ArtifactKind,
        file_name: &str,
        metadata: Value,
    ) -> Result<Artifact, JobError> {
        let checksum = self.store.checksum(&data);
        let size = data.len() as i64;
        let mime = kind.default_mime();

        let stored = retry_with_backoff(
            "artifact upload",
            &self.storage_backoff,
            STORAGE_RETRIES,
            StorageError::is_transient,
            || self.store.upload(data.clone(), kind, Some(file_name), Some(mime)),
        )
        .await?;

        let artifact = ArtifactRepo::create(
            &self.pool,
            &CreateArtifact {
                kind,
                storage: self.store.storage_kind(),
                storage_uri: stored.uri,
                file_name: stored.file_name,
                file_size: size,
                mime_type: Some(mime.to_string()),
                checksum_md5: checksum,
                metadata,
            },
        )
        .await?;
        tracing::debug!(artifact_id = %artifact.id, kind = %kind, size, "Artifact stored");
        Ok(artifact)
    }

    /// Download an artifact's blob.
    pub async fn fetch_artifact(&self, artifact: &Artifact) -> Result<Vec<u8>, JobError> {
        let uri = artifact.storage_uri.as_str();
        let data = retry_with_backoff(
            "artifact download",
            &self.storage_backoff,
            STORAGE_RETRIES,
            StorageError::is_transient,
            || self.store.download(uri),
        )
        .await?;
        Ok(data)
    }

    /// Append a job log entry. Logging failures are reported but never fail
    /// the job.
    pub async fn job_log(&self, job_id: DbId, level: LogLevel, message: &str, context: Option<Value>) {
        if let Err(e) = JobLogRepo::append(&self.pool, job_id, level, message, context.as_ref()).await {
            tracing::warn!(job_id = %job_id, error = %e, "Failed to append job log");
        }
    }
}
