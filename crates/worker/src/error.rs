use pressline_core::error::CoreError;
use pressline_pipeline::WorkflowError;
use pressline_queue::QueueError;
use pressline_storage::StorageError;

/// Errors that end a job as `failed`.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error(transparent)]
    Core(#[from] CoreError),

    /// The job row or its input is unusable.
    #[error("Invalid job: {0}")]
    InvalidJob(String),

    #[error("Invalid workflow bundle: {0}")]
    Bundle(String),

    #[error("Render failed: {0}")]
    Render(String),

    #[error("Worker I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Job timed out after {0} s")]
    TimedOut(u64),
}

impl JobError {
    /// Short machine-readable classification stored in the ERROR log context.
    pub fn kind(&self) -> &'static str {
        match self {
            JobError::Database(_) => "database",
            JobError::Storage(_) => "storage",
            JobError::Queue(_) => "queue",
            JobError::Workflow(WorkflowError::Configuration(_)) => "configuration",
            JobError::Workflow(_) => "workflow",
            JobError::Core(_) | JobError::InvalidJob(_) | JobError::Json(_) => "validation",
            JobError::Bundle(_) | JobError::Zip(_) => "bundle",
            JobError::Render(_) => "render",
            JobError::Io(_) => "io",
            JobError::TimedOut(_) => "timeout",
        }
    }

    /// The failing step for workflow errors.
    pub fn step_id(&self) -> Option<&str> {
        match self {
            JobError::Workflow(err) => err.step_id(),
            _ => None,
        }
    }
}
