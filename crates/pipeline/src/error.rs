use std::io;

/// Errors raised while loading or saving workflow state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("State file I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("State file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported state schema version '{0}'")]
    UnsupportedSchema(String),
}

/// Errors raised by a single step.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    /// The action itself failed.
    #[error("{0}")]
    Action(String),

    /// Blob store, queue or filesystem hiccup. Worth retrying.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl StepError {
    pub fn action(message: impl Into<String>) -> Self {
        StepError::Action(message.into())
    }

    /// Transport failures are expected to clear up on their own.
    pub fn is_transient(&self) -> bool {
        matches!(self, StepError::Transport(_))
    }
}

impl From<io::Error> for StepError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput => {
                StepError::Action(err.to_string())
            }
            _ => StepError::Transport(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for StepError {
    fn from(err: serde_json::Error) -> Self {
        StepError::Action(err.to_string())
    }
}

/// Errors that abort a whole workflow run.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Invalid workflow configuration: {0}")]
    Configuration(String),

    #[error("Step '{step_id}' failed: {source}")]
    Step {
        step_id: String,
        #[source]
        source: StepError,
    },

    #[error(transparent)]
    State(#[from] StateError),

    #[error("Cannot read workflow input {path}: {message}")]
    Input { path: String, message: String },
}

impl WorkflowError {
    /// The failing step, when the error came from one.
    pub fn step_id(&self) -> Option<&str> {
        match self {
            WorkflowError::Step { step_id, .. } => Some(step_id),
            _ => None,
        }
    }
}
