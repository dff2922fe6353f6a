use pressline_pipeline::{StepError, WorkflowError};

/// Process exit codes.
pub const EXIT_OK: u8 = 0;
pub const EXIT_INVALID: u8 = 2;
pub const EXIT_FAILED: u8 = 3;

/// Errors that end a command early.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Malformed input: unreadable JSON, schema errors, bad flag combinations.
    #[error("{0}")]
    Invalid(String),

    #[error(transparent)]
    Step(#[from] StepError),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::Invalid(_) => EXIT_INVALID,
            CliError::Workflow(WorkflowError::Configuration(_)) => EXIT_INVALID,
            CliError::Step(StepError::Configuration(_)) => EXIT_INVALID,
            CliError::Workflow(_) | CliError::Step(_) | CliError::Io(_) => EXIT_FAILED,
        }
    }
}
