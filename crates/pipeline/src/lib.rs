//! Resumable, content-addressed workflow execution.
//!
//! [`WorkflowOrchestrator`] runs the fixed step set through a
//! [`StepExecutor`], which skips steps whose declared inputs are unchanged
//! and persists [`WorkflowState`] after every transition.

pub mod config;
pub mod error;
pub mod executor;
pub mod orchestrator;
pub mod preview;
pub mod progress;
pub mod registry;
pub mod retry;
pub mod sla;
pub mod state;
pub mod steps;

pub use config::{CropParams, WorkflowConfig};
pub use error::{StateError, StepError, WorkflowError};
pub use executor::{promote, StepExecutor, StepOutcome, StepOutput, StepSpec};
pub use orchestrator::{WorkflowOrchestrator, WorkflowReport};
pub use progress::{EventLog, ProgressCallback, ProgressTracker};
pub use registry::{ActionFn, StepRegistry};
pub use retry::RetryPolicy;
pub use state::{ResumeManager, StepRecord, StepStatus, WorkflowState, SCHEMA_VERSION};
