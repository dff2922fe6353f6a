//! Idempotent execution of a single step.
//!
//! A step is skipped when its last run completed with the same input hash
//! and every recorded output still exists. Otherwise it is marked running,
//! persisted, and its action is invoked under the retry policy. The
//! synchronous and asynchronous surfaces share [`StepExecutor::begin`] and
//! [`StepExecutor::finish`].

use std::future::Future;
use std::path::Path;

use serde::Serialize;
use serde_json::{json, Map, Value};

use pressline_core::hashing::hash_inputs;

use crate::error::StepError;
use crate::progress::ProgressTracker;
use crate::retry::RetryPolicy;
use crate::state::{ResumeManager, WorkflowState};

// ---------------------------------------------------------------------------
// Step description and results
// ---------------------------------------------------------------------------

/// One step invocation: a stable id plus the declared inputs that feed the
/// skip decision.
#[derive(Debug, Clone, PartialEq)]
pub struct StepSpec {
    pub id: String,
    pub inputs: Value,
}

impl StepSpec {
    pub fn new(id: impl Into<String>, inputs: Value) -> Self {
        Self {
            id: id.into(),
            inputs,
        }
    }

    /// Build from any serializable input struct.
    pub fn from_inputs<T: Serialize>(id: &str, inputs: &T) -> Result<Self, StepError> {
        Ok(Self::new(id, serde_json::to_value(inputs)?))
    }

    pub fn input_hash(&self) -> String {
        hash_inputs(&self.inputs)
    }
}

/// What an action returns.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StepOutput {
    /// Concrete paths or ids produced, checked by the skip rule.
    pub outputs: Vec<String>,
    pub summary: Map<String, Value>,
    /// Full action report, not persisted in state.
    pub report: Value,
}

impl StepOutput {
    pub fn new(outputs: Vec<String>) -> Self {
        Self {
            outputs,
            ..Self::default()
        }
    }

    pub fn with_summary(mut self, summary: Value) -> Self {
        if let Value::Object(map) = summary {
            self.summary = map;
        }
        self
    }

    pub fn with_report(mut self, report: Value) -> Self {
        self.report = report;
        self
    }
}

/// Result of running (or skipping) a step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub step_id: String,
    pub skipped: bool,
    pub outputs: Vec<String>,
    pub summary: Map<String, Value>,
    pub report: Value,
}

enum Plan {
    Skip(StepOutcome),
    Run,
}

/// Outputs that parse as ids are not filesystem paths.
fn output_exists(output: &str) -> bool {
    pressline_core::ids::from_hex(output).is_ok() || Path::new(output).exists()
}

/// Promote a synchronous action to the asynchronous surface.
pub fn promote<F>(mut action: F) -> impl FnMut(Value) -> std::future::Ready<Result<StepOutput, StepError>>
where
    F: FnMut(&Value) -> Result<StepOutput, StepError>,
{
    move |inputs: Value| std::future::ready(action(&inputs))
}

// ---------------------------------------------------------------------------
// StepExecutor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct StepExecutor {
    resume: ResumeManager,
    tracker: ProgressTracker,
    retry: RetryPolicy,
    force: bool,
}

impl StepExecutor {
    pub fn new(resume: ResumeManager, tracker: ProgressTracker, retry: RetryPolicy, force: bool) -> Self {
        Self {
            resume,
            tracker,
            retry,
            force,
        }
    }

    pub fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }

    pub fn resume(&self) -> &ResumeManager {
        &self.resume
    }

    /// The skip rule. `force` disables it for every step.
    pub fn should_skip(&self, state: &WorkflowState, step_id: &str, input_hash: &str) -> bool {
        if self.force {
            return false;
        }
        let Some(record) = state.step(step_id) else {
            return false;
        };
        record.is_completed()
            && record.input_hash.as_deref() == Some(input_hash)
            && record.outputs.iter().all(|p| output_exists(p))
    }

    fn begin(&self, state: &mut WorkflowState, spec: &StepSpec) -> Result<Plan, StepError> {
        let input_hash = spec.input_hash();

        if self.should_skip(state, &spec.id, &input_hash) {
            tracing::info!(step_id = %spec.id, "Step inputs unchanged, skipping");
            self.tracker.emit_step("step.skipped", &spec.id, Value::Null);
            let record = state.get_step(&spec.id);
            return Ok(Plan::Skip(StepOutcome {
                step_id: spec.id.clone(),
                skipped: true,
                outputs: record.outputs.clone(),
                summary: record.summary.clone(),
                report: Value::Null,
            }));
        }

        if state.step(&spec.id).is_some_and(|r| r.is_completed()) {
            tracing::info!(step_id = %spec.id, "Step inputs changed, re-running");
        }

        state.mark_step_running(&spec.id, &input_hash);
        self.resume.save(state)?;
        tracing::info!(step_id = %spec.id, input_hash = %input_hash, "Starting step");
        self.tracker.emit_step("step.started", &spec.id, Value::Null);
        Ok(Plan::Run)
    }

    fn finish(
        &self,
        state: &mut WorkflowState,
        spec: &StepSpec,
        result: Result<StepOutput, StepError>,
    ) -> Result<StepOutcome, StepError> {
        match result {
            Ok(output) => {
                state.mark_step_completed(
                    &spec.id,
                    Some(output.outputs.clone()),
                    Some(output.summary.clone()),
                );
                self.resume.save(state)?;
                tracing::info!(step_id = %spec.id, outputs = output.outputs.len(), "Step completed");
                self.tracker.emit_step(
                    "step.completed",
                    &spec.id,
                    json!({ "outputs": output.outputs.len() }),
                );
                Ok(StepOutcome {
                    step_id: spec.id.clone(),
                    skipped: false,
                    outputs: output.outputs,
                    summary: output.summary,
                    report: output.report,
                })
            }
            Err(err) => {
                let message = err.to_string();
                tracing::error!(step_id = %spec.id, error = %message, "Step failed");
                state.mark_step_failed(&spec.id, &message);
                if let Err(save_err) = self.resume.save(state) {
                    tracing::warn!(step_id = %spec.id, error = %save_err, "Could not persist step failure");
                }
                self.tracker
                    .emit_step("step.failed", &spec.id, json!({ "error": message }));
                Err(err)
            }
        }
    }

    fn log_retry(&self, spec: &StepSpec, attempt: u32, err: &StepError) {
        tracing::warn!(
            step_id = %spec.id,
            attempt = attempt + 1,
            transient = err.is_transient(),
            error = %err,
            "Step attempt failed, retrying",
        );
    }

    /// Run a step with a blocking action. Used by the linear orchestrator.
    pub fn run_sync<F>(
        &self,
        state: &mut WorkflowState,
        spec: &StepSpec,
        mut action: F,
    ) -> Result<StepOutcome, StepError>
    where
        F: FnMut(&Value) -> Result<StepOutput, StepError>,
    {
        if let Plan::Skip(outcome) = self.begin(state, spec)? {
            return Ok(outcome);
        }

        let mut attempt = 0;
        let result = loop {
            match action(&spec.inputs) {
                Ok(output) => break Ok(output),
                Err(err) if attempt < self.retry.max_retries => {
                    self.log_retry(spec, attempt, &err);
                    std::thread::sleep(self.retry.delay_after(attempt));
                    attempt += 1;
                }
                Err(err) => break Err(err),
            }
        };

        self.finish(state, spec, result)
    }

    /// Run a step with an awaitable action.
    pub async fn run_async<F, Fut>(
        &self,
        state: &mut WorkflowState,
        spec: &StepSpec,
        mut action: F,
    ) -> Result<StepOutcome, StepError>
    where
        F: FnMut(Value) -> Fut,
        Fut: Future<Output = Result<StepOutput, StepError>>,
    {
        if let Plan::Skip(outcome) = self.begin(state, spec)? {
            return Ok(outcome);
        }

        let mut attempt = 0;
        let result = loop {
            match action(spec.inputs.clone()).await {
                Ok(output) => break Ok(output),
                Err(err) if attempt < self.retry.max_retries => {
                    self.log_retry(spec, attempt, &err);
                    tokio::time::sleep(self.retry.delay_after(attempt)).await;
                    attempt += 1;
                }
                Err(err) => break Err(err),
            }
        };

        self.finish(state, spec, result)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
