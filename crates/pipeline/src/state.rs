//! Persisted workflow state: one [`StepRecord`] per step id, versioned and
//! written atomically.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::StateError;

/// Current state schema. Changing a hash function is a version bump.
pub const SCHEMA_VERSION: &str = "1.0";

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

/// State of one step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub status: StepStatus,

    /// Fingerprint of the declared inputs of the last run. `None` for
    /// records synthesized from legacy state.
    #[serde(default)]
    pub input_hash: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub error: Option<String>,

    /// Paths or ids the step produced.
    #[serde(default)]
    pub outputs: Vec<String>,

    #[serde(default)]
    pub summary: Map<String, Value>,
}

impl StepRecord {
    pub fn is_completed(&self) -> bool {
        self.status == StepStatus::Completed
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateMeta {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StateMeta {
    fn now() -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            updated_at: now,
        }
    }
}

impl Default for StateMeta {
    fn default() -> Self {
        Self::now()
    }
}

/// The whole persisted document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub schema_version: String,

    #[serde(default)]
    pub meta: StateMeta,

    #[serde(default)]
    pub steps: BTreeMap<String, StepRecord>,

    /// The raw document a legacy state file was migrated from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legacy: Option<Value>,
}

impl Default for WorkflowState {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            meta: StateMeta::now(),
            steps: BTreeMap::new(),
            legacy: None,
        }
    }
}

impl WorkflowState {
    /// Read-only lookup; `None` for steps that never ran.
    pub fn step(&self, step_id: &str) -> Option<&StepRecord> {
        self.steps.get(step_id)
    }

    /// Record for `step_id`, inserting a pending record when absent.
    pub fn get_step(&mut self, step_id: &str) -> &mut StepRecord {
        self.steps.entry(step_id.to_string()).or_default()
    }

    /// Outputs recorded for `step_id`, empty when unknown.
    pub fn outputs_of(&self, step_id: &str) -> Vec<String> {
        self.step(step_id).map(|s| s.outputs.clone()).unwrap_or_default()
    }

    pub fn mark_step_running(&mut self, step_id: &str, input_hash: &str) {
        let step = self.get_step(step_id);
        step.status = StepStatus::Running;
        step.started_at = Some(Utc::now());
        step.completed_at = None;
        step.input_hash = Some(input_hash.to_string());
        step.error = None;
    }

    pub fn mark_step_completed(
        &mut self,
        step_id: &str,
        outputs: Option<Vec<String>>,
        summary: Option<Map<String, Value>>,
    ) {
        let step = self.get_step(step_id);
        step.status = StepStatus::Completed;
        step.completed_at = Some(Utc::now());
        if let Some(outputs) = outputs {
            step.outputs = outputs;
        }
        if let Some(summary) = summary {
            step.summary = summary;
        }
    }

    pub fn mark_step_failed(&mut self, step_id: &str, error: &str) {
        let step = self.get_step(step_id);
        step.status = StepStatus::Failed;
        step.completed_at = Some(Utc::now());
        step.error = Some(error.to_string());
    }

    /// Rewrite a flat legacy document (`{"converted": .., "variants": ..}`)
    /// into the versioned shape. Migrated steps are completed with a null
    /// input hash so the next run re-executes them.
    fn from_legacy(raw: Value) -> Self {
        let mut state = WorkflowState::default();
        let now = Utc::now();

        let legacy_step = |section: &Value, summary_key: &str| StepRecord {
            status: StepStatus::Completed,
            input_hash: None,
            completed_at: Some(now),
            outputs: section
                .get("outputs")
                .and_then(Value::as_array)
                .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
                .unwrap_or_default(),
            summary: Map::from_iter([(
                summary_key.to_string(),
                section.get(summary_key).cloned().unwrap_or(Value::Null),
            )]),
            ..StepRecord::default()
        };

        if let Some(section) = raw.get("converted") {
            state
                .steps
                .insert("convert_manifest".into(), legacy_step(section, "valid"));
        }
        if let Some(section) = raw.get("variants") {
            state
                .steps
                .insert("generate_variants".into(), legacy_step(section, "errors"));
        }

        state.legacy = Some(raw);
        state
    }
}

// ---------------------------------------------------------------------------
// ResumeManager
// ---------------------------------------------------------------------------

/// Loads and saves the state file at a fixed path.
#[derive(Debug, Clone)]
pub struct ResumeManager {
    path: PathBuf,
}

impl ResumeManager {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the state, migrating legacy shapes. A missing or non-object file
    /// yields a fresh state.
    pub fn load(&self) -> Result<WorkflowState, StateError> {
        if !self.path.exists() {
            return Ok(WorkflowState::default());
        }
        let raw: Value = serde_json::from_str(&fs::read_to_string(&self.path)?)?;
        if !raw.is_object() || raw.as_object().is_some_and(Map::is_empty) {
            return Ok(WorkflowState::default());
        }

        match raw.get("schema_version") {
            None => {
                tracing::info!(path = %self.path.display(), "Migrating legacy workflow state");
                Ok(WorkflowState::from_legacy(raw))
            }
            Some(Value::String(v)) if v == SCHEMA_VERSION => {
                let mut state: WorkflowState = serde_json::from_value(raw)?;
                state.meta.updated_at = Utc::now();
                Ok(state)
            }
            Some(other) => Err(StateError::UnsupportedSchema(match other {
                Value::String(s) => s.clone(),
                v => v.to_string(),
            })),
        }
    }

    /// Persist `state`, bumping `meta.updated_at`.
    ///
    /// The document is written to a sibling temp file and renamed over the
    /// target, so readers observe either the old or the new state.
    pub fn save(&self, state: &mut WorkflowState) -> Result<(), StateError> {
        state.schema_version = SCHEMA_VERSION.to_string();
        state.meta.updated_at = Utc::now();

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "workflow_state.json".to_string());
        let tmp = dir.join(format!(".{file_name}.{}.tmp", std::process::id()));

        let body = serde_json::to_vec_pretty(state)?;
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&body)?;
            file.sync_all()?;
        }
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
