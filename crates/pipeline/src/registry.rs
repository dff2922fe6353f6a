//! Step actions keyed by step id.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::StepError;
use crate::executor::StepOutput;
use crate::progress::ProgressTracker;
use crate::steps;

/// An action taking the step's declared inputs as JSON.
pub type ActionFn = Arc<dyn Fn(&Value, &ProgressTracker) -> Result<StepOutput, StepError> + Send + Sync>;

#[derive(Clone, Default)]
pub struct StepRegistry {
    actions: HashMap<String, ActionFn>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in action.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry
            .register(steps::CONVERT_MANIFEST, steps::convert::run)
            .register(steps::GAMMA_SYNC, steps::gamma::run)
            .register(steps::GENERATE_VARIANTS, steps::variants::run)
            .register(steps::AGENTS, steps::agents::run)
            .register(steps::QUALITY_CHECK, steps::quality::run)
            .register(steps::RENDER, steps::render::run);
        registry
    }

    /// Register a typed action. The declared inputs are deserialized into
    /// `I` before each call; a mismatch is a configuration error.
    pub fn register<I, F>(&mut self, id: &str, action: F) -> &mut Self
    where
        I: DeserializeOwned,
        F: Fn(I, &ProgressTracker) -> Result<StepOutput, StepError> + Send + Sync + 'static,
    {
        let step_id = id.to_string();
        self.register_raw(
            id,
            Arc::new(move |inputs: &Value, tracker: &ProgressTracker| {
                let typed: I = serde_json::from_value(inputs.clone()).map_err(|e| {
                    StepError::Configuration(format!("Invalid inputs for step '{step_id}': {e}"))
                })?;
                action(typed, tracker)
            }),
        )
    }

    /// Register (or replace) an action working on raw JSON inputs.
    pub fn register_raw(&mut self, id: &str, action: ActionFn) -> &mut Self {
        self.actions.insert(id.to_string(), action);
        self
    }

    pub fn get(&self, id: &str) -> Option<ActionFn> {
        self.actions.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.actions.contains_key(id)
    }
}

impl fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<&String> = self.actions.keys().collect();
        ids.sort();
        f.debug_struct("StepRegistry").field("actions", &ids).finish()
    }
}
