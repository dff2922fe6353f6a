//! Linear workflow over the fixed step set.
//!
//! Steps run strictly in order. Each step's declared inputs carry the
//! content hashes of what it reads plus, for dependent steps, the upstream
//! step's `input_hash`. Data flows between steps through the state: a step
//! reads its predecessors' recorded `outputs`, never in-memory results.

use std::path::Path;

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::config::WorkflowConfig;
use crate::error::WorkflowError;
use crate::executor::{StepExecutor, StepOutcome, StepSpec};
use crate::progress::ProgressTracker;
use crate::registry::StepRegistry;
use crate::state::{ResumeManager, WorkflowState};
use crate::steps::{
    self, agents::AgentsInput, convert::ConvertInput, gamma::GammaInput, quality::QualityInput,
    render::RenderInput, variants::VariantsInput, FileHash,
};

/// What a finished run hands back to its caller.
#[derive(Debug, Clone)]
pub struct WorkflowReport {
    pub state: WorkflowState,
    pub steps: Vec<StepOutcome>,
    /// `Some` when `quality_check` ran (or was skipped with a recorded verdict).
    pub gate_passed: Option<bool>,
    pub render_blocked: bool,
}

impl WorkflowReport {
    pub fn outcome(&self, step_id: &str) -> Option<&StepOutcome> {
        self.steps.iter().find(|s| s.step_id == step_id)
    }

    /// `{step_id: summary}` for every step that ran or was skipped.
    pub fn summary(&self) -> Value {
        let map: Map<String, Value> = self
            .steps
            .iter()
            .map(|s| {
                let mut summary = s.summary.clone();
                summary.insert("skipped".into(), json!(s.skipped));
                summary.entry("outputs").or_insert_with(|| json!(s.outputs.len()));
                (s.step_id.clone(), Value::Object(summary))
            })
            .collect();
        Value::Object(map)
    }
}

pub struct WorkflowOrchestrator {
    config: WorkflowConfig,
    registry: StepRegistry,
    executor: StepExecutor,
}

impl WorkflowOrchestrator {
    pub fn new(config: WorkflowConfig, registry: StepRegistry, tracker: ProgressTracker) -> Result<Self, WorkflowError> {
        config.validate()?;
        let executor = StepExecutor::new(
            ResumeManager::new(&config.resume_path),
            tracker,
            config.retry_policy(),
            config.force,
        );
        Ok(Self {
            config,
            registry,
            executor,
        })
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    fn tracker(&self) -> &ProgressTracker {
        self.executor.tracker()
    }

    /// Steps the current configuration enables, in execution order.
    pub fn planned_steps(&self) -> Vec<&'static str> {
        let c = &self.config;
        steps::STEP_ORDER
            .iter()
            .copied()
            .filter(|id| match *id {
                steps::GAMMA_SYNC => c.gamma_sync,
                steps::GENERATE_VARIANTS => c.generate_variants,
                steps::AGENTS => c.agents_enabled,
                steps::QUALITY_CHECK => c.quality_check,
                steps::RENDER => c.render,
                _ => true,
            })
            .collect()
    }

    fn run_step(&self, state: &mut WorkflowState, spec: StepSpec) -> Result<StepOutcome, WorkflowError> {
        let action = self.registry.get(&spec.id).ok_or_else(|| {
            WorkflowError::Configuration(format!("No action registered for step '{}'", spec.id))
        })?;
        let tracker = self.tracker();
        self.executor
            .run_sync(state, &spec, |inputs| action(inputs, tracker))
            .map_err(|source| WorkflowError::Step {
                step_id: spec.id.clone(),
                source,
            })
    }

    fn spec<T: Serialize>(id: &str, inputs: &T) -> Result<StepSpec, WorkflowError> {
        StepSpec::from_inputs(id, inputs).map_err(|source| WorkflowError::Step {
            step_id: id.to_string(),
            source,
        })
    }

    fn project_init_hash(&self) -> Option<String> {
        self.config.existing_project_init().and_then(|p| FileHash::of(p).hash)
    }

    fn hashes(paths: &[String]) -> Vec<FileHash> {
        paths.iter().map(|p| FileHash::of(Path::new(p))).collect()
    }

    /// Quality and render read the variants when they were generated,
    /// otherwise the converted layouts. Returns the paths and the input
    /// hash of the step that produced them.
    fn targets(
        &self,
        state: &WorkflowState,
        layouts: &[String],
        convert_hash: &Option<String>,
        on_variants: bool,
    ) -> (Vec<String>, Option<String>) {
        if self.config.generate_variants && on_variants {
            (
                state.outputs_of(steps::GENERATE_VARIANTS),
                input_hash_of(state, steps::GENERATE_VARIANTS),
            )
        } else {
            (layouts.to_vec(), convert_hash.clone())
        }
    }

    /// Run every enabled step and persist the final state.
    pub fn run(&self) -> Result<WorkflowReport, WorkflowError> {
        let c = &self.config;
        let resume = self.executor.resume();
        let mut state = resume.load()?;
        let planned = self.planned_steps();
        let project_init = c.existing_project_init().map(Path::to_path_buf);
        let project_init_hash = self.project_init_hash();

        tracing::info!(steps = ?planned, force = c.force, "Starting workflow");
        self.tracker().emit(
            "workflow.start",
            json!({ "steps": planned, "force": c.force }),
        );

        let mut outcomes = Vec::new();

        // convert_manifest
        let convert = ConvertInput::new(&c.manifest_path, &c.pptx_root, &c.layout_out, project_init.as_deref())
            .map_err(|source| WorkflowError::Step {
                step_id: steps::CONVERT_MANIFEST.into(),
                source,
            })?;
        let manifest_hash = convert.manifest_hash.clone();
        outcomes.push(self.run_step(&mut state, Self::spec(steps::CONVERT_MANIFEST, &convert)?)?);
        let layouts = state.outputs_of(steps::CONVERT_MANIFEST);
        let convert_hash = input_hash_of(&state, steps::CONVERT_MANIFEST);

        // gamma_sync
        if c.gamma_sync {
            let png_dir = c.gamma_png_dir.as_deref().ok_or_else(|| {
                WorkflowError::Configuration("gamma_sync requires gamma_png_dir".into())
            })?;
            let input = GammaInput::new(
                &c.manifest_path,
                manifest_hash,
                &c.pptx_root,
                png_dir,
                &c.gamma_crops_out,
                &c.gamma_crop_kinds,
                c.crop,
            );
            outcomes.push(self.run_step(&mut state, Self::spec(steps::GAMMA_SYNC, &input)?)?);
        }

        // generate_variants
        if c.generate_variants {
            let attach = c.gamma_attach_to_variants;
            let input = VariantsInput {
                step: steps::GENERATE_VARIANTS.into(),
                layouts: Self::hashes(&layouts),
                upstream_input_hash: convert_hash.clone(),
                variants_out: c.variants_out.clone(),
                project_init: project_init.clone(),
                project_init_hash: project_init_hash.clone(),
                attach_gamma: attach,
                attach_kinds: if attach { c.gamma_attach_kinds.clone() } else { Vec::new() },
                gamma_crops: if attach { state.outputs_of(steps::GAMMA_SYNC) } else { Vec::new() },
                gamma_input_hash: if attach { input_hash_of(&state, steps::GAMMA_SYNC) } else { None },
            };
            outcomes.push(self.run_step(&mut state, Self::spec(steps::GENERATE_VARIANTS, &input)?)?);
        }

        // agents
        if c.agents_enabled {
            let input = AgentsInput {
                agent_steps: c.agent_steps.clone(),
                agent_seed: c.agent_seed,
                agent_version: c.agent_version.clone(),
                simulate: c.agent_simulate,
                project_init: project_init.clone(),
                project_init_hash: project_init_hash.clone(),
                ..AgentsInput::new(Self::hashes(&layouts), c.agents_out.clone())
            };
            outcomes.push(self.run_step(&mut state, Self::spec(steps::AGENTS, &input)?)?);
        }

        let mut gate_passed = None;
        if c.quality_check {
            let (targets, upstream) = self.targets(&state, &layouts, &convert_hash, c.quality_on_variants);
            let input = QualityInput {
                step: steps::QUALITY_CHECK.into(),
                paths: Self::hashes(&targets),
                upstream_input_hash: upstream,
                quality_out: c.quality_out.clone(),
                checks: c.quality_checks.clone(),
                on_variants: c.quality_on_variants,
                project_init: project_init.clone(),
                project_init_hash: project_init_hash.clone(),
            };
            let outcome = self.run_step(&mut state, Self::spec(steps::QUALITY_CHECK, &input)?)?;
            gate_passed = outcome.summary.get("gate_passed").and_then(Value::as_bool);
            outcomes.push(outcome);
        }

        let mut render_blocked = false;
        if c.render {
            if gate_passed == Some(false) {
                render_blocked = true;
                tracing::warn!("Quality gate failed, render not invoked");
                self.tracker().emit_step("render.blocked", steps::RENDER, json!({ "reason": "quality gate failed" }));
            } else {
                let (targets, upstream) = self.targets(&state, &layouts, &convert_hash, c.render_on_variants);
                let input = RenderInput {
                    upstream_input_hash: upstream,
                    pdf: c.render_pdf,
                    png: c.render_png,
                    on_variants: c.render_on_variants,
                    project_init_hash: project_init_hash.clone(),
                    ..RenderInput::new(Self::hashes(&targets), c.render_out.clone())
                };
                outcomes.push(self.run_step(&mut state, Self::spec(steps::RENDER, &input)?)?);
            }
        }

        resume.save(&mut state)?;

        let report = WorkflowReport {
            state,
            steps: outcomes,
            gate_passed,
            render_blocked,
        };
        self.tracker().emit(
            "workflow.done",
            json!({ "steps": report.summary(), "gate_passed": gate_passed, "render_blocked": render_blocked }),
        );
        tracing::info!(steps = report.steps.len(), "Workflow finished");
        Ok(report)
    }
}

fn input_hash_of(state: &WorkflowState, step_id: &str) -> Option<String> {
    state.step(step_id).and_then(|r| r.input_hash.clone())
}
