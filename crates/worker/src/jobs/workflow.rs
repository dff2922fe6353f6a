//! Workflow jobs: bundle in, orchestrator run, report zip out.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};

use pressline_core::ids::to_hex;
use pressline_core::kinds::ArtifactKind;
use pressline_core::types::DbId;
use pressline_db::models::job::Job;
use pressline_db::models::status::LogLevel;
use pressline_db::repositories::{ArtifactRepo, JobRepo};
use pressline_pipeline::{ProgressTracker, StepRegistry, WorkflowConfig, WorkflowOrchestrator, WorkflowReport};

use super::{attempt_tag, correlation_id, emit_job_event};
use crate::bundle::{extract_bundle, zip_tree, ExtractedBundle, GAMMA_DIR};
use crate::context::WorkerContext;
use crate::error::JobError;

/// Subdirectory of the job directory holding the unpacked bundle. Left out
/// of the report.
pub const BUNDLE_DIR: &str = "bundle";

/// Overrides accepted in the job metadata under `options`. Anything left
/// unset keeps the [`WorkflowConfig`] default.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WorkflowOptions {
    pub generate_variants: Option<bool>,
    pub gamma_sync: Option<bool>,
    pub gamma_crop_kinds: Option<Vec<String>>,
    pub gamma_attach_to_variants: Option<bool>,
    pub gamma_attach_kinds: Option<Vec<String>>,
    pub quality_check: Option<bool>,
    pub quality_on_variants: Option<bool>,
    pub quality_checks: Option<Vec<String>>,
    pub render: Option<bool>,
    pub render_on_variants: Option<bool>,
    pub render_pdf: Option<bool>,
    pub render_png: Option<bool>,
    pub agents_enabled: Option<bool>,
    pub agent_steps: Option<Vec<String>>,
    pub agent_seed: Option<u64>,
    pub agent_version: Option<String>,
    pub agent_simulate: Option<bool>,
    pub force: Option<bool>,
    pub retry_max: Option<u32>,
}

impl WorkflowOptions {
    /// Parse `metadata.options`; a missing key means no overrides.
    pub fn from_metadata(metadata: &Value) -> Result<Self, JobError> {
        match metadata.get("options") {
            None | Some(Value::Null) => Ok(Self::default()),
            Some(options) => serde_json::from_value(options.clone())
                .map_err(|e| JobError::InvalidJob(format!("invalid workflow options: {e}"))),
        }
    }

    /// Build the run configuration: outputs under `work_dir`, inputs from
    /// the extracted bundle.
    pub fn to_config(&self, work_dir: &Path, bundle: &ExtractedBundle, default_retry_max: u32) -> WorkflowConfig {
        let base = WorkflowConfig::rooted_at(work_dir);
        self.apply(WorkflowConfig {
            manifest_path: bundle.manifest(),
            pptx_root: bundle.root.clone(),
            project_init: bundle.project_init(),
            gamma_png_dir: bundle.gamma_dir(),
            retry_max: default_retry_max,
            ..base
        })
    }

    /// Reject flag combinations the orchestrator would refuse, knowing only
    /// whether the bundle ships a gamma directory.
    pub fn check(&self, has_gamma_dir: bool) -> Result<(), JobError> {
        let cfg = self.apply(WorkflowConfig {
            gamma_png_dir: has_gamma_dir.then(|| PathBuf::from(GAMMA_DIR)),
            ..WorkflowConfig::default()
        });
        cfg.validate()?;
        Ok(())
    }

    fn apply(&self, mut cfg: WorkflowConfig) -> WorkflowConfig {
        macro_rules! set_if_present {
            ($($field:ident),+ $(,)?) => {
                $( if let Some(value) = self.$field.clone() { cfg.$field = value; } )+
            };
        }
        set_if_present!(
            generate_variants,
            gamma_sync,
            gamma_crop_kinds,
            gamma_attach_to_variants,
            gamma_attach_kinds,
            quality_check,
            quality_on_variants,
            quality_checks,
            render,
            render_on_variants,
            render_pdf,
            render_png,
            agents_enabled,
            agent_steps,
            agent_version,
            agent_simulate,
            force,
            retry_max,
        );
        if self.agent_seed.is_some() {
            cfg.agent_seed = self.agent_seed;
        }
        cfg
    }
}

pub fn job_dir(work_root: &Path, job_id: DbId) -> PathBuf {
    work_root.join(to_hex(job_id))
}

pub fn report_file_name(job_id: DbId, attempt: &str) -> String {
    format!("workflow_report_{}_{attempt}.zip", to_hex(job_id))
}

pub async fn run(ctx: &WorkerContext, job: &Job) -> Result<(), JobError> {
    if !JobRepo::mark_running(&ctx.pool, job.id).await? {
        tracing::info!(job_id = %job.id, "Job no longer runnable");
        return Ok(());
    }
    ctx.job_log(job.id, LogLevel::Info, "Workflow started", None).await;

    let options = WorkflowOptions::from_metadata(&job.metadata)?;
    let input_id = job
        .input_artifact_id
        .ok_or_else(|| JobError::InvalidJob("workflow job has no bundle artifact".into()))?;
    let input = ArtifactRepo::find_by_id(&ctx.pool, input_id)
        .await?
        .ok_or_else(|| JobError::InvalidJob(format!("bundle artifact {input_id} not found")))?;
    let data = ctx.fetch_artifact(&input).await?;

    let work_dir = job_dir(&ctx.config.work_dir, job.id);
    let tracker = ProgressTracker::new()
        .with_bus(Arc::clone(&ctx.bus))
        .with_correlation_id(correlation_id(job).map(str::to_string));
    let retry_max = ctx.config.workflow_retry_max;

    let (report, archive) = {
        let work_dir = work_dir.clone();
        tokio::task::spawn_blocking(move || run_blocking(&work_dir, &data, &options, retry_max, tracker))
            .await
            .map_err(|e| JobError::Render(format!("workflow task aborted: {e}")))??
    };

    let artifact = ctx
        .store_artifact(
            archive,
            ArtifactKind::WorkflowReport,
            &report_file_name(job.id, &attempt_tag()),
            json!({ "job_id": job.id, "gate_passed": report.gate_passed }),
        )
        .await?;
    JobRepo::complete(&ctx.pool, job.id, Some(artifact.id)).await?;

    let summary = json!({
        "report_artifact_id": artifact.id,
        "steps": report.summary(),
        "gate_passed": report.gate_passed,
        "render_blocked": report.render_blocked,
    });
    let level = if report.render_blocked { LogLevel::Warn } else { LogLevel::Info };
    ctx.job_log(job.id, level, "Workflow finished", Some(summary.clone())).await;
    emit_job_event(ctx, job, "job.workflow.completed", summary);
    Ok(())
}

/// Extraction, orchestration and packaging. Runs on the blocking pool.
fn run_blocking(
    work_dir: &Path,
    data: &[u8],
    options: &WorkflowOptions,
    retry_max: u32,
    tracker: ProgressTracker,
) -> Result<(WorkflowReport, Vec<u8>), JobError> {
    let bundle = extract_bundle(data, &work_dir.join(BUNDLE_DIR))?;
    let config = options.to_config(work_dir, &bundle, retry_max);
    let report = WorkflowOrchestrator::new(config, StepRegistry::with_builtin(), tracker)?.run()?;
    let archive = zip_tree(work_dir, &[BUNDLE_DIR])?;
    Ok((report, archive))
}
