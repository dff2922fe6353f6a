//! `quality_check`: preflight, page bounds, quality gate and heuristics for
//! every target layout, collected into `quality_report.json`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use pressline_core::heuristics::run_heuristic_checks;
use pressline_core::layout::{self, mm_to_px};
use pressline_core::preflight::{check_page_bounds, run_preflight};
use pressline_core::project_config::ProjectConfig;
use pressline_core::quality_gate::run_gate;

use super::{read_json, write_json, FileHash};
use crate::error::StepError;
use crate::executor::StepOutput;
use crate::progress::ProgressTracker;

pub const REPORT_FILE: &str = "quality_report.json";

pub const CHECK_PREFLIGHT: &str = "preflight";
pub const CHECK_AMAZON: &str = "amazon";

const MAX_REPORTED_ERRORS: usize = 50;

/// Declared inputs of `quality_check`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityInput {
    pub step: String,
    pub paths: Vec<FileHash>,
    pub upstream_input_hash: Option<String>,
    pub quality_out: PathBuf,
    pub checks: Vec<String>,
    pub on_variants: bool,
    pub project_init: Option<PathBuf>,
    pub project_init_hash: Option<String>,
}

fn capped(errors: Vec<String>) -> Vec<String> {
    errors.into_iter().take(MAX_REPORTED_ERRORS).collect()
}

/// Evaluate one descriptor. Returns the report entry and the gate verdict.
pub fn check_layout(path: &str, doc: &Value, checks: &[String], project: &ProjectConfig) -> (Value, bool) {
    let mut entry = json!({ "path": path });
    let enabled = |name: &str| checks.iter().any(|c| c == name);

    if enabled(CHECK_PREFLIGHT) {
        let outcome = run_preflight(doc, &[]);
        entry["preflight_valid"] = json!(outcome.is_valid());
        entry["preflight_errors"] = json!(capped(outcome.errors));
    }
    if enabled(CHECK_AMAZON) {
        let (_, _, dpi) = layout::document_dims(doc);
        let margin = mm_to_px(project.amazon_safety_margin_mm(), dpi);
        let outcome = check_page_bounds(doc, margin);
        entry["amazon_valid"] = json!(outcome.is_valid());
        entry["amazon_errors"] = json!(capped(outcome.errors));
    }

    let gate = run_gate(doc, project);
    let passed = gate.passed;
    entry["gate"] = json!(gate);
    entry["heuristics"] = json!(run_heuristic_checks(doc, &project.heuristic_config()));
    (entry, passed)
}

pub fn run(input: QualityInput, tracker: &ProgressTracker) -> Result<StepOutput, StepError> {
    let project = ProjectConfig::load_optional(input.project_init.as_deref())
        .map_err(|e| StepError::Configuration(e.to_string()))?;

    tracker.emit(
        "quality.start",
        json!({ "files": input.paths.len(), "checks": input.checks, "on_variants": input.on_variants }),
    );

    let mut files = Vec::new();
    let mut gate_passed = true;
    let mut failed_files = 0usize;

    for source in &input.paths {
        let doc = match read_json(&source.path_buf()) {
            Ok(doc) => doc,
            Err(e) => {
                gate_passed = false;
                failed_files += 1;
                files.push(json!({ "path": source.path, "error": e.to_string() }));
                continue;
            }
        };
        let (entry, passed) = check_layout(&source.path, &doc, &input.checks, &project);
        if !passed {
            gate_passed = false;
            failed_files += 1;
        }
        files.push(entry);
    }

    let report_path = input.quality_out.join(REPORT_FILE);
    let report = json!({
        "checks": input.checks,
        "gate_passed": gate_passed,
        "files": files,
    });
    write_json(&report_path, &report)?;

    if !gate_passed {
        tracing::warn!(failed_files, "Quality gate failed");
    }
    tracker.emit(
        "quality.done",
        json!({ "files": files.len(), "gate_passed": gate_passed, "report_path": report_path.to_string_lossy() }),
    );

    Ok(StepOutput::new(vec![report_path.to_string_lossy().into_owned()])
        .with_summary(json!({ "outputs": 1, "errors": failed_files, "gate_passed": gate_passed }))
        .with_report(report))
}
