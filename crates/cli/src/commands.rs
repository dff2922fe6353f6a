//! Subcommand implementations. Each returns an [`Outcome`] whose report is
//! printed by `main`; hard failures come back as [`CliError`].

use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};

use pressline_core::layout::validate_descriptor;
use pressline_core::project_config::{default_project_init, ProjectConfig};
use pressline_core::quality_gate::run_gate;
use pressline_pipeline::steps::convert::{self, convert_extracted, ConvertInput, ConvertOptions};
use pressline_pipeline::steps::gamma::{self, GammaInput, KIND_IMAGE_BOX, KIND_INFOBOX};
use pressline_pipeline::steps::{read_json, write_json, FileHash};
use pressline_pipeline::{ProgressTracker, StepRegistry, WorkflowOrchestrator};

use crate::args::{
    Command, ConvertManifestArgs, ConvertOneArgs, CropArgs, ExportProjectInitArgs, RunArgs, ValidateArgs,
};
use crate::error::{CliError, EXIT_INVALID, EXIT_OK};

/// Result of a command that ran to completion.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub exit_code: u8,
    pub report: Value,
}

impl Outcome {
    fn ok(report: Value) -> Self {
        Self {
            exit_code: EXIT_OK,
            report,
        }
    }

    fn invalid_if(failed: bool, report: Value) -> Self {
        Self {
            exit_code: if failed { EXIT_INVALID } else { EXIT_OK },
            report,
        }
    }
}

pub fn execute(command: &Command) -> Result<Outcome, CliError> {
    match command {
        Command::ConvertOne(args) => convert_one(args),
        Command::ConvertManifest(args) => convert_manifest(args, &progress_tracker()),
        Command::Crop(args) => crop(args, &progress_tracker()),
        Command::Run(args) => run(args, progress_tracker()),
        Command::Validate(args) => validate(args),
        Command::ExportProjectInit(args) => export_project_init(args),
    }
}

/// Progress events go to the log.
pub fn progress_tracker() -> ProgressTracker {
    ProgressTracker::new().with_callback(Arc::new(|message: &Value| {
        let event = message.get("event").and_then(Value::as_str).unwrap_or("progress");
        tracing::info!(event, payload = %message, "Progress");
    }))
}

fn read_input(path: &Path) -> Result<Value, CliError> {
    read_json(path).map_err(|e| CliError::Invalid(format!("Cannot read {}: {e}", path.display())))
}

fn require_file(path: &Path, what: &str) -> Result<(), CliError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(CliError::Invalid(format!("{what} not found: {}", path.display())))
    }
}

// ---------------------------------------------------------------------------
// Conversion
// ---------------------------------------------------------------------------

pub fn convert_one(args: &ConvertOneArgs) -> Result<Outcome, CliError> {
    let extracted = read_input(&args.input)?;
    let doc = convert_extracted(&extracted, &ConvertOptions::default());
    write_json(&args.out, &doc)?;

    let errors: Vec<String> = validate_descriptor(&doc).iter().map(ToString::to_string).collect();
    let pages = doc["pages"].as_array().map_or(0, Vec::len);
    tracing::info!(out = %args.out.display(), pages, errors = errors.len(), "Converted deck");

    Ok(Outcome::invalid_if(
        !errors.is_empty(),
        json!({
            "out": args.out.to_string_lossy(),
            "pages": pages,
            "valid": errors.is_empty(),
            "errors": errors,
        }),
    ))
}

pub fn convert_manifest(args: &ConvertManifestArgs, tracker: &ProgressTracker) -> Result<Outcome, CliError> {
    require_file(&args.manifest, "Manifest")?;
    if let Some(project_init) = &args.project_init {
        require_file(project_init, "Project configuration")?;
    }

    let input = ConvertInput::new(&args.manifest, &args.pptx_root, &args.out, args.project_init.as_deref())?;
    let output = convert::run(input, tracker)?;
    let invalid = output.summary.get("invalid").and_then(Value::as_u64).unwrap_or(0);

    Ok(Outcome::invalid_if(invalid > 0, output.report))
}

pub fn crop(args: &CropArgs, tracker: &ProgressTracker) -> Result<Outcome, CliError> {
    require_file(&args.manifest, "Manifest")?;
    if let Some(kind) = args.kinds.iter().find(|k| *k != KIND_INFOBOX && *k != KIND_IMAGE_BOX) {
        return Err(CliError::Invalid(format!(
            "Unknown crop kind '{kind}', expected {KIND_INFOBOX} or {KIND_IMAGE_BOX}"
        )));
    }

    let input = GammaInput::new(
        &args.manifest,
        FileHash::of(&args.manifest).hash,
        &args.pptx_root,
        &args.gamma_dir,
        &args.out,
        &args.kinds,
        args.crop.params(),
    );
    let output = gamma::run(input, tracker)?;
    Ok(Outcome::ok(output.report))
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// A failing quality gate exits 2 even though the run itself completed.
pub fn run(args: &RunArgs, tracker: ProgressTracker) -> Result<Outcome, CliError> {
    let config = args.to_config();
    require_file(&config.manifest_path, "Manifest")?;

    let orchestrator = WorkflowOrchestrator::new(config, StepRegistry::with_builtin(), tracker)?;
    let report = orchestrator.run()?;

    Ok(Outcome::invalid_if(
        report.gate_passed == Some(false),
        json!({
            "steps": report.summary(),
            "gate_passed": report.gate_passed,
            "render_blocked": report.render_blocked,
            "state_file": orchestrator.config().resume_path.to_string_lossy(),
        }),
    ))
}

// ---------------------------------------------------------------------------
// Validation and project configuration
// ---------------------------------------------------------------------------

pub fn validate(args: &ValidateArgs) -> Result<Outcome, CliError> {
    let project = ProjectConfig::load_optional(args.project_init.as_deref())
        .map_err(|e| CliError::Invalid(e.to_string()))?;

    let mut all_passed = true;
    let mut files = Vec::with_capacity(args.layouts.len());
    for path in &args.layouts {
        let entry = match read_input(path) {
            Ok(doc) => {
                let schema_errors: Vec<String> = validate_descriptor(&doc).iter().map(ToString::to_string).collect();
                let gate = run_gate(&doc, &project);
                let passed = schema_errors.is_empty() && gate.passed;
                all_passed &= passed;
                json!({
                    "path": path.to_string_lossy(),
                    "passed": passed,
                    "schema_errors": schema_errors,
                    "gate": gate,
                })
            }
            Err(e) => {
                all_passed = false;
                json!({
                    "path": path.to_string_lossy(),
                    "passed": false,
                    "schema_errors": [e.to_string()],
                })
            }
        };
        files.push(entry);
    }

    tracing::info!(files = files.len(), passed = all_passed, "Validation finished");
    Ok(Outcome::invalid_if(!all_passed, json!({ "passed": all_passed, "files": files })))
}

pub fn export_project_init(args: &ExportProjectInitArgs) -> Result<Outcome, CliError> {
    if args.out.exists() && !args.force {
        return Err(CliError::Invalid(format!(
            "{} already exists, pass --force to replace it",
            args.out.display()
        )));
    }
    write_json(&args.out, &default_project_init())?;
    Ok(Outcome::ok(json!({ "out": args.out.to_string_lossy() })))
}
