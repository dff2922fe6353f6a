//! End-to-end tests for the `pressline` subcommands, driven through the
//! same argument parser the binary uses.

use std::fs;
use std::path::Path;

use assert_matches::assert_matches;
use clap::Parser;
use serde_json::{json, Value};
use tempfile::TempDir;

use pressline_cli::{execute, Cli, CliError, Outcome};

fn run_cli(args: &[&str]) -> Result<Outcome, CliError> {
    let cli = Cli::try_parse_from(std::iter::once("pressline").chain(args.iter().copied())).unwrap();
    execute(&cli.command)
}

fn write(path: &Path, value: &Value) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, serde_json::to_vec_pretty(value).unwrap()).unwrap();
}

fn read(path: &Path) -> Value {
    serde_json::from_slice(&fs::read(path).unwrap()).unwrap()
}

/// A text-only deck: converts cleanly and passes the default quality gate.
fn deck() -> Value {
    json!({
        "name": "intro",
        "source": "intro.pptx",
        "slides": [
            {"slide": 1, "text_boxes": [
                {"role": "title", "text": "Welcome", "rel_bbox": [0.1, 0.05, 0.9, 0.15]},
                {"text": "First page body", "rel_bbox": [0.1, 0.2, 0.9, 0.6]}
            ]},
            {"slide": 2, "text_boxes": [
                {"text": "Second page body", "rel_bbox": [0.1, 0.2, 0.9, 0.6]}
            ]}
        ]
    })
}

/// `<root>/pptx/manifest.json` listing one extracted deck.
fn source_tree(root: &Path) -> std::path::PathBuf {
    let pptx = root.join("pptx");
    write(&pptx.join("json/intro.json"), &deck());
    write(
        &pptx.join("manifest.json"),
        &json!({"files": [{"name": "intro", "json": "json\\intro.json"}]}),
    );
    pptx
}

fn s(path: &Path) -> &str {
    path.to_str().unwrap()
}

// ---------------------------------------------------------------------------
// convert-one / convert-manifest
// ---------------------------------------------------------------------------

#[test]
fn convert_one_writes_a_valid_descriptor() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("intro.json");
    let out = dir.path().join("out/intro.layout.json");
    write(&input, &deck());

    let outcome = run_cli(&["convert-one", "--input", s(&input), "--out", s(&out)]).unwrap();

    assert_eq!(outcome.exit_code, 0);
    assert_eq!(outcome.report["pages"], 2);
    assert_eq!(outcome.report["valid"], true);
    let doc = read(&out);
    assert_eq!(doc["pages"].as_array().unwrap().len(), 2);
}

#[test]
fn convert_one_rejects_unreadable_input() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("broken.json");
    fs::write(&input, "{ not json").unwrap();

    let err = run_cli(&["convert-one", "--input", s(&input), "--out", s(&dir.path().join("o.json"))]).unwrap_err();
    assert_matches!(err, CliError::Invalid(_));
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn convert_manifest_converts_every_entry() {
    let dir = TempDir::new().unwrap();
    let pptx = source_tree(dir.path());
    let out = dir.path().join("layouts");

    let outcome = run_cli(&[
        "convert-manifest",
        "--manifest",
        s(&pptx.join("manifest.json")),
        "--pptx-root",
        s(&pptx),
        "--out",
        s(&out),
    ])
    .unwrap();

    assert_eq!(outcome.exit_code, 0);
    assert_eq!(outcome.report["valid"], 1);
    assert!(out.join("intro.layout.json").is_file());
}

#[test]
fn missing_manifest_is_invalid_input() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("manifest.json");

    let err = run_cli(&[
        "convert-manifest",
        "--manifest",
        s(&missing),
        "--pptx-root",
        s(dir.path()),
        "--out",
        s(dir.path()),
    ])
    .unwrap_err();
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn crop_rejects_unknown_kinds() {
    let dir = TempDir::new().unwrap();
    let pptx = source_tree(dir.path());

    let err = run_cli(&[
        "crop",
        "--manifest",
        s(&pptx.join("manifest.json")),
        "--pptx-root",
        s(&pptx),
        "--gamma-dir",
        s(&dir.path().join("gamma")),
        "--out",
        s(&dir.path().join("crops")),
        "--kinds",
        "sidebar",
    ])
    .unwrap_err();
    assert_matches!(err, CliError::Invalid(msg) if msg.contains("sidebar"));
}

#[test]
fn crop_reports_missing_archives_without_failing() {
    let dir = TempDir::new().unwrap();
    let pptx = source_tree(dir.path());

    let outcome = run_cli(&[
        "crop",
        "--manifest",
        s(&pptx.join("manifest.json")),
        "--pptx-root",
        s(&pptx),
        "--gamma-dir",
        s(&dir.path().join("gamma")),
        "--out",
        s(&dir.path().join("crops")),
    ])
    .unwrap();

    assert_eq!(outcome.exit_code, 0);
    let errors = outcome.report["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0]["error"].as_str().unwrap().contains("gamma zip not found"));
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

fn run_args(root: &Path, pptx: &Path) -> Vec<String> {
    let p = |rel: &str| root.join(rel).to_string_lossy().into_owned();
    vec![
        "run".into(),
        "--pptx-root".into(),
        pptx.to_string_lossy().into_owned(),
        "--layout-out".into(),
        p("layouts"),
        "--variants-out".into(),
        p("variants"),
        "--resume-path".into(),
        p("state/workflow_state.json"),
        "--quality-check".into(),
        "--quality-out".into(),
        p("quality"),
        "--render".into(),
        "--render-out".into(),
        p("render"),
        "--retry-delay-ms".into(),
        "1".into(),
    ]
}

#[test]
fn run_executes_the_workflow_and_resumes() {
    let dir = TempDir::new().unwrap();
    let pptx = source_tree(dir.path());
    let args = run_args(dir.path(), &pptx);
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    let first = run_cli(&args).unwrap();
    assert_eq!(first.exit_code, 0);
    assert_eq!(first.report["gate_passed"], true);
    assert_eq!(first.report["render_blocked"], false);
    for step in ["convert_manifest", "generate_variants", "quality_check", "render"] {
        assert_eq!(first.report["steps"][step]["skipped"], false, "{step}");
    }
    assert!(dir.path().join("state/workflow_state.json").is_file());
    assert!(dir.path().join("quality/quality_report.json").is_file());

    // Nothing changed, so every step is skipped.
    let second = run_cli(&args).unwrap();
    assert_eq!(second.exit_code, 0);
    for step in ["convert_manifest", "generate_variants", "quality_check", "render"] {
        assert_eq!(second.report["steps"][step]["skipped"], true, "{step}");
    }
}

#[test]
fn run_rejects_contradictory_flags() {
    let dir = TempDir::new().unwrap();
    let pptx = source_tree(dir.path());

    let err = run_cli(&["run", "--pptx-root", s(&pptx), "--gamma-attach"]).unwrap_err();
    assert_eq!(err.exit_code(), 2);
}

// ---------------------------------------------------------------------------
// validate / export-project-init
// ---------------------------------------------------------------------------

#[test]
fn validate_passes_converted_layouts() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("intro.json");
    let layout = dir.path().join("intro.layout.json");
    write(&input, &deck());
    run_cli(&["convert-one", "--input", s(&input), "--out", s(&layout)]).unwrap();

    let outcome = run_cli(&["validate", s(&layout)]).unwrap();
    assert_eq!(outcome.exit_code, 0);
    assert_eq!(outcome.report["passed"], true);
    assert_eq!(outcome.report["files"][0]["gate"]["passed"], true);
}

#[test]
fn validate_exits_2_on_schema_failure() {
    let dir = TempDir::new().unwrap();
    let good = dir.path().join("good.layout.json");
    let bad = dir.path().join("bad.layout.json");
    let garbage = dir.path().join("garbage.json");
    let input = dir.path().join("intro.json");
    write(&input, &deck());
    run_cli(&["convert-one", "--input", s(&input), "--out", s(&good)]).unwrap();
    write(&bad, &json!({"version": "1.0.0", "document": {"width": 100}}));
    fs::write(&garbage, "<<<").unwrap();

    let outcome = run_cli(&["validate", s(&good), s(&bad), s(&garbage)]).unwrap();

    assert_eq!(outcome.exit_code, 2);
    let files = outcome.report["files"].as_array().unwrap();
    assert_eq!(files[0]["passed"], true);
    assert_eq!(files[1]["passed"], false);
    assert!(!files[1]["schema_errors"].as_array().unwrap().is_empty());
    assert_eq!(files[2]["passed"], false);
}

#[test]
fn export_project_init_refuses_to_overwrite() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("project_init.json");

    let outcome = run_cli(&["export-project-init", "--out", s(&out)]).unwrap();
    assert_eq!(outcome.exit_code, 0);
    let config = read(&out);
    assert_eq!(config["format"], "A4");
    assert_eq!(config["bleed_mm"], 3.0);

    let err = run_cli(&["export-project-init", "--out", s(&out)]).unwrap_err();
    assert_eq!(err.exit_code(), 2);

    run_cli(&["export-project-init", "--out", s(&out), "--force"]).unwrap();
}
