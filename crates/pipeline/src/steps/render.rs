//! `render`: SLA documents plus placeholder PDF and PNG outputs.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{layout_stem, read_json, write_atomic, FileHash, RENDER};
use crate::error::StepError;
use crate::executor::StepOutput;
use crate::preview::{page_previews, placeholder_pdf};
use crate::progress::ProgressTracker;
use crate::sla::compile_layout;

/// Declared inputs of `render`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderInput {
    pub step: String,
    pub paths: Vec<FileHash>,
    pub upstream_input_hash: Option<String>,
    pub render_out: PathBuf,
    pub pdf: bool,
    pub png: bool,
    pub on_variants: bool,
    pub project_init_hash: Option<String>,
}

impl RenderInput {
    pub fn new(paths: Vec<FileHash>, render_out: PathBuf) -> Self {
        Self {
            step: RENDER.to_string(),
            paths,
            upstream_input_hash: None,
            render_out,
            pdf: true,
            png: true,
            on_variants: true,
            project_init_hash: None,
        }
    }
}

fn render_one(input: &RenderInput, source: &FileHash) -> Result<Vec<Value>, StepError> {
    let doc = read_json(&source.path_buf())?;
    let stem = layout_stem(&source.path_buf());
    let mut produced = Vec::new();

    let sla_path = input.render_out.join("sla").join(format!("{stem}.sla"));
    write_atomic(&sla_path, &compile_layout(&doc))?;
    produced.push(json!({ "in": source.path, "kind": "sla", "path": sla_path.to_string_lossy() }));

    if input.pdf {
        let pdf_path = input.render_out.join("pdf").join(format!("{stem}.pdf"));
        write_atomic(&pdf_path, &placeholder_pdf(&doc))?;
        produced.push(json!({ "in": source.path, "kind": "pdf", "path": pdf_path.to_string_lossy() }));
    }

    if input.png {
        let previews = page_previews(&doc).map_err(|e| StepError::action(format!("Preview failed: {e}")))?;
        for (page, bytes) in previews {
            let png_path = input.render_out.join("png").join(format!("{stem}_p{page:04}.png"));
            write_atomic(&png_path, &bytes)?;
            produced.push(json!({
                "in": source.path, "kind": "png", "page": page, "path": png_path.to_string_lossy()
            }));
        }
    }
    Ok(produced)
}

pub fn run(input: RenderInput, tracker: &ProgressTracker) -> Result<StepOutput, StepError> {
    tracker.emit(
        "render.start",
        json!({ "files": input.paths.len(), "pdf": input.pdf, "png": input.png }),
    );

    let mut outputs: Vec<Value> = Vec::new();
    let mut errors: Vec<Value> = Vec::new();
    for source in &input.paths {
        match render_one(&input, source) {
            Ok(mut produced) => outputs.append(&mut produced),
            Err(e) => errors.push(json!({ "in": source.path, "error": e.to_string() })),
        }
    }

    tracker.emit(
        "render.done",
        json!({ "outputs": outputs.len(), "errors": errors.len() }),
    );

    let paths: Vec<String> = outputs
        .iter()
        .filter_map(|o| o.get("path").and_then(Value::as_str).map(str::to_string))
        .collect();
    Ok(StepOutput::new(paths)
        .with_summary(json!({ "outputs": outputs.len(), "errors": errors.len() }))
        .with_report(json!({ "outputs": outputs, "errors": errors })))
}
