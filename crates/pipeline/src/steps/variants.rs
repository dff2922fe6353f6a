//! `generate_variants`: expand every layout into format x variant copies.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use pressline_core::layout::{self, as_f64, mm_to_px};
use pressline_core::preflight::check_page_bounds;
use pressline_core::project_config::ProjectConfig;

use super::gamma::parse_crop_path;
use super::{layout_stem, read_json, write_json, FileHash};
use crate::error::StepError;
use crate::executor::StepOutput;
use crate::progress::ProgressTracker;

/// Report lists are capped at this many messages per file.
const MAX_REPORTED_ERRORS: usize = 10;

/// Declared inputs of `generate_variants`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantsInput {
    pub step: String,
    pub layouts: Vec<FileHash>,
    /// `input_hash` of `convert_manifest`, so upstream re-runs invalidate
    /// this step even when the converted bytes are unchanged.
    pub upstream_input_hash: Option<String>,
    pub variants_out: PathBuf,
    pub project_init: Option<PathBuf>,
    pub project_init_hash: Option<String>,
    pub attach_gamma: bool,
    pub attach_kinds: Vec<String>,
    pub gamma_crops: Vec<String>,
    /// `input_hash` of `gamma_sync`; set only when attaching.
    pub gamma_input_hash: Option<String>,
}

// ---------------------------------------------------------------------------
// Transformations
// ---------------------------------------------------------------------------

/// Page size in inches for a supported format name.
fn format_inches(format: &str) -> Option<(f64, f64)> {
    match format.trim() {
        "A4" | "a4" => Some((210.0 / 25.4, 297.0 / 25.4)),
        "8x11.5" | "8x11_5" | "8x11,5" => Some((8.0, 11.5)),
        _ => None,
    }
}

fn scale_bbox(obj: &mut Map<String, Value>, sx: f64, sy: f64) {
    let Some(b) = obj.get_mut("bbox").and_then(Value::as_object_mut) else {
        return;
    };
    let get = |b: &Map<String, Value>, k: &str| as_f64(b.get(k)).unwrap_or(0.0);
    let (x, y, w, h) = (get(b, "x"), get(b, "y"), get(b, "w"), get(b, "h"));
    b.insert("x".into(), json!(x * sx));
    b.insert("y".into(), json!(y * sy));
    b.insert("w".into(), json!((w * sx).max(1.0)));
    b.insert("h".into(), json!((h * sy).max(1.0)));
}

/// Rescale a descriptor to `format`, keeping its dpi.
pub fn convert_format(doc: &Value, format: &str) -> Result<Value, StepError> {
    let (w_in, h_in) =
        format_inches(format).ok_or_else(|| StepError::action(format!("Unsupported format: {format}")))?;
    let mut out = doc.clone();
    let (src_w, src_h, dpi) = layout::document_dims(doc);
    let dpi = if dpi > 0.0 { dpi } else { 300.0 };
    let dst_w = (w_in * dpi).round();
    let dst_h = (h_in * dpi).round();
    let sx = if src_w > 0.0 { dst_w / src_w } else { 1.0 };
    let sy = if src_h > 0.0 { dst_h / src_h } else { 1.0 };

    if let Some(document) = out.get_mut("document").and_then(Value::as_object_mut) {
        document.insert("width".into(), json!(dst_w));
        document.insert("height".into(), json!(dst_h));
        document.insert("dpi".into(), json!(dpi));
    }
    layout::for_each_object_mut(&mut out, |obj| scale_bbox(obj, sx, sy));
    if let Some(variant) = layout::variant_mut(&mut out) {
        variant.insert("format".into(), json!(format));
    }
    Ok(out)
}

/// Grow the page by `bleed_mm` on every side and shift objects inward.
pub fn apply_bleed(doc: &Value, bleed_mm: f64) -> Value {
    let mut out = doc.clone();
    let (w, h, dpi) = layout::document_dims(doc);
    let bleed = mm_to_px(bleed_mm, dpi);

    if let Some(document) = out.get_mut("document").and_then(Value::as_object_mut) {
        document.insert("width".into(), json!(w + 2.0 * bleed));
        document.insert("height".into(), json!(h + 2.0 * bleed));
    }
    layout::for_each_object_mut(&mut out, |obj| {
        if let Some(b) = obj.get_mut("bbox").and_then(Value::as_object_mut) {
            let x = as_f64(b.get("x")).unwrap_or(0.0);
            let y = as_f64(b.get("y")).unwrap_or(0.0);
            b.insert("x".into(), json!(x + bleed));
            b.insert("y".into(), json!(y + bleed));
        }
    });
    if let Some(variant) = layout::variant_mut(&mut out) {
        variant.insert("bleed_mm".into(), json!(bleed_mm));
    }
    out
}

/// `#rrggbb` to its luminance grey; malformed values read as black.
pub fn hex_to_gray(hex: &str) -> String {
    let digits = hex.trim().trim_start_matches('#');
    let channel = |i: usize| {
        digits
            .get(i..i + 2)
            .and_then(|s| u8::from_str_radix(s, 16).ok())
            .map(f64::from)
    };
    let (r, g, b) = match (digits.len(), channel(0), channel(2), channel(4)) {
        (6, Some(r), Some(g), Some(b)) => (r, g, b),
        _ => (0.0, 0.0, 0.0),
    };
    let y = (0.2126 * r + 0.7152 * g + 0.0722 * b).round().clamp(0.0, 255.0) as u8;
    format!("#{y:02x}{y:02x}{y:02x}")
}

fn gray_field(obj: &mut Map<String, Value>, key: &str) {
    let Some(Value::String(color)) = obj.get(key) else {
        return;
    };
    if color.starts_with('#') {
        let gray = hex_to_gray(color);
        obj.insert(key.into(), json!(gray));
    }
}

/// Convert text and shape colors to greyscale.
pub fn to_grayscale(doc: &Value) -> Value {
    let mut out = doc.clone();
    layout::for_each_object_mut(&mut out, |obj| match layout::str_field(obj, "type") {
        "text" => gray_field(obj, "color"),
        "rectangle" => {
            gray_field(obj, "fillColor");
            gray_field(obj, "strokeColor");
        }
        _ => {}
    });
    if let Some(variant) = layout::variant_mut(&mut out) {
        variant.insert("colors".into(), json!("grayscale"));
    }
    out
}

/// Point image objects at their gamma crops.
///
/// Crops are matched by `(sourceSlide, sourceIndex, sourceKind)` within the
/// deck named by `source.name`. Returns the number of images updated.
pub fn attach_gamma_crops(doc: &mut Value, crops: &[String], kinds: &[String]) -> usize {
    let deck = doc
        .get("source")
        .and_then(|s| s.get("name"))
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    let index: HashMap<(i64, i64, String), &String> = crops
        .iter()
        .filter_map(|path| {
            let crop = parse_crop_path(path)?;
            (crop.deck == deck).then(|| ((crop.slide, crop.index, crop.kind), path))
        })
        .collect();

    let mut attached = 0;
    layout::for_each_object_mut(doc, |obj| {
        if layout::str_field(obj, "type") != "image" {
            return;
        }
        let kind = layout::str_field(obj, "sourceKind").to_string();
        if !kinds.iter().any(|k| *k == kind) {
            return;
        }
        let slide = as_f64(obj.get("sourceSlide")).map(|v| v as i64);
        let idx = as_f64(obj.get("sourceIndex")).map(|v| v as i64);
        let (Some(slide), Some(idx)) = (slide, idx) else {
            return;
        };
        if let Some(path) = index.get(&(slide, idx, kind)) {
            obj.insert("imageUrl".into(), json!(path));
            obj.insert("gammaCrop".into(), json!(true));
            attached += 1;
        }
    });

    if let Some(variant) = layout::variant_mut(doc) {
        variant.insert("gamma_crops_attached".into(), json!(true));
    }
    attached
}

/// `deck` + `8x11.5` + `color` -> `deck.8x11_5.color.layout.json`.
pub fn variant_file_name(stem: &str, format: &str, variant: &str) -> String {
    let fmt = format.replace(['.', ','], "_");
    format!("{stem}.{fmt}.{variant}.layout.json")
}

/// Produce one variant of an already formatted descriptor.
pub fn make_variant(doc: &Value, variant: &str, bleed_mm: f64) -> Value {
    let mut out = match variant {
        "color" => apply_bleed(doc, bleed_mm),
        "grayscale" => to_grayscale(doc),
        _ => doc.clone(),
    };
    if let Some(v) = layout::variant_mut(&mut out) {
        v.insert("variant".into(), json!(variant));
    }
    out
}

fn capped(errors: Vec<String>) -> Vec<String> {
    errors.into_iter().take(MAX_REPORTED_ERRORS).collect()
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

pub fn run(input: VariantsInput, tracker: &ProgressTracker) -> Result<StepOutput, StepError> {
    let project = ProjectConfig::load_optional(input.project_init.as_deref())
        .map_err(|e| StepError::Configuration(e.to_string()))?;
    let variants = project.variants();
    let formats = project.formats();
    let bleed_mm = project.variant_bleed_mm();

    tracker.emit(
        "variants.start",
        json!({ "inputs": input.layouts.len(), "variants": variants, "formats": formats }),
    );

    let mut entries: Vec<Value> = Vec::new();
    let mut errors: Vec<Value> = Vec::new();
    let mut outputs: Vec<String> = Vec::new();

    for source in &input.layouts {
        let src = source.path_buf();
        let doc = match read_json(&src) {
            Ok(doc) => doc,
            Err(e) => {
                errors.push(json!({ "in": source.path, "error": e.to_string() }));
                continue;
            }
        };
        let stem = layout_stem(&src);

        for format in &formats {
            let formatted = match convert_format(&doc, format) {
                Ok(d) => d,
                Err(e) => {
                    errors.push(json!({ "in": source.path, "format": format, "error": e.to_string() }));
                    continue;
                }
            };

            for variant in &variants {
                let mut out_doc = make_variant(&formatted, variant, bleed_mm);
                if input.attach_gamma {
                    attach_gamma_crops(&mut out_doc, &input.gamma_crops, &input.attach_kinds);
                }

                let out_path = input.variants_out.join(variant_file_name(&stem, format, variant));
                write_json(&out_path, &out_doc)?;

                let schema_errors: Vec<String> =
                    layout::validate_descriptor(&out_doc).iter().map(ToString::to_string).collect();
                let kdp = check_page_bounds(&out_doc, 0.0);
                entries.push(json!({
                    "in": source.path,
                    "out": out_path.to_string_lossy(),
                    "format": format,
                    "variant": variant,
                    "schema_valid": schema_errors.is_empty(),
                    "schema_errors": capped(schema_errors),
                    "kdp_valid": kdp.is_valid(),
                    "kdp_errors": capped(kdp.errors),
                }));
                outputs.push(out_path.to_string_lossy().into_owned());
            }
        }
    }

    tracker.emit(
        "variants.done",
        json!({ "outputs": outputs.len(), "errors": errors.len() }),
    );

    Ok(StepOutput::new(outputs.clone())
        .with_summary(json!({ "outputs": outputs.len(), "errors": errors.len() }))
        .with_report(json!({ "outputs": entries, "errors": errors })))
}

/// Paths of layouts as [`FileHash`] entries, for building [`VariantsInput`].
pub fn layout_hashes(paths: &[String]) -> Vec<FileHash> {
    paths.iter().map(|p| FileHash::of(Path::new(p))).collect()
}
