//! Quality gate: policy checks that decide whether a descriptor may be exported.
//!
//! Severities:
//! - `fail` blocks production export,
//! - `warn` allows export but flags the document,
//! - `info` is diagnostics only (passing checks are reported as info).

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::layout::{self, as_f64, mm_to_px, str_field, BBox};
use crate::project_config::ProjectConfig;

// ---------------------------------------------------------------------------
// Check ids
// ---------------------------------------------------------------------------

pub const CHECK_DOCUMENT_DIMENSIONS: &str = "document.dimensions";
pub const CHECK_DOCUMENT_DPI: &str = "document.dpi";
pub const CHECK_PAGE_NUMBERING: &str = "pages.numbering";
pub const CHECK_UNIQUE_IDS: &str = "objects.unique_ids";
pub const CHECK_LAYERS: &str = "layout.layers";
pub const CHECK_FONTS: &str = "typography.fonts";
pub const CHECK_IMAGE_URLS: &str = "images.urls";
pub const CHECK_BLEED: &str = "print.bleed";
pub const CHECK_AMAZON_SAFE_AREA: &str = "amazon.safe_area";
pub const CHECK_LOCAL_FILES: &str = "images.local_files";

/// Tolerance when comparing bleed values.
const BLEED_EPSILON: f64 = 1e-6;

/// At most this many missing files are listed in a message.
const MAX_LISTED_FILES: usize = 10;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Fail,
    Warn,
    Info,
}

/// Result of one policy check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub id: &'static str,
    pub severity: Severity,
    pub passed: bool,
    pub message: String,
}

impl CheckResult {
    fn failed(id: &'static str, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            id,
            severity,
            passed: false,
            message: message.into(),
        }
    }

    fn ok(id: &'static str, message: impl Into<String>) -> Self {
        Self {
            id,
            severity: Severity::Info,
            passed: true,
            message: message.into(),
        }
    }
}

/// Machine-readable gate verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateSummary {
    pub passed: bool,
    pub fail_count: usize,
    pub warn_count: usize,
    pub results: Vec<CheckResult>,
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Evaluate every policy check against a descriptor, in catalogue order.
pub fn evaluate(doc: &Value, project: &ProjectConfig) -> Vec<CheckResult> {
    let mut results = Vec::new();
    let (width, height, dpi) = layout::document_dims(doc);

    if width <= 0.0 || height <= 0.0 {
        results.push(CheckResult::failed(
            CHECK_DOCUMENT_DIMENSIONS,
            Severity::Fail,
            "Document width/height must be > 0",
        ));
    } else {
        results.push(CheckResult::ok(
            CHECK_DOCUMENT_DIMENSIONS,
            format!("Document size OK: {width}x{height}px"),
        ));
    }

    if dpi <= 0.0 {
        results.push(CheckResult::failed(
            CHECK_DOCUMENT_DPI,
            Severity::Fail,
            "Document dpi must be > 0",
        ));
    } else {
        results.push(CheckResult::ok(CHECK_DOCUMENT_DPI, format!("DPI OK: {dpi}")));
    }

    results.push(check_page_numbering(doc));
    results.push(check_unique_ids(doc));

    if let Some(allowed) = project.allowed_layers() {
        results.push(check_layers(doc, &allowed));
    }
    if let Some(fonts) = project.declared_fonts() {
        results.push(check_fonts(doc, &fonts));
    }

    results.push(check_image_urls(doc));

    if let Some(result) = check_bleed(doc, project) {
        results.push(result);
    }
    if let Some(result) = check_amazon_safe_area(doc, project, width, height, dpi) {
        results.push(result);
    }
    if let Some(result) = check_local_files(doc) {
        results.push(result);
    }

    results
}

/// Fold results into a verdict. `passed` iff no failing `fail` check.
pub fn summarize(results: Vec<CheckResult>) -> GateSummary {
    let fail_count = results
        .iter()
        .filter(|r| r.severity == Severity::Fail && !r.passed)
        .count();
    let warn_count = results
        .iter()
        .filter(|r| r.severity == Severity::Warn && !r.passed)
        .count();
    GateSummary {
        passed: fail_count == 0,
        fail_count,
        warn_count,
        results,
    }
}

/// Convenience: evaluate and summarize.
pub fn run_gate(doc: &Value, project: &ProjectConfig) -> GateSummary {
    summarize(evaluate(doc, project))
}

fn check_page_numbering(doc: &Value) -> CheckResult {
    let numbers: Vec<i64> = layout::pages(doc).map(layout::page_number).collect();
    let unique: HashSet<i64> = numbers.iter().copied().collect();
    if numbers.iter().any(|n| *n <= 0) || unique.len() != numbers.len() {
        CheckResult::failed(
            CHECK_PAGE_NUMBERING,
            Severity::Warn,
            format!("Invalid/duplicate pageNumber(s): {numbers:?}"),
        )
    } else {
        CheckResult::ok(CHECK_PAGE_NUMBERING, format!("Pages: {}", numbers.len()))
    }
}

fn check_unique_ids(doc: &Value) -> CheckResult {
    let ids: Vec<&str> = layout::all_objects(doc).map(|o| str_field(o, "id")).collect();
    let non_empty: Vec<&str> = ids.iter().copied().filter(|s| !s.trim().is_empty()).collect();
    let unique: HashSet<&str> = non_empty.iter().copied().collect();

    if non_empty.len() != ids.len() {
        CheckResult::failed(CHECK_UNIQUE_IDS, Severity::Warn, "Empty object id(s) detected")
    } else if unique.len() != non_empty.len() {
        CheckResult::failed(CHECK_UNIQUE_IDS, Severity::Warn, "Duplicate object id(s) detected")
    } else {
        CheckResult::ok(CHECK_UNIQUE_IDS, format!("Objects: {}", non_empty.len()))
    }
}

fn check_layers(doc: &Value, allowed: &BTreeSet<String>) -> CheckResult {
    let unknown: BTreeSet<&str> = layout::all_objects(doc)
        .map(|o| str_field(o, "layer").trim())
        .filter(|l| !l.is_empty() && !allowed.contains(*l))
        .collect();
    if unknown.is_empty() {
        CheckResult::ok(CHECK_LAYERS, "All layers match project_init")
    } else {
        CheckResult::failed(
            CHECK_LAYERS,
            Severity::Warn,
            format!("Unknown layer(s) used: {unknown:?}"),
        )
    }
}

fn check_fonts(doc: &Value, declared: &BTreeSet<String>) -> CheckResult {
    let unknown: BTreeSet<&str> = layout::all_objects(doc)
        .filter(|o| str_field(o, "type") == "text")
        .map(|o| str_field(o, "fontFamily").trim())
        .filter(|f| !f.is_empty() && !declared.contains(*f))
        .collect();
    if unknown.is_empty() {
        CheckResult::ok(CHECK_FONTS, "All fonts declared in project_init")
    } else {
        CheckResult::failed(
            CHECK_FONTS,
            Severity::Warn,
            format!("Undeclared font(s): {unknown:?}"),
        )
    }
}

fn check_image_urls(doc: &Value) -> CheckResult {
    let missing = layout::all_objects(doc)
        .filter(|o| str_field(o, "type") == "image")
        .filter(|o| str_field(o, "imageUrl").trim().is_empty())
        .count();
    if missing > 0 {
        CheckResult::failed(
            CHECK_IMAGE_URLS,
            Severity::Fail,
            format!("{missing} image object(s) missing imageUrl"),
        )
    } else {
        CheckResult::ok(CHECK_IMAGE_URLS, "All image objects have imageUrl")
    }
}

/// Only evaluated when the variant name indicates a color variant.
fn check_bleed(doc: &Value, project: &ProjectConfig) -> Option<CheckResult> {
    let variant = doc.get("variant");
    let name = variant
        .and_then(|v| v.get("name").or_else(|| v.get("variant")))
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_lowercase();
    if name != "color" && name != "colour" {
        return None;
    }

    let bleed = as_f64(variant.and_then(|v| v.get("bleed_mm"))).unwrap_or(0.0);
    let required = project.required_bleed_mm();
    Some(if bleed + BLEED_EPSILON < required {
        CheckResult::failed(
            CHECK_BLEED,
            Severity::Fail,
            format!("Color variant requires bleed_mm >= {required}"),
        )
    } else {
        CheckResult::ok(CHECK_BLEED, format!("Bleed OK: {bleed}mm"))
    })
}

/// Only evaluated in Amazon mode with a positive margin and valid document.
fn check_amazon_safe_area(
    doc: &Value,
    project: &ProjectConfig,
    width: f64,
    height: f64,
    dpi: f64,
) -> Option<CheckResult> {
    if !project.amazon_enabled() || width <= 0.0 || height <= 0.0 || dpi <= 0.0 {
        return None;
    }
    let safety_mm = project.amazon_safety_margin_mm();
    let margin = mm_to_px(safety_mm, dpi);
    if margin <= 0.0 {
        return None;
    }

    let violations = layout::all_objects(doc)
        .filter_map(|o| BBox::from_value(o.get("bbox")))
        .filter(|b| !b.within_inset(width, height, margin))
        .count();

    Some(if violations > 0 {
        CheckResult::failed(
            CHECK_AMAZON_SAFE_AREA,
            Severity::Fail,
            format!("{violations} object(s) violate safety margin ({safety_mm}mm)"),
        )
    } else {
        CheckResult::ok(
            CHECK_AMAZON_SAFE_AREA,
            format!("All objects within safety margin ({safety_mm}mm)"),
        )
    })
}

/// Absolute local image paths must exist. URLs and relative paths are ignored.
/// Reported only when something is missing.
fn check_local_files(doc: &Value) -> Option<CheckResult> {
    let missing: Vec<&str> = layout::all_objects(doc)
        .filter(|o| str_field(o, "type") == "image")
        .map(|o| str_field(o, "imageUrl"))
        .filter(|url| !url.is_empty())
        .filter(|url| {
            !(url.starts_with("http://")
                || url.starts_with("https://")
                || url.starts_with("/v1/artifacts/"))
        })
        .filter(|url| {
            let p = Path::new(url);
            p.is_absolute() && !p.exists()
        })
        .collect();

    if missing.is_empty() {
        return None;
    }
    let listed: Vec<&str> = missing.into_iter().take(MAX_LISTED_FILES).collect();
    Some(CheckResult::failed(
        CHECK_LOCAL_FILES,
        Severity::Warn,
        format!("Missing local image file(s): {listed:?}"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn good_descriptor() -> Value {
        json!({
            "document": {"width": 2480, "height": 3508, "dpi": 300},
            "pages": [
                {"pageNumber": 1, "objects": [
                    {"id": "t1", "type": "text", "layer": "Text", "fontFamily": "Arial",
                     "bbox": {"x": 200, "y": 200, "w": 800, "h": 200}, "content": "Hi", "fontSize": 12},
                    {"id": "i1", "type": "image", "layer": "Images",
                     "bbox": {"x": 200, "y": 500, "w": 800, "h": 600}, "imageUrl": "https://x/a.png"}
                ]}
            ],
            "variant": {"variant": "color", "bleed_mm": 3.0}
        })
    }

    fn failing(summary: &GateSummary) -> Vec<&'static str> {
        summary
            .results
            .iter()
            .filter(|r| r.severity == Severity::Fail && !r.passed)
            .map(|r| r.id)
            .collect()
    }

    // -- verdict --------------------------------------------------------------

    #[test]
    fn clean_descriptor_passes() {
        let summary = run_gate(&good_descriptor(), &ProjectConfig::default());
        assert!(summary.passed);
        assert_eq!(summary.fail_count, 0);
        assert!(summary.results.iter().all(|r| r.passed));
        assert_eq!(summary.results[0].message, "Document size OK: 2480x3508px");
    }

    #[test]
    fn empty_image_url_and_missing_bleed_fail() {
        let mut doc = good_descriptor();
        doc["pages"][0]["objects"][1]["imageUrl"] = json!("");
        doc["variant"]["bleed_mm"] = json!(0);

        let summary = run_gate(&doc, &ProjectConfig::default());
        assert!(!summary.passed);
        assert_eq!(summary.fail_count, 2);
        assert_eq!(failing(&summary), vec![CHECK_IMAGE_URLS, CHECK_BLEED]);
    }

    #[test]
    fn warnings_do_not_fail_the_gate() {
        let mut doc = good_descriptor();
        doc["pages"][0]["objects"][1]["id"] = json!("t1");
        let summary = run_gate(&doc, &ProjectConfig::default());
        assert!(summary.passed);
        assert_eq!(summary.warn_count, 1);
    }

    #[test]
    fn grayscale_variant_skips_bleed() {
        let mut doc = good_descriptor();
        doc["variant"] = json!({"variant": "grayscale"});
        let results = evaluate(&doc, &ProjectConfig::default());
        assert!(results.iter().all(|r| r.id != CHECK_BLEED));
    }

    // -- project-driven checks ------------------------------------------------

    #[test]
    fn undeclared_layers_and_fonts_warn() {
        let project = ProjectConfig::new(json!({
            "layout": {"layers": ["Text"]},
            "typography": {"fonts": [{"family": "Minion"}]}
        }));
        let summary = run_gate(&good_descriptor(), &project);
        assert_eq!(summary.warn_count, 2);
        let layers = summary.results.iter().find(|r| r.id == CHECK_LAYERS).unwrap();
        assert_eq!(layers.message, r#"Unknown layer(s) used: {"Images"}"#);
    }

    #[test]
    fn amazon_safe_area_uses_margin_in_mm() {
        let project = ProjectConfig::new(json!({"amazon": {"enabled": true, "safety_margin_mm": 25.4}}));
        // 25.4 mm at 300 dpi is 300 px; both objects start at x=200.
        let summary = run_gate(&good_descriptor(), &project);
        assert_eq!(failing(&summary), vec![CHECK_AMAZON_SAFE_AREA]);
        let r = summary.results.iter().find(|r| r.id == CHECK_AMAZON_SAFE_AREA).unwrap();
        assert_eq!(r.message, "2 object(s) violate safety margin (25.4mm)");
    }

    #[test]
    fn missing_absolute_local_file_warns() {
        let mut doc = good_descriptor();
        doc["pages"][0]["objects"][1]["imageUrl"] = json!("/nowhere/missing.png");
        let results = evaluate(&doc, &ProjectConfig::default());
        let local = results.iter().find(|r| r.id == CHECK_LOCAL_FILES).unwrap();
        assert_eq!(local.severity, Severity::Warn);
        assert!(!local.passed);
    }

    #[test]
    fn invalid_document_fails() {
        let doc = json!({"document": {"width": 0, "height": 10, "dpi": 0}, "pages": []});
        let summary = run_gate(&doc, &ProjectConfig::default());
        assert_eq!(failing(&summary), vec![CHECK_DOCUMENT_DIMENSIONS, CHECK_DOCUMENT_DPI]);
    }

    #[test]
    fn summary_serializes_lowercase_severity() {
        let summary = run_gate(&good_descriptor(), &ProjectConfig::default());
        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["results"][0]["severity"], "info");
        assert_eq!(value["results"][0]["id"], "document.dimensions");
    }
}
