//! Preflight checks: structural validation plus semantic sanity rules, and
//! the Amazon/KDP page-bounds check.

use std::collections::{BTreeSet, HashSet};

use serde_json::Value;

use crate::layout::{self, as_f64, str_field, BBox};

/// Semantic check groups; all are enabled when none are requested.
pub const PREFLIGHT_CHECKS: &[&str] = &["document", "pages", "bbox", "text", "image", "layers"];

/// Tolerance applied to the right/bottom page edge.
const EDGE_EPSILON: f64 = 1e-6;

/// Outcome of a preflight or bounds check.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckOutcome {
    pub errors: Vec<String>,
}

impl CheckOutcome {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Structural validation followed by semantic checks.
///
/// Semantic checks only run once the structure is valid. `checks` selects a
/// subset of [`PREFLIGHT_CHECKS`]; an empty slice enables all of them.
pub fn run_preflight(doc: &Value, checks: &[&str]) -> CheckOutcome {
    let schema_errors = layout::validate_descriptor(doc);
    if !schema_errors.is_empty() {
        return CheckOutcome {
            errors: schema_errors.iter().map(ToString::to_string).collect(),
        };
    }

    let enabled = |name: &str| checks.is_empty() || checks.contains(&name);
    let (width, height, dpi) = layout::document_dims(doc);
    let mut errors = Vec::new();

    if enabled("document") {
        if width <= 0.0 || height <= 0.0 {
            errors.push("Document width/height must be > 0".to_string());
        }
        if dpi <= 0.0 {
            errors.push("Document dpi must be > 0".to_string());
        }
    }

    // Layers come from the descriptor's own `meta.layers` mapping.
    let allowed_layers: Option<BTreeSet<String>> = if enabled("layers") {
        doc.get("meta")
            .and_then(|m| m.get("layers"))
            .and_then(Value::as_object)
            .filter(|m| !m.is_empty())
            .map(|m| {
                m.values()
                    .filter_map(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
    } else {
        None
    };

    if enabled("pages") {
        let mut seen = HashSet::new();
        for page in layout::pages(doc) {
            let pn = layout::page_number(page);
            if pn <= 0 {
                errors.push("Page has invalid pageNumber".to_string());
            }
            if !seen.insert(pn) {
                errors.push(format!("Duplicate pageNumber: {pn}"));
            }
        }
    }

    for obj in layout::all_objects(doc) {
        let id = str_field(obj, "id").trim();
        if id.is_empty() {
            errors.push("Object has empty id".to_string());
            continue;
        }

        let Some(bbox) = BBox::from_value(obj.get("bbox")) else {
            continue;
        };

        if enabled("bbox") {
            if bbox.x < 0.0 || bbox.y < 0.0 || bbox.w < 1.0 || bbox.h < 1.0 {
                errors.push(format!("Invalid bbox for {id}"));
            }
            if bbox.right() > width + EDGE_EPSILON || bbox.bottom() > height + EDGE_EPSILON {
                errors.push(format!("Object {id} out of bounds"));
            }
        }

        if let Some(allowed) = &allowed_layers {
            let layer = str_field(obj, "layer");
            if !layer.is_empty() && !allowed.contains(layer) {
                errors.push(format!("Object {id} uses unknown layer '{layer}'"));
            }
        }

        match str_field(obj, "type") {
            "text" if enabled("text") => {
                if str_field(obj, "content").trim().is_empty() {
                    errors.push(format!("Text object {id} has empty content"));
                }
                if as_f64(obj.get("fontSize")).unwrap_or(0.0) <= 0.0 {
                    errors.push(format!("Text object {id} has invalid fontSize"));
                }
                if str_field(obj, "fontFamily").trim().is_empty() {
                    errors.push(format!("Text object {id} missing fontFamily"));
                }
            }
            "image" if enabled("image") => {
                if str_field(obj, "imageUrl").trim().is_empty() {
                    errors.push(format!("Image object {id} missing imageUrl"));
                }
            }
            _ => {}
        }
    }

    CheckOutcome { errors }
}

/// Every bounding box must lie inside the page, inset by `safety_margin_px`.
pub fn check_page_bounds(doc: &Value, safety_margin_px: f64) -> CheckOutcome {
    let (width, height, _) = layout::document_dims(doc);
    let m = safety_margin_px;

    let errors = layout::all_objects(doc)
        .filter_map(|obj| {
            let bbox = BBox::from_value(obj.get("bbox"))?;
            if bbox.within_inset(width, height, m) {
                return None;
            }
            Some(format!(
                "Object {} out of bounds: x={},y={},w={},h={} (doc {width}x{height}, margin {m})",
                str_field(obj, "id"),
                bbox.x,
                bbox.y,
                bbox.w,
                bbox.h
            ))
        })
        .collect();

    CheckOutcome { errors }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn descriptor() -> Value {
        json!({
            "document": {"width": 1000, "height": 1000, "dpi": 300},
            "meta": {"layers": {"text": "Text", "images": "Images"}},
            "pages": [{"pageNumber": 1, "objects": [
                {"id": "t1", "type": "text", "layer": "Text", "bbox": {"x": 10, "y": 10, "w": 100, "h": 50},
                 "content": "Hi", "fontFamily": "Arial", "fontSize": 12},
                {"id": "i1", "type": "image", "layer": "Images", "bbox": {"x": 10, "y": 100, "w": 100, "h": 100},
                 "imageUrl": "a.png"}
            ]}]
        })
    }

    // -- preflight ------------------------------------------------------------

    #[test]
    fn clean_descriptor_passes() {
        let outcome = run_preflight(&descriptor(), &[]);
        assert!(outcome.is_valid(), "{:?}", outcome.errors);
    }

    #[test]
    fn schema_errors_short_circuit() {
        let outcome = run_preflight(&json!({"pages": []}), &[]);
        assert!(!outcome.is_valid());
        assert!(outcome.errors[0].starts_with("/document"));
    }

    #[test]
    fn semantic_errors_are_collected() {
        let mut doc = descriptor();
        doc["pages"][0]["objects"][0]["content"] = json!("  ");
        doc["pages"][0]["objects"][0]["layer"] = json!("Ghost");
        doc["pages"][0]["objects"][1]["imageUrl"] = json!("");
        doc["pages"][0]["objects"][1]["bbox"]["x"] = json!(950);

        let errors = run_preflight(&doc, &[]).errors;
        assert!(errors.contains(&"Text object t1 has empty content".to_string()));
        assert!(errors.contains(&"Object t1 uses unknown layer 'Ghost'".to_string()));
        assert!(errors.contains(&"Image object i1 missing imageUrl".to_string()));
        assert!(errors.contains(&"Object i1 out of bounds".to_string()));
    }

    #[test]
    fn check_subset_disables_others() {
        let mut doc = descriptor();
        doc["pages"][0]["objects"][1]["imageUrl"] = json!("");
        assert!(run_preflight(&doc, &["text"]).is_valid());
    }

    #[test]
    fn duplicate_page_numbers_are_reported() {
        let mut doc = descriptor();
        let page = doc["pages"][0].clone();
        doc["pages"].as_array_mut().unwrap().push(page);
        doc["pages"][1]["objects"] = json!([]);
        let errors = run_preflight(&doc, &["pages"]).errors;
        assert_eq!(
            errors,
            vec!["/pages/1/pageNumber: duplicates /pages/0/pageNumber (1)".to_string()]
        );
    }

    // -- page bounds ----------------------------------------------------------

    #[test]
    fn page_bounds_with_margin() {
        let doc = descriptor();
        assert!(check_page_bounds(&doc, 0.0).is_valid());
        let outcome = check_page_bounds(&doc, 20.0);
        assert_eq!(outcome.errors.len(), 2);
        assert!(outcome.errors[0].starts_with("Object t1 out of bounds"));
    }
}
