//! Project configuration (`project_init.json`) accessors.
//!
//! The file is free-form JSON shared with other tooling, so only the keys
//! the pipeline reads are interpreted:
//!
//! | Key | Used by |
//! |-----|---------|
//! | `layout.layers` (list) | quality gate `layout.layers` |
//! | `typography.fonts[].family` | quality gate `typography.fonts` |
//! | `print.bleed_mm` (default 3.0) | quality gate `print.bleed` |
//! | `amazon.enabled`, `amazon.safety_margin_mm` | quality gate `amazon.safe_area` |
//! | `quality.heuristics.*` | heuristics thresholds |
//! | `variants` (list or `"both"`), `format`, `bleed_mm` | variant generation |

use std::collections::BTreeSet;
use std::path::Path;

use serde_json::{json, Value};

use crate::error::CoreError;
use crate::heuristics::HeuristicConfig;
use crate::layout::as_f64;

/// Bleed applied to color variants and required by the gate when unset.
pub const DEFAULT_BLEED_MM: f64 = 3.0;

/// Page formats the variant generator can produce.
pub const SUPPORTED_FORMATS: &[&str] = &["A4", "8x11.5"];

/// Parsed project configuration. An empty object when none was supplied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectConfig {
    raw: Value,
}

impl ProjectConfig {
    pub fn new(raw: Value) -> Self {
        Self { raw }
    }

    /// Load from a JSON file. Non-object documents are rejected.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            CoreError::Validation(format!("Cannot read project config {}: {e}", path.display()))
        })?;
        let raw: Value = serde_json::from_str(&text).map_err(|e| {
            CoreError::Validation(format!("Invalid project config {}: {e}", path.display()))
        })?;
        if !raw.is_object() {
            return Err(CoreError::Validation(format!(
                "Project config {} must be a JSON object",
                path.display()
            )));
        }
        Ok(Self { raw })
    }

    /// Load when a path is given and exists, otherwise return the empty config.
    pub fn load_optional(path: Option<&Path>) -> Result<Self, CoreError> {
        match path {
            Some(p) if p.exists() => Self::load(p),
            _ => Ok(Self::default()),
        }
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    fn section(&self, key: &str) -> Option<&Value> {
        self.raw.get(key).filter(|v| !v.is_null())
    }

    /// Declared layer names, `None` when the list is absent or empty.
    pub fn allowed_layers(&self) -> Option<BTreeSet<String>> {
        let layers = self.section("layout")?.get("layers")?.as_array()?;
        let set: BTreeSet<String> = layers
            .iter()
            .map(value_to_string)
            .filter(|s| !s.trim().is_empty())
            .collect();
        (!set.is_empty()).then_some(set)
    }

    /// Declared font families, `None` when no font list is present.
    pub fn declared_fonts(&self) -> Option<BTreeSet<String>> {
        let fonts = self.section("typography")?.get("fonts")?.as_array()?;
        let set: BTreeSet<String> = fonts
            .iter()
            .filter_map(|f| f.get("family").and_then(Value::as_str))
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
            .collect();
        (!set.is_empty()).then_some(set)
    }

    /// Minimum bleed for color variants.
    pub fn required_bleed_mm(&self) -> f64 {
        as_f64(self.section("print").and_then(|p| p.get("bleed_mm")))
            .filter(|v| *v != 0.0)
            .unwrap_or(DEFAULT_BLEED_MM)
    }

    /// Amazon mode accepts `true`, `"1"`, `"true"` and `"yes"`.
    pub fn amazon_enabled(&self) -> bool {
        match self.section("amazon").and_then(|a| a.get("enabled")) {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64() == Some(1.0),
            Some(Value::String(s)) => matches!(s.to_lowercase().as_str(), "1" | "true" | "yes"),
            _ => false,
        }
    }

    pub fn amazon_safety_margin_mm(&self) -> f64 {
        as_f64(self.section("amazon").and_then(|a| a.get("safety_margin_mm"))).unwrap_or(0.0)
    }

    /// Heuristic thresholds, falling back to defaults per key.
    pub fn heuristic_config(&self) -> HeuristicConfig {
        self.section("quality")
            .and_then(|q| q.get("heuristics"))
            .and_then(|h| serde_json::from_value(h.clone()).ok())
            .unwrap_or_default()
    }

    /// Requested variants. `"both"` expands to color and grayscale.
    pub fn variants(&self) -> Vec<String> {
        match self.section("variants") {
            Some(Value::String(s)) if s.eq_ignore_ascii_case("both") => {
                vec!["color".to_string(), "grayscale".to_string()]
            }
            Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_lowercase()],
            Some(Value::Array(items)) => {
                let list: Vec<String> = items
                    .iter()
                    .map(|v| value_to_string(v).trim().to_lowercase())
                    .filter(|s| !s.is_empty())
                    .collect();
                if list.is_empty() {
                    vec!["color".to_string()]
                } else {
                    list
                }
            }
            _ => vec!["color".to_string()],
        }
    }

    /// Requested page formats. `"both"` expands to every supported format.
    pub fn formats(&self) -> Vec<String> {
        match self.section("format").and_then(Value::as_str).map(str::trim) {
            Some(s) if s.eq_ignore_ascii_case("both") => {
                SUPPORTED_FORMATS.iter().map(|s| s.to_string()).collect()
            }
            Some(s) if !s.is_empty() => vec![s.to_string()],
            _ => vec!["A4".to_string()],
        }
    }

    /// Bleed applied when generating color variants.
    pub fn variant_bleed_mm(&self) -> f64 {
        as_f64(self.section("bleed_mm")).unwrap_or(DEFAULT_BLEED_MM)
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A starter `project_init.json` written by `export-project-init`.
pub fn default_project_init() -> Value {
    json!({
        "variants": ["color"],
        "format": "A4",
        "bleed_mm": DEFAULT_BLEED_MM,
        "layout": {
            "layers": ["Background", "Images_BG", "Images", "Text", "Overlay", "Wrap"]
        },
        "typography": {
            "fonts": [
                {"family": "Arial", "role": "body"},
                {"family": "Arial", "role": "title"}
            ]
        },
        "print": {"bleed_mm": DEFAULT_BLEED_MM},
        "amazon": {"enabled": false, "safety_margin_mm": 6.35},
        "quality": {"heuristics": HeuristicConfig::default()}
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // -- accessors ------------------------------------------------------------

    #[test]
    fn empty_config_uses_defaults() {
        let cfg = ProjectConfig::default();
        assert!(cfg.allowed_layers().is_none());
        assert!(cfg.declared_fonts().is_none());
        assert_eq!(cfg.required_bleed_mm(), 3.0);
        assert!(!cfg.amazon_enabled());
        assert_eq!(cfg.variants(), vec!["color"]);
        assert_eq!(cfg.formats(), vec!["A4"]);
        assert_eq!(cfg.heuristic_config(), HeuristicConfig::default());
    }

    #[test]
    fn both_expands_variants_and_formats() {
        let cfg = ProjectConfig::new(json!({"variants": "both", "format": "both"}));
        assert_eq!(cfg.variants(), vec!["color", "grayscale"]);
        assert_eq!(cfg.formats(), vec!["A4", "8x11.5"]);
    }

    #[test]
    fn amazon_flag_accepts_strings() {
        let cfg = ProjectConfig::new(json!({"amazon": {"enabled": "Yes", "safety_margin_mm": 5}}));
        assert!(cfg.amazon_enabled());
        assert_eq!(cfg.amazon_safety_margin_mm(), 5.0);
    }

    #[test]
    fn partial_heuristics_override() {
        let cfg = ProjectConfig::new(json!({"quality": {"heuristics": {"objects_per_page_warn": 5}}}));
        let h = cfg.heuristic_config();
        assert_eq!(h.objects_per_page_warn, 5);
        assert_eq!(h.line_height_em, 1.2);
    }

    #[test]
    fn fonts_and_layers_are_collected() {
        let cfg = ProjectConfig::new(default_project_init());
        assert!(cfg.allowed_layers().unwrap().contains("Text"));
        assert_eq!(cfg.declared_fonts().unwrap().len(), 1);
    }

    // -- loading --------------------------------------------------------------

    #[test]
    fn load_rejects_non_object() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("project_init.json");
        std::fs::write(&path, "[1]").unwrap();
        assert!(ProjectConfig::load(&path).is_err());
    }

    #[test]
    fn load_optional_missing_is_empty() {
        let cfg = ProjectConfig::load_optional(Some(Path::new("/no/such/project_init.json"))).unwrap();
        assert_eq!(cfg, ProjectConfig::default());
    }
}
