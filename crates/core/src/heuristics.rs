//! Warn-only layout heuristics: text overflow risk and page density.
//!
//! These never fail a descriptor; they produce warnings and infos that end
//! up next to the quality gate results in the quality report.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::layout::{self, as_f64, str_field};

/// Thresholds for the heuristics. Read from `quality.heuristics` in the
/// project configuration; missing keys keep their defaults.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicConfig {
    /// Average glyph width relative to the font size.
    pub avg_char_width_em: f64,
    pub line_height_em: f64,
    /// Ratios above this are warnings.
    pub overflow_warn_ratio: f64,
    /// Ratios above this (and not above the warn ratio) are infos.
    pub overflow_info_ratio: f64,
    pub objects_per_page_warn: usize,
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        Self {
            avg_char_width_em: 0.6,
            line_height_em: 1.2,
            overflow_warn_ratio: 1.0,
            overflow_info_ratio: 0.9,
            objects_per_page_warn: 80,
        }
    }
}

/// One heuristic finding.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub id: &'static str,
    pub page: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_count: Option<usize>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSummary {
    pub page_number: i64,
    pub object_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeuristicSummary {
    pub pages: Vec<PageSummary>,
    pub warn_count: usize,
    pub info_count: usize,
    pub config: HeuristicConfig,
}

/// Full heuristic report for one descriptor. `passed` is always `true`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeuristicReport {
    pub passed: bool,
    pub warnings: Vec<Finding>,
    pub infos: Vec<Finding>,
    pub summary: HeuristicSummary,
}

/// Estimate `needed_height / bbox_height` for a text box.
///
/// Returns `None` when the inputs are insufficient (empty text, non-positive
/// box or font size). Whitespace runs count as a single character.
pub fn estimate_text_overflow_ratio(
    text: &str,
    bbox_w: f64,
    bbox_h: f64,
    font_size: f64,
    cfg: &HeuristicConfig,
) -> Option<f64> {
    if text.is_empty() || bbox_w <= 0.0 || bbox_h <= 0.0 || font_size <= 0.0 {
        return None;
    }

    let char_w = (cfg.avg_char_width_em * font_size).max(0.1);
    let chars_per_line = (bbox_w / char_w).max(1.0);

    let compact = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let n = compact.chars().count();
    if n == 0 {
        return None;
    }

    let lines = (n as f64 / chars_per_line).ceil().max(1.0);
    let line_h = (cfg.line_height_em * font_size).max(0.1);
    Some(lines * line_h / bbox_h)
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Run all heuristics over a descriptor.
pub fn run_heuristic_checks(doc: &Value, cfg: &HeuristicConfig) -> HeuristicReport {
    let mut warnings = Vec::new();
    let mut infos = Vec::new();
    let mut pages = Vec::new();

    for page in layout::pages(doc) {
        let pn = layout::page_number(page);
        let objects: Vec<_> = layout::page_objects(page).collect();
        pages.push(PageSummary {
            page_number: pn,
            object_count: objects.len(),
        });

        if objects.len() >= cfg.objects_per_page_warn {
            warnings.push(Finding {
                id: "page.density",
                page: pn,
                object_id: None,
                ratio: None,
                object_count: Some(objects.len()),
                message: format!("High object count on page {pn}: {} objects", objects.len()),
            });
        }

        for obj in objects {
            if str_field(obj, "type") != "text" {
                continue;
            }
            let bbox = obj.get("bbox");
            let ratio = estimate_text_overflow_ratio(
                str_field(obj, "content"),
                as_f64(bbox.and_then(|b| b.get("w"))).unwrap_or(0.0),
                as_f64(bbox.and_then(|b| b.get("h"))).unwrap_or(0.0),
                as_f64(obj.get("fontSize")).unwrap_or(0.0),
                cfg,
            );
            let Some(ratio) = ratio else {
                continue;
            };

            let finding = Finding {
                id: "text.overflow_risk",
                page: pn,
                object_id: Some(str_field(obj, "id").to_string()),
                ratio: Some(round4(ratio)),
                object_count: None,
                message: "Estimated text overflow risk (needed_height / bbox_height)".to_string(),
            };
            if ratio > cfg.overflow_warn_ratio {
                warnings.push(finding);
            } else if ratio > cfg.overflow_info_ratio {
                infos.push(finding);
            }
        }
    }

    HeuristicReport {
        passed: true,
        summary: HeuristicSummary {
            pages,
            warn_count: warnings.len(),
            info_count: infos.len(),
            config: *cfg,
        },
        warnings,
        infos,
    }
}
