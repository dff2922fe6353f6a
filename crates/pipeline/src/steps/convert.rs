//! `convert_manifest`: extracted slide decks to layout descriptors.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use pressline_core::layout::{self, as_f64, mm_to_px};
use pressline_core::project_config::ProjectConfig;

use super::{manifest_entries, read_json, resolve_extracted, write_json, FileHash, CONVERT_MANIFEST};
use crate::error::StepError;
use crate::executor::StepOutput;
use crate::progress::ProgressTracker;

/// Declared inputs of `convert_manifest`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvertInput {
    pub step: String,
    pub manifest: PathBuf,
    pub manifest_hash: Option<String>,
    /// Every extracted JSON the manifest references.
    pub sources: Vec<FileHash>,
    pub pptx_root: PathBuf,
    pub layout_out: PathBuf,
    pub project_init: Option<PathBuf>,
    pub project_init_hash: Option<String>,
}

impl ConvertInput {
    pub fn new(
        manifest: &Path,
        pptx_root: &Path,
        layout_out: &Path,
        project_init: Option<&Path>,
    ) -> Result<Self, StepError> {
        let sources = match read_json(manifest) {
            Ok(m) => manifest_entries(&m)
                .iter()
                .map(|e| {
                    resolve_extracted(pptx_root, &e.json)
                        .map(|p| FileHash::of(&p))
                        .unwrap_or(FileHash {
                            path: pptx_root.join(&e.json).to_string_lossy().into_owned(),
                            hash: None,
                        })
                })
                .collect(),
            Err(_) => Vec::new(),
        };
        Ok(Self {
            step: CONVERT_MANIFEST.to_string(),
            manifest: manifest.to_path_buf(),
            manifest_hash: FileHash::of(manifest).hash,
            sources,
            pptx_root: pptx_root.to_path_buf(),
            layout_out: layout_out.to_path_buf(),
            project_init: project_init.map(Path::to_path_buf),
            project_init_hash: project_init.and_then(|p| FileHash::of(p).hash),
        })
    }
}

// ---------------------------------------------------------------------------
// Conversion
// ---------------------------------------------------------------------------

/// Page geometry, layer names and typography used for converted decks.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertOptions {
    pub width_px: f64,
    pub height_px: f64,
    pub dpi: f64,
    pub include_ignored_text_boxes: bool,
    pub ignored_as_overlay: bool,

    pub layer_bg: &'static str,
    pub layer_text: &'static str,
    pub layer_images: &'static str,
    pub layer_images_bg: &'static str,
    pub layer_wrap: &'static str,
    pub layer_overlay: &'static str,

    pub font_family: &'static str,
    pub font_size_body: f64,
    pub font_size_title: f64,
    pub font_size_h2: f64,
    pub font_size_quote: f64,

    pub title_color: &'static str,
    pub body_color: &'static str,
    pub quote_color: &'static str,
    pub box_bg_color: &'static str,
    pub box_text_color: &'static str,
    pub box_pad_mm: f64,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            width_px: 2480.0,
            height_px: 3508.0,
            dpi: 300.0,
            include_ignored_text_boxes: false,
            ignored_as_overlay: true,
            layer_bg: "Background",
            layer_text: "Text",
            layer_images: "Images",
            layer_images_bg: "Images_BG",
            layer_wrap: "Wrap",
            layer_overlay: "Overlay",
            font_family: "Arial",
            font_size_body: 12.0,
            font_size_title: 20.0,
            font_size_h2: 14.0,
            font_size_quote: 10.0,
            title_color: "#C9A227",
            body_color: "#000000",
            quote_color: "#333333",
            box_bg_color: "#333333",
            box_text_color: "#FFFFFF",
            box_pad_mm: 2.5,
        }
    }
}

impl ConvertOptions {
    /// Relative `[x1, y1, x2, y2]` to a page bbox, clamped to the page.
    fn bbox_from_rel(&self, rel: &[f64; 4]) -> Map<String, Value> {
        let [x1, y1, x2, y2] = *rel;
        let x = (x1 * self.width_px).clamp(0.0, self.width_px);
        let y = (y1 * self.height_px).clamp(0.0, self.height_px);
        let w = ((x2 - x1) * self.width_px).min(self.width_px - x).max(1.0);
        let h = ((y2 - y1) * self.height_px).min(self.height_px - y).max(1.0);
        bbox(x, y, w, h)
    }

    fn inset(&self, b: &Map<String, Value>) -> Map<String, Value> {
        let pad = mm_to_px(self.box_pad_mm, self.dpi);
        let get = |k: &str| as_f64(b.get(k)).unwrap_or(0.0);
        bbox(
            get("x") + pad,
            get("y") + pad,
            (get("w") - 2.0 * pad).max(1.0),
            (get("h") - 2.0 * pad).max(1.0),
        )
    }

    fn layer_for_role(&self, role: &str) -> &'static str {
        match role.to_lowercase().as_str() {
            "" => self.layer_text,
            "background" | "hintergrund" => self.layer_bg,
            r if r.contains("image") => self.layer_images,
            "overlay" | "captionoverlay" | "caption" | "infobox" => self.layer_overlay,
            "wrap" => self.layer_wrap,
            _ => self.layer_text,
        }
    }

    fn z_order(&self, layer: &str, role: &str) -> i64 {
        if layer == self.layer_bg {
            0
        } else if layer == self.layer_images_bg {
            10
        } else if layer == self.layer_images {
            20
        } else if layer == self.layer_text {
            match role.to_lowercase().as_str() {
                "title" | "h1" | "headline" => 35,
                "h2" => 34,
                "quote" => 32,
                _ => 30,
            }
        } else if layer == self.layer_overlay {
            40
        } else if layer == self.layer_wrap {
            50
        } else {
            30
        }
    }

    fn text_style(&self, role: &str) -> Value {
        let (size, weight, color, pstyle) = match role.to_lowercase().as_str() {
            "title" | "h1" | "headline" => (self.font_size_title, "bold", self.title_color, "Title_Gold"),
            "h2" => (self.font_size_h2, "bold", self.body_color, "H2_Black"),
            "quote" => (self.font_size_quote, "normal", self.quote_color, "Body_Garamond"),
            "sidebar" => (self.font_size_body, "normal", self.box_text_color, "Sidebar"),
            _ => (self.font_size_body, "normal", self.body_color, "Body_Garamond"),
        };
        json!({
            "fontFamily": self.font_family,
            "fontSize": size,
            "fontWeight": weight,
            "color": color,
            "align": "left",
            "pStyle": pstyle,
        })
    }

    fn background_rect(&self, id: String, b: Map<String, Value>, layer: &str, z: i64, role: &str) -> Value {
        json!({
            "id": id,
            "type": "rectangle",
            "bbox": b,
            "layer": layer,
            "zOrder": z,
            "role": role,
            "fillColor": self.box_bg_color,
            "fillOpacity": 1.0,
            "strokeWidth": 0,
            "strokeOpacity": 0.0,
        })
    }
}

fn bbox(x: f64, y: f64, w: f64, h: f64) -> Map<String, Value> {
    let mut m = Map::new();
    m.insert("x".into(), json!(x));
    m.insert("y".into(), json!(y));
    m.insert("w".into(), json!(w));
    m.insert("h".into(), json!(h));
    m
}

fn rel_bbox(item: &Value) -> Option<[f64; 4]> {
    let arr = item.get("rel_bbox")?.as_array()?;
    if arr.len() != 4 {
        return None;
    }
    Some([
        arr[0].as_f64()?,
        arr[1].as_f64()?,
        arr[2].as_f64()?,
        arr[3].as_f64()?,
    ])
}

fn items<'a>(slide: &'a Value, key: &str) -> impl Iterator<Item = &'a Value> {
    slide.get(key).and_then(Value::as_array).into_iter().flatten()
}

fn text_of(item: &Value) -> &str {
    item.get("text").and_then(Value::as_str).unwrap_or("")
}

/// Convert one extracted deck (`slides[]` with `infoboxes`, `text_boxes`
/// and `image_boxes`) into a layout descriptor, one page per slide.
pub fn convert_extracted(extracted: &Value, opts: &ConvertOptions) -> Value {
    let mut pages = Vec::new();

    for slide in items(extracted, "slides") {
        let slide_no = as_f64(slide.get("slide")).unwrap_or(0.0) as i64;
        let page_number = if slide_no > 0 { slide_no } else { pages.len() as i64 + 1 };
        let mut objects: Vec<Value> = Vec::new();
        let mut idx = 0usize;
        let mut next_id = |kind: &str| {
            let id = format!("s{page_number:03}_{kind}_{idx}");
            idx += 1;
            id
        };

        for ibox in items(slide, "infoboxes") {
            let Some(rel) = rel_bbox(ibox) else { continue };
            let outer = opts.bbox_from_rel(&rel);
            let inner = opts.inset(&outer);
            objects.push(opts.background_rect(next_id("ibox_bg"), outer, opts.layer_overlay, 39, "infobox_bg"));
            objects.push(json!({
                "id": next_id("ibox_text"),
                "type": "text",
                "bbox": inner,
                "layer": opts.layer_overlay,
                "zOrder": 40,
                "role": "infobox",
                "content": text_of(ibox),
                "fontFamily": opts.font_family,
                "fontSize": opts.font_size_body,
                "fontWeight": "normal",
                "color": opts.box_text_color,
                "align": "left",
                "pStyle": "Sidebar",
                "columns": 1,
                "columnGap": 0,
            }));
        }

        for tb in items(slide, "text_boxes") {
            let declared_role = tb.get("role").and_then(Value::as_str).unwrap_or("").trim();
            let mut layer_role = declared_role;
            if tb.get("ignore") == Some(&Value::Bool(true)) && !opts.include_ignored_text_boxes {
                if !opts.ignored_as_overlay {
                    continue;
                }
                layer_role = "overlay";
            }
            let Some(rel) = rel_bbox(tb) else { continue };

            let layer = opts.layer_for_role(layer_role);
            let mut b = opts.bbox_from_rel(&rel);
            let role_norm = if declared_role.is_empty() { layer_role } else { declared_role };

            if role_norm.eq_ignore_ascii_case("sidebar") {
                let z = opts.z_order(opts.layer_wrap, "sidebar_bg");
                objects.push(opts.background_rect(next_id("sidebar_bg"), b.clone(), opts.layer_wrap, z, "sidebar_bg"));
                b = opts.inset(&b);
            }

            let role_value = if role_norm.is_empty() { Value::Null } else { json!(role_norm) };
            let mut obj = json!({
                "id": next_id("text"),
                "type": "text",
                "bbox": b,
                "layer": layer,
                "zOrder": opts.z_order(layer, declared_role),
                "role": role_value,
                "content": text_of(tb),
                "columns": 1,
                "columnGap": 0,
            });
            if let (Some(target), Value::Object(style)) = (obj.as_object_mut(), opts.text_style(declared_role)) {
                target.extend(style);
            }
            objects.push(obj);
        }

        for (i, ib) in items(slide, "image_boxes").enumerate() {
            let Some(rel) = rel_bbox(ib) else { continue };
            let source_slide = if slide_no > 0 { slide_no } else { page_number };
            objects.push(json!({
                "id": next_id("img"),
                "type": "image",
                "bbox": opts.bbox_from_rel(&rel),
                "layer": opts.layer_images,
                "zOrder": opts.z_order(opts.layer_images, ""),
                "role": "image",
                "sourceSlide": source_slide,
                "sourceIndex": i,
                "sourceKind": "image_box",
                "imageUrl": ib.get("image").and_then(Value::as_str).unwrap_or(""),
                "scaleToFrame": true,
                "maintainAspectRatio": true,
            }));
        }

        pages.push(json!({ "pageNumber": page_number, "objects": objects }));
    }

    if pages.is_empty() {
        pages.push(json!({ "pageNumber": 1, "objects": [] }));
    }

    json!({
        "version": "1.0.0",
        "document": { "width": opts.width_px, "height": opts.height_px, "dpi": opts.dpi },
        "pages": pages,
        "meta": {
            "grid": { "cols": 6, "gutter_mm": 5.0, "body_cols": 4, "side_cols": 2, "baseline_mm": 4.0 },
            "layers": {
                "background": opts.layer_bg,
                "images_bg": opts.layer_images_bg,
                "images": opts.layer_images,
                "text": opts.layer_text,
                "wrap": opts.layer_wrap,
                "overlay": opts.layer_overlay,
            }
        },
        "source": {
            "kind": "pptx_extract_json",
            "name": extracted.get("name").cloned().unwrap_or(Value::Null),
            "path": extracted.get("source").cloned().unwrap_or(Value::Null),
        }
    })
}

// ---------------------------------------------------------------------------
// Chapter metadata from project_init.json
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ChapterInfo {
    pub chapter: i64,
    pub act: Option<i64>,
    pub act_title: Option<String>,
}

/// Resolve `chapter_map[].{pptx, chapter}` and the enclosing `acts[]` entry
/// (`chapters` is either an inclusive `[start, end]` range or a list).
pub fn chapter_info(project: &ProjectConfig, deck_name: &str) -> Option<ChapterInfo> {
    let raw = project.raw();
    let chapter = raw
        .get("chapter_map")
        .and_then(Value::as_array)?
        .iter()
        .find(|e| e.get("pptx").and_then(Value::as_str) == Some(deck_name))
        .and_then(|e| as_f64(e.get("chapter")))? as i64;

    let act = raw
        .get("acts")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .find(|act| {
            let chapters: Vec<i64> = act
                .get("chapters")
                .and_then(Value::as_array)
                .map(|c| c.iter().filter_map(|v| as_f64(Some(v)).map(|n| n as i64)).collect())
                .unwrap_or_default();
            match chapters.as_slice() {
                [start, end] => (*start..=*end).contains(&chapter),
                list => list.contains(&chapter),
            }
        });

    Some(ChapterInfo {
        chapter,
        act: act.and_then(|a| as_f64(a.get("act"))).map(|n| n as i64),
        act_title: act
            .and_then(|a| a.get("title"))
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

pub fn run(input: ConvertInput, tracker: &ProgressTracker) -> Result<StepOutput, StepError> {
    let manifest = read_json(&input.manifest)?;
    let project = ProjectConfig::load_optional(input.project_init.as_deref())
        .map_err(|e| StepError::Configuration(e.to_string()))?;
    let opts = ConvertOptions::default();

    tracker.emit("convert.start", json!({ "manifest": input.manifest.to_string_lossy() }));

    let mut outputs = Vec::new();
    let mut invalid = Vec::new();
    let mut valid = 0usize;

    for entry in manifest_entries(&manifest) {
        let src = resolve_extracted(&input.pptx_root, &entry.json).ok_or_else(|| {
            StepError::action(format!(
                "Extracted file for '{}' not found: {}",
                entry.name,
                input.pptx_root.join(&entry.json).display()
            ))
        })?;
        let extracted = read_json(&src)?;
        let mut doc = convert_extracted(&extracted, &opts);

        let mut out_name = format!("{}.layout.json", entry.name);
        if let Some(info) = chapter_info(&project, &entry.name) {
            if let Some(source) = doc.get_mut("source").and_then(Value::as_object_mut) {
                source.insert("chapter".into(), json!(info.chapter));
                source.insert("act".into(), json!(info.act));
                source.insert("act_title".into(), json!(info.act_title));
            }
            out_name = format!("chapter_{:02}_{}.layout.json", info.chapter, entry.name);
        }

        let out_path = input.layout_out.join(out_name);
        write_json(&out_path, &doc)?;

        let errors = layout::validate_descriptor(&doc);
        if errors.is_empty() {
            valid += 1;
        } else {
            invalid.push(json!({
                "path": out_path.to_string_lossy(),
                "errors": errors.iter().map(ToString::to_string).collect::<Vec<_>>(),
            }));
        }
        outputs.push(out_path.to_string_lossy().into_owned());
    }

    tracker.emit(
        "convert.done",
        json!({ "outputs": outputs.len(), "valid": valid, "invalid": invalid.len() }),
    );

    Ok(StepOutput::new(outputs.clone())
        .with_summary(json!({ "valid": valid, "invalid": invalid.len() }))
        .with_report(json!({ "outputs": outputs, "valid": valid, "invalid": invalid })))
}
