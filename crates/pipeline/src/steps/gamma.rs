//! `gamma_sync`: crop slide regions out of exported slide PNGs.
//!
//! For each manifest entry the action opens `<gamma_dir>/<name>.zip`, picks
//! the PNG whose file name starts with the slide number, and writes one
//! crop per requested box to `<out>/<name>/slide_NNN/<kind>_NN.png`.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use image::{ImageFormat, RgbaImage};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use pressline_core::hashing::hash_dir;
use pressline_core::layout::as_f64;

use super::{manifest_entries, read_json, resolve_extracted, tmp_path, GAMMA_SYNC};
use crate::config::CropParams;
use crate::error::StepError;
use crate::executor::StepOutput;
use crate::progress::ProgressTracker;

pub const KIND_INFOBOX: &str = "infobox";
pub const KIND_IMAGE_BOX: &str = "image_box";

/// Declared inputs of `gamma_sync`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GammaInput {
    pub step: String,
    pub manifest: PathBuf,
    pub manifest_hash: Option<String>,
    pub extracted_root: PathBuf,
    pub gamma_dir: PathBuf,
    /// Listing plus per-file hashes of the crop sources.
    pub gamma_dir_hash: Option<String>,
    pub crops_out: PathBuf,
    pub crop_kinds: Vec<String>,
    pub pad_px: u32,
    pub refine: bool,
    pub refine_margin_px: u32,
    pub bg_threshold: u8,
}

impl GammaInput {
    pub fn new(
        manifest: &Path,
        manifest_hash: Option<String>,
        extracted_root: &Path,
        gamma_dir: &Path,
        crops_out: &Path,
        crop_kinds: &[String],
        crop: CropParams,
    ) -> Self {
        Self {
            step: GAMMA_SYNC.to_string(),
            manifest: manifest.to_path_buf(),
            manifest_hash,
            extracted_root: extracted_root.to_path_buf(),
            gamma_dir: gamma_dir.to_path_buf(),
            gamma_dir_hash: hash_dir(gamma_dir).ok(),
            crops_out: crops_out.to_path_buf(),
            crop_kinds: crop_kinds.to_vec(),
            pad_px: crop.pad_px,
            refine: crop.refine,
            refine_margin_px: crop.refine_margin_px,
            bg_threshold: crop.bg_threshold,
        }
    }

    fn params(&self) -> CropParams {
        CropParams {
            pad_px: self.pad_px,
            refine: self.refine,
            refine_margin_px: self.refine_margin_px,
            bg_threshold: self.bg_threshold,
        }
    }
}

// ---------------------------------------------------------------------------
// Pixel boxes
// ---------------------------------------------------------------------------

/// `(left, upper, right, lower)` in pixels, right/lower exclusive.
pub type PixelBox = (i64, i64, i64, i64);

/// Relative `[x1, y1, x2, y2]` to pixels, never empty.
pub fn rel_to_px(rel: [f64; 4], width: u32, height: u32) -> PixelBox {
    let (w, h) = (i64::from(width), i64::from(height));
    let scale = |v: f64, n: i64| (v.clamp(0.0, 1.0) * n as f64).round() as i64;
    let (l, u) = (scale(rel[0], w), scale(rel[1], h));
    let (mut r, mut d) = (scale(rel[2], w), scale(rel[3], h));
    if r <= l {
        r = (l + 1).min(w);
    }
    if d <= u {
        d = (u + 1).min(h);
    }
    (l, u, r, d)
}

fn clamp_box(b: PixelBox, width: u32, height: u32) -> PixelBox {
    let (w, h) = (i64::from(width), i64::from(height));
    let (l, u) = (b.0.clamp(0, w), b.1.clamp(0, h));
    let (mut r, mut d) = (b.2.clamp(0, w), b.3.clamp(0, h));
    if r <= l {
        r = (l + 1).min(w);
    }
    if d <= u {
        d = (u + 1).min(h);
    }
    (l, u, r, d)
}

fn pad_box(b: PixelBox, pad: i64) -> PixelBox {
    (b.0 - pad, b.1 - pad, b.2 + pad, b.3 + pad)
}

/// Grow `base` to the bounding box of foreground pixels found within
/// `margin` pixels around it. Foreground is any non-transparent pixel with
/// at least one channel below `bg_threshold`.
pub fn refine_box(image: &RgbaImage, base: PixelBox, margin: u32, bg_threshold: u8) -> PixelBox {
    let (width, height) = image.dimensions();
    let base = clamp_box(base, width, height);
    let search = clamp_box(pad_box(base, i64::from(margin)), width, height);

    let mut found: Option<PixelBox> = None;
    for y in search.1..search.3 {
        for x in search.0..search.2 {
            let px = image.get_pixel(x as u32, y as u32).0;
            let background = px[0] >= bg_threshold && px[1] >= bg_threshold && px[2] >= bg_threshold;
            if background || px[3] == 0 {
                continue;
            }
            found = Some(match found {
                None => (x, y, x + 1, y + 1),
                Some((l, u, r, d)) => (l.min(x), u.min(y), r.max(x + 1), d.max(y + 1)),
            });
        }
    }

    found.map_or(base, |b| clamp_box(b, width, height))
}

/// Crop `rel` out of `image` and write it as PNG to `out_path`.
pub fn crop_to_file(
    image: &RgbaImage,
    rel: [f64; 4],
    out_path: &Path,
    params: &CropParams,
) -> Result<PixelBox, StepError> {
    let (width, height) = image.dimensions();
    let base = rel_to_px(rel, width, height);
    let mut bbox = clamp_box(pad_box(base, i64::from(params.pad_px)), width, height);
    if params.refine {
        bbox = refine_box(image, bbox, params.refine_margin_px, params.bg_threshold);
    }

    let (l, u, r, d) = bbox;
    let cropped =
        image::imageops::crop_imm(image, l as u32, u as u32, (r - l) as u32, (d - u) as u32).to_image();

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = tmp_path(out_path);
    cropped
        .save_with_format(&tmp, ImageFormat::Png)
        .map_err(|e| StepError::action(format!("Cannot write {}: {e}", out_path.display())))?;
    std::fs::rename(&tmp, out_path)?;
    Ok(bbox)
}

// ---------------------------------------------------------------------------
// Slide PNGs inside export archives
// ---------------------------------------------------------------------------

/// Find the PNG for `slide` inside an export archive. Exports name slides
/// like `10_Title.png`; the first PNG is the fallback.
pub fn find_slide_png(names: &[String], slide: i64) -> Option<String> {
    let prefixes = [
        format!("{slide:02}_"),
        format!("{slide:03}_"),
        format!("slide_{slide:03}"),
        format!("slide{slide:03}"),
        format!("{slide}_"),
    ];
    let pngs: Vec<&String> = names
        .iter()
        .filter(|n| n.to_lowercase().ends_with(".png"))
        .collect();

    prefixes
        .iter()
        .find_map(|prefix| {
            pngs.iter().find(|n| {
                let base = n.rsplit(['/', '\\']).next().unwrap_or(n);
                base.starts_with(prefix.as_str())
            })
        })
        .or_else(|| pngs.first())
        .map(|n| n.to_string())
}

struct SlideArchive {
    archive: zip::ZipArchive<File>,
    names: Vec<String>,
}

impl SlideArchive {
    fn open(path: &Path) -> Result<Self, StepError> {
        let file = File::open(path)?;
        let archive = zip::ZipArchive::new(file)
            .map_err(|e| StepError::action(format!("Invalid archive {}: {e}", path.display())))?;
        let names = archive.file_names().map(str::to_string).collect();
        Ok(Self { archive, names })
    }

    fn load_png(&mut self, member: &str) -> Result<RgbaImage, StepError> {
        let mut entry = self
            .archive
            .by_name(member)
            .map_err(|e| StepError::action(format!("Missing archive member {member}: {e}")))?;
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes)?;
        let img = image::load_from_memory(&bytes)
            .map_err(|e| StepError::action(format!("Cannot decode {member}: {e}")))?;
        Ok(img.to_rgba8())
    }
}

// ---------------------------------------------------------------------------
// Crop outputs in the file tree
// ---------------------------------------------------------------------------

/// A crop identified by its location in the output tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CropRef {
    pub deck: String,
    pub slide: i64,
    pub kind: String,
    pub index: i64,
}

fn file_prefix(kind: &str) -> &str {
    if kind == KIND_INFOBOX {
        "infobox"
    } else {
        "image"
    }
}

/// Output path for a crop.
pub fn crop_path(out: &Path, deck: &str, slide: i64, kind: &str, index: usize) -> PathBuf {
    out.join(deck)
        .join(format!("slide_{slide:03}"))
        .join(format!("{}_{index:02}.png", file_prefix(kind)))
}

/// Parse `.../<deck>/slide_NNN/<infobox|image>_NN.png` back into a [`CropRef`].
pub fn parse_crop_path(path: &str) -> Option<CropRef> {
    let mut parts = path.rsplit(['/', '\\']);
    let file = parts.next()?;
    let slide_dir = parts.next()?;
    let deck = parts.next()?;

    let stem = file.strip_suffix(".png")?;
    let (prefix, index) = stem.rsplit_once('_')?;
    let kind = match prefix {
        "infobox" => KIND_INFOBOX,
        "image" => KIND_IMAGE_BOX,
        _ => return None,
    };
    Some(CropRef {
        deck: deck.to_string(),
        slide: slide_dir.strip_prefix("slide_")?.parse().ok()?,
        kind: kind.to_string(),
        index: index.parse().ok()?,
    })
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

fn rel_bbox(item: &Value) -> Option<[f64; 4]> {
    let arr = item.get("rel_bbox")?.as_array()?;
    if arr.len() != 4 {
        return None;
    }
    Some([arr[0].as_f64()?, arr[1].as_f64()?, arr[2].as_f64()?, arr[3].as_f64()?])
}

pub fn run(input: GammaInput, tracker: &ProgressTracker) -> Result<StepOutput, StepError> {
    let manifest = read_json(&input.manifest)?;
    let entries = manifest_entries(&manifest);
    let params = input.params();
    std::fs::create_dir_all(&input.crops_out)?;

    tracker.emit(
        "gamma_sync.start",
        json!({ "files": entries.len(), "out_dir": input.crops_out.to_string_lossy() }),
    );

    let mut outputs: Vec<Value> = Vec::new();
    let mut errors: Vec<Value> = Vec::new();

    for entry in &entries {
        let name = entry.name.as_str();
        let extracted = match resolve_extracted(&input.extracted_root, &entry.json).map(|p| read_json(&p)) {
            Some(Ok(v)) => v,
            Some(Err(e)) => {
                errors.push(json!({ "pptx": name, "error": format!("failed to read extracted json: {e}") }));
                continue;
            }
            None => {
                errors.push(json!({ "pptx": name, "error": "failed to read extracted json: not found" }));
                continue;
            }
        };

        let zip_path = input.gamma_dir.join(format!("{name}.zip"));
        if !zip_path.exists() {
            errors.push(json!({ "pptx": name, "error": format!("gamma zip not found: {}", zip_path.display()) }));
            continue;
        }
        let mut archive = SlideArchive::open(&zip_path)?;

        let slides = extracted.get("slides").and_then(Value::as_array).cloned().unwrap_or_default();
        for slide in &slides {
            let slide_no = as_f64(slide.get("slide")).unwrap_or(0.0) as i64;
            if slide_no <= 0 {
                continue;
            }
            let Some(member) = find_slide_png(&archive.names, slide_no) else {
                errors.push(json!({ "pptx": name, "slide": slide_no, "error": "no png in zip" }));
                continue;
            };
            let image = match archive.load_png(&member) {
                Ok(img) => img,
                Err(e) => {
                    errors.push(json!({ "pptx": name, "slide": slide_no, "error": format!("failed to load png: {e}") }));
                    continue;
                }
            };

            for (kind, key) in [(KIND_INFOBOX, "infoboxes"), (KIND_IMAGE_BOX, "image_boxes")] {
                if !input.crop_kinds.iter().any(|k| k == kind) {
                    continue;
                }
                let boxes = slide.get(key).and_then(Value::as_array).cloned().unwrap_or_default();
                for (i, item) in boxes.iter().enumerate() {
                    let Some(rel) = rel_bbox(item) else { continue };
                    let out_path = crop_path(&input.crops_out, name, slide_no, kind, i);
                    match crop_to_file(&image, rel, &out_path, &params) {
                        Ok(bbox) => outputs.push(json!({
                            "pptx": name,
                            "slide": slide_no,
                            "box_index": i,
                            "kind": kind,
                            "member": member,
                            "out": out_path.to_string_lossy(),
                            "bbox_px": [bbox.0, bbox.1, bbox.2, bbox.3],
                            "rel_bbox": rel,
                        })),
                        Err(e) => errors.push(json!({
                            "pptx": name, "slide": slide_no, "kind": kind, "error": e.to_string()
                        })),
                    }
                }
            }
        }
    }

    tracker.emit(
        "gamma_sync.done",
        json!({ "outputs": outputs.len(), "errors": errors.len() }),
    );

    let paths: Vec<String> = outputs
        .iter()
        .filter_map(|o| o.get("out").and_then(Value::as_str).map(str::to_string))
        .collect();
    Ok(StepOutput::new(paths)
        .with_summary(json!({ "outputs": outputs.len(), "errors": errors.len() }))
        .with_report(json!({ "outputs": outputs, "errors": errors })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use std::io::Write;

    fn white_with_block() -> RgbaImage {
        let mut img = RgbaImage::from_pixel(100, 100, Rgba([255, 255, 255, 255]));
        for y in 20..40 {
            for x in 30..60 {
                img.put_pixel(x, y, Rgba([10, 10, 10, 255]));
            }
        }
        img
    }

    // -- boxes ----------------------------------------------------------------

    #[test]
    fn rel_to_px_rounds_and_never_collapses() {
        assert_eq!(rel_to_px([0.1, 0.2, 0.5, 0.6], 100, 50), (10, 10, 50, 30));
        assert_eq!(rel_to_px([0.5, 0.5, 0.5, 0.5], 100, 100), (50, 50, 51, 51));
        assert_eq!(rel_to_px([-1.0, 0.0, 2.0, 1.0], 10, 10), (0, 0, 10, 10));
    }

    #[test]
    fn refine_grows_to_foreground() {
        let img = white_with_block();
        let refined = refine_box(&img, (35, 25, 40, 30), 40, 245);
        assert_eq!(refined, (30, 20, 60, 40));
    }

    #[test]
    fn refine_keeps_base_when_only_background() {
        let img = RgbaImage::from_pixel(50, 50, Rgba([250, 250, 250, 255]));
        assert_eq!(refine_box(&img, (5, 5, 10, 10), 10, 245), (5, 5, 10, 10));
    }

    #[test]
    fn find_slide_png_prefers_numbered_prefix() {
        let names = vec![
            "export/01_Intro.png".to_string(),
            "export/10_Title.png".to_string(),
            "notes.txt".to_string(),
        ];
        assert_eq!(find_slide_png(&names, 10).as_deref(), Some("export/10_Title.png"));
        assert_eq!(find_slide_png(&names, 7).as_deref(), Some("export/01_Intro.png"));
        assert!(find_slide_png(&["a.txt".to_string()], 1).is_none());
    }

    #[test]
    fn crop_path_round_trips_through_parser() {
        let p = crop_path(Path::new("/out"), "deck", 3, KIND_IMAGE_BOX, 2);
        assert!(p.ends_with("deck/slide_003/image_02.png"));
        let parsed = parse_crop_path(&p.to_string_lossy()).unwrap();
        assert_eq!(
            parsed,
            CropRef { deck: "deck".into(), slide: 3, kind: KIND_IMAGE_BOX.into(), index: 2 }
        );
        assert!(parse_crop_path("/out/deck/slide_003/other_01.png").is_none());
    }

    // -- action ---------------------------------------------------------------

    #[test]
    fn run_crops_every_requested_box() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("pptx");
        std::fs::create_dir_all(root.join("json")).unwrap();
        std::fs::write(
            root.join("json/deck.json"),
            json!({"slides": [{"slide": 1,
                "image_boxes": [{"rel_bbox": [0.3, 0.2, 0.6, 0.4]}],
                "infoboxes": [{"rel_bbox": [0.0, 0.0, 0.1, 0.1]}]}]})
            .to_string(),
        )
        .unwrap();
        let manifest = root.join("manifest.json");
        std::fs::write(&manifest, json!({"files": [{"name": "deck", "json": "json/deck.json"}]}).to_string()).unwrap();

        let gamma_dir = dir.path().join("gamma");
        std::fs::create_dir_all(&gamma_dir).unwrap();
        let mut png = std::io::Cursor::new(Vec::new());
        white_with_block().write_to(&mut png, ImageFormat::Png).unwrap();
        let mut zip = zip::ZipWriter::new(File::create(gamma_dir.join("deck.zip")).unwrap());
        zip.start_file("01_Cover.png", zip::write::SimpleFileOptions::default()).unwrap();
        zip.write_all(png.get_ref()).unwrap();
        zip.finish().unwrap();

        let out = dir.path().join("crops");
        let input = GammaInput::new(
            &manifest,
            None,
            &root,
            &gamma_dir,
            &out,
            &["infobox".to_string(), "image_box".to_string()],
            CropParams::default(),
        );
        assert!(input.gamma_dir_hash.is_some());

        let output = run(input, &ProgressTracker::new()).unwrap();
        assert_eq!(output.outputs.len(), 2);
        assert!(out.join("deck/slide_001/image_00.png").exists());
        assert!(out.join("deck/slide_001/infobox_00.png").exists());
        assert_eq!(output.summary["errors"], 0);
    }

    #[test]
    fn missing_archive_is_reported_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("json")).unwrap();
        std::fs::write(dir.path().join("json/deck.json"), r#"{"slides": []}"#).unwrap();
        let manifest = dir.path().join("manifest.json");
        std::fs::write(&manifest, json!({"files": [{"name": "deck", "json": "json/deck.json"}]}).to_string()).unwrap();

        let input = GammaInput::new(
            &manifest,
            None,
            dir.path(),
            &dir.path().join("gamma"),
            &dir.path().join("crops"),
            &["image_box".to_string()],
            CropParams::default(),
        );
        let output = run(input, &ProgressTracker::new()).unwrap();
        assert!(output.outputs.is_empty());
        assert_eq!(output.summary["errors"], 1);
    }
}
