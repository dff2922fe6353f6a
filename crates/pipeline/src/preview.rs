//! Placeholder print outputs: a page-sized PDF skeleton and PNG wireframes.
//!
//! Neither is a faithful rendering. The PDF carries one empty page per
//! layout page at the document size; the PNGs draw every object's bounding
//! box so a reviewer can see placement at a glance.

use std::fmt::Write as _;
use std::io::Cursor;

use image::{ImageFormat, Rgb, RgbImage};
use serde_json::{Map, Value};

use pressline_core::layout::{self, as_f64, str_field, BBox};

use crate::sla::{hex_to_rgb, px_to_pt};

/// Width of PNG previews in pixels.
pub const PREVIEW_WIDTH: u32 = 400;

/// A minimal PDF with one blank page per layout page.
pub fn placeholder_pdf(doc: &Value) -> Vec<u8> {
    let (width, height, dpi) = layout::document_dims(doc);
    let w = px_to_pt(if width > 0.0 { width } else { 2480.0 }, dpi);
    let h = px_to_pt(if height > 0.0 { height } else { 3508.0 }, dpi);
    let page_count = layout::pages(doc).count().max(1);

    // Objects: 1 catalog, 2 page tree, 3.. pages.
    let mut objects = Vec::with_capacity(page_count + 2);
    objects.push("<< /Type /Catalog /Pages 2 0 R >>".to_string());
    let kids: Vec<String> = (0..page_count).map(|i| format!("{} 0 R", i + 3)).collect();
    objects.push(format!("<< /Type /Pages /Kids [{}] /Count {page_count} >>", kids.join(" ")));
    for _ in 0..page_count {
        objects.push(format!("<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {w} {h}] >>"));
    }

    let mut pdf = String::from("%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        let _ = write!(pdf, "{} 0 obj\n{body}\nendobj\n", i + 1);
    }
    let xref = pdf.len();
    let _ = write!(pdf, "xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
    for offset in offsets {
        let _ = writeln!(pdf, "{offset:010} 00000 n ");
    }
    let _ = write!(
        pdf,
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref}\n%%EOF\n",
        objects.len() + 1
    );
    pdf.into_bytes()
}

fn outline_color(obj: &Map<String, Value>) -> Rgb<u8> {
    match str_field(obj, "type") {
        "image" => Rgb([70, 130, 180]),
        "rectangle" => {
            let (r, g, b) = hex_to_rgb(str_field(obj, "fillColor"));
            Rgb([r, g, b])
        }
        _ => Rgb([40, 40, 40]),
    }
}

fn draw_outline(img: &mut RgbImage, b: BBox, scale: f64, color: Rgb<u8>) {
    let (iw, ih) = img.dimensions();
    if iw == 0 || ih == 0 {
        return;
    }
    let to_px = |v: f64, max: u32| ((v * scale).round().max(0.0) as u32).min(max - 1);
    let (x0, y0) = (to_px(b.x, iw), to_px(b.y, ih));
    let (x1, y1) = (to_px(b.right(), iw), to_px(b.bottom(), ih));
    for x in x0..=x1 {
        img.put_pixel(x, y0, color);
        img.put_pixel(x, y1, color);
    }
    for y in y0..=y1 {
        img.put_pixel(x0, y, color);
        img.put_pixel(x1, y, color);
    }
}

/// PNG wireframe of one page.
pub fn page_preview_png(doc: &Value, page: &Map<String, Value>) -> Result<Vec<u8>, image::ImageError> {
    let (width, height, _) = layout::document_dims(doc);
    let (width, height) = if width > 0.0 && height > 0.0 { (width, height) } else { (2480.0, 3508.0) };
    let scale = f64::from(PREVIEW_WIDTH) / width;
    let preview_h = ((height * scale).round() as u32).max(1);

    let mut img = RgbImage::from_pixel(PREVIEW_WIDTH, preview_h, Rgb([255, 255, 255]));
    for obj in layout::page_objects(page) {
        if let Some(b) = BBox::from_value(obj.get("bbox")) {
            draw_outline(&mut img, b, scale, outline_color(obj));
        }
    }

    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}

/// PNG wireframes for every page, keyed by page number.
pub fn page_previews(doc: &Value) -> Result<Vec<(i64, Vec<u8>)>, image::ImageError> {
    layout::pages(doc)
        .map(|page| {
            let number = as_f64(page.get("pageNumber")).map_or(1, |n| n as i64);
            Ok((number, page_preview_png(doc, page)?))
        })
        .collect()
}
