//! Layout descriptor to Scribus SLA (1.5.8) XML.

use std::fmt::Write as _;

use serde_json::{Map, Value};

use pressline_core::layout::{self, as_f64, str_field};

const SLA_VERSION: &str = "1.5.8";

/// Pixels to points at `dpi`, rounded to two decimals.
pub fn px_to_pt(px: f64, dpi: f64) -> f64 {
    let dpi = if dpi > 0.0 { dpi } else { 300.0 };
    ((px / dpi) * 72.0 * 100.0).round() / 100.0
}

/// `#rrggbb` to RGB; anything else is black.
pub fn hex_to_rgb(hex: &str) -> (u8, u8, u8) {
    let digits = hex.trim_start_matches('#');
    if digits.len() != 6 {
        return (0, 0, 0);
    }
    let channel = |i: usize| digits.get(i..i + 2).and_then(|s| u8::from_str_radix(s, 16).ok());
    match (channel(0), channel(2), channel(4)) {
        (Some(r), Some(g), Some(b)) => (r, g, b),
        _ => (0, 0, 0),
    }
}

/// Scribus color notation: channels scaled to `0..1` with three decimals.
pub fn rgb_to_scribus((r, g, b): (u8, u8, u8)) -> String {
    let f = |c: u8| f64::from(c) / 255.0;
    format!("{:.3},{:.3},{:.3}", f(r), f(g), f(b))
}

/// Stacking order: the explicit `zOrder`, else the layer default.
pub fn layer_z_order(layer: &str, z_order: Option<f64>) -> f64 {
    if let Some(z) = z_order {
        return z;
    }
    match layer {
        "Background" => 0.0,
        "Images_BG" => 10.0,
        "Images" => 20.0,
        "Text" => 30.0,
        "Overlay" => 40.0,
        "Wrap" => 50.0,
        _ => 30.0,
    }
}

fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\n' => out.push_str("&#10;"),
            _ => out.push(c),
        }
    }
    out
}

/// Collects `KEY="value"` pairs for one element.
struct Element {
    name: &'static str,
    attrs: Vec<(&'static str, String)>,
}

impl Element {
    fn new(name: &'static str) -> Self {
        Self { name, attrs: Vec::new() }
    }

    fn set(&mut self, key: &'static str, value: impl ToString) -> &mut Self {
        self.attrs.push((key, value.to_string()));
        self
    }

    fn open_tag(&self, indent: usize, self_closing: bool) -> String {
        let mut s = format!("{}<{}", "  ".repeat(indent), self.name);
        for (k, v) in &self.attrs {
            let _ = write!(s, " {k}=\"{}\"", escape_attr(v));
        }
        s.push_str(if self_closing { "/>\n" } else { ">\n" });
        s
    }
}

fn bbox_pt(obj: &Map<String, Value>, dpi: f64) -> (f64, f64, f64, f64) {
    let b = obj.get("bbox");
    let field = |k: &str, default: f64| as_f64(b.and_then(|b| b.get(k))).unwrap_or(default);
    (
        px_to_pt(field("x", 0.0), dpi),
        px_to_pt(field("y", 0.0), dpi),
        px_to_pt(field("w", 100.0), dpi),
        px_to_pt(field("h", 100.0), dpi),
    )
}

fn page_object(obj: &Map<String, Value>, dpi: f64, page: i64) -> Option<Element> {
    let kind = str_field(obj, "type");
    let (ptype, default_layer) = match kind {
        "rectangle" => ("4", "Background"),
        "text" => ("4", "Text"),
        "image" => ("2", "Images"),
        _ => return None,
    };
    let (x, y, w, h) = bbox_pt(obj, dpi);
    let layer = obj.get("layer").and_then(Value::as_str).unwrap_or(default_layer);

    let mut el = Element::new("PAGEOBJECT");
    el.set("PTYPE", ptype)
        .set("XPOS", x)
        .set("YPOS", y)
        .set("WIDTH", w)
        .set("HEIGHT", h)
        .set("PAGE", page)
        .set("LAYER", layer);

    let color = |key: &str, default: &str| {
        let hex = obj.get(key).and_then(Value::as_str).unwrap_or(default);
        rgb_to_scribus(hex_to_rgb(hex))
    };

    match kind {
        "rectangle" => {
            el.set("FLCOLOR", color("fillColor", "#FFFFFF"));
            let stroke = as_f64(obj.get("strokeWidth")).unwrap_or(0.0);
            if stroke > 0.0 {
                el.set("LINEW", px_to_pt(stroke, dpi))
                    .set("LINECOLOR", color("strokeColor", "#000000"));
            }
        }
        "text" => {
            let font = obj.get("fontFamily").and_then(Value::as_str).unwrap_or("Arial");
            el.set("TEXT", str_field(obj, "content"))
                .set("FONT", font)
                .set("FONTSIZE", as_f64(obj.get("fontSize")).unwrap_or(12.0))
                .set("COLOR", color("color", "#000000"));
        }
        _ => {
            let scale = obj.get("scaleToFrame").and_then(Value::as_bool).unwrap_or(true);
            el.set("PFILE", str_field(obj, "imageUrl"))
                .set("SCALETYPE", if scale { "1" } else { "0" });
        }
    }
    Some(el)
}

/// Compile a descriptor into SLA bytes.
///
/// Pages are written in page-number order and objects in stacking order.
/// Unknown object types are skipped.
pub fn compile_layout(doc: &Value) -> Vec<u8> {
    let d = doc.get("document");
    let field = |k: &str, default: f64| as_f64(d.and_then(|d| d.get(k))).unwrap_or(default);
    let dpi = field("dpi", 300.0);
    let width = px_to_pt(field("width", 2480.0), dpi);
    let height = px_to_pt(field("height", 3508.0), dpi);

    let mut pages: Vec<&Map<String, Value>> = layout::pages(doc).collect();
    pages.sort_by_key(|p| as_f64(p.get("pageNumber")).map_or(1, |n| n as i64));

    let mut document = Element::new("DOCUMENT");
    document
        .set("ANIM", "0")
        .set("ANNOT", "0")
        .set("AUTOSP", "0")
        .set("AUTOTEXT", "0")
        .set("BOOK", "0")
        .set("CHANGE", "")
        .set("CURRENTPAGE", "1")
        .set("DP", "0")
        .set("FSTPAGE", "1")
        .set("LANGUAGE", "de")
        .set("MAG", "1")
        .set("MARGPRESET", "0")
        .set("MINOR", "8")
        .set("PAGES", pages.len())
        .set("PAGEWIDTH", width)
        .set("PAGEHEIGHT", height)
        .set("UNIT", "0")
        .set("UNITR", "0");

    let mut color = Element::new("COLOR");
    color.set("Black", "0,0,0,255").set("White", "255,255,255,255");

    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    let _ = writeln!(xml, "<SCRIBUSUTF8NEW Version=\"{SLA_VERSION}\">");
    xml.push_str(&document.open_tag(1, false));
    xml.push_str(&color.open_tag(2, true));
    xml.push_str("    <PAGE>\n");

    for page in pages {
        let number = as_f64(page.get("pageNumber")).map_or(1, |n| n as i64);
        let mut objects: Vec<&Map<String, Value>> = layout::page_objects(page).collect();
        objects.sort_by(|a, b| {
            let za = layer_z_order(a.get("layer").and_then(Value::as_str).unwrap_or("Text"), as_f64(a.get("zOrder")));
            let zb = layer_z_order(b.get("layer").and_then(Value::as_str).unwrap_or("Text"), as_f64(b.get("zOrder")));
            za.total_cmp(&zb)
        });
        for obj in objects {
            if let Some(el) = page_object(obj, dpi, number) {
                xml.push_str(&el.open_tag(3, true));
            }
        }
    }

    xml.push_str("    </PAGE>\n  </DOCUMENT>\n</SCRIBUSUTF8NEW>\n");
    xml.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> Value {
        json!({
            "document": {"width": 2480, "height": 3508, "dpi": 300},
            "pages": [
                {"pageNumber": 2, "objects": [
                    {"id": "t", "type": "text", "layer": "Text", "content": "A & \"B\"",
                     "bbox": {"x": 300, "y": 300, "w": 600, "h": 150}}
                ]},
                {"pageNumber": 1, "objects": [
                    {"id": "img", "type": "image", "layer": "Images", "imageUrl": "a.png",
                     "bbox": {"x": 0, "y": 0, "w": 300, "h": 300}},
                    {"id": "bg", "type": "rectangle", "layer": "Background", "fillColor": "#FF0000",
                     "strokeWidth": 3, "bbox": {"x": 0, "y": 0, "w": 2480, "h": 3508}},
                    {"id": "x", "type": "ellipse", "bbox": {"x": 0, "y": 0, "w": 1, "h": 1}}
                ]}
            ]
        })
    }

    #[test]
    fn unit_and_color_helpers() {
        assert_eq!(px_to_pt(2480.0, 300.0), 595.2);
        assert_eq!(px_to_pt(3508.0, 300.0), 841.92);
        assert_eq!(hex_to_rgb("#0a0B0c"), (10, 11, 12));
        assert_eq!(hex_to_rgb("red"), (0, 0, 0));
        assert_eq!(rgb_to_scribus((255, 0, 51)), "1.000,0.000,0.200");
        assert_eq!(layer_z_order("Overlay", None), 40.0);
        assert_eq!(layer_z_order("Custom", None), 30.0);
        assert_eq!(layer_z_order("Overlay", Some(1.0)), 1.0);
    }

    #[test]
    fn compiled_document_orders_pages_and_objects() {
        let xml = String::from_utf8(compile_layout(&doc())).unwrap();
        assert!(xml.contains("<SCRIBUSUTF8NEW Version=\"1.5.8\">"));
        assert!(xml.contains("PAGES=\"2\""));
        assert!(xml.contains("PAGEWIDTH=\"595.2\""));

        let bg = xml.find("FLCOLOR=\"1.000,0.000,0.000\"").unwrap();
        let img = xml.find("PFILE=\"a.png\"").unwrap();
        let text = xml.find("TEXT=\"A &amp; &quot;B&quot;\"").unwrap();
        assert!(bg < img && img < text);
        assert!(xml.contains("LINEW=\"0.72\""));
        assert_eq!(xml.matches("<PAGEOBJECT").count(), 3);
    }
}
