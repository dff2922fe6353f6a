//! Layout descriptor model: accessors, structural validation and size limits.
//!
//! Descriptors are open-ended JSON documents, so they are handled as
//! [`serde_json::Value`] and read through the lenient accessors below.
//! The shape every pipeline stage relies on is:
//!
//! ```text
//! {
//!   "version": "1.0.0",
//!   "document": { "width": 2480, "height": 3508, "dpi": 300 },
//!   "pages": [
//!     { "pageNumber": 1, "masterPage": "A", "objects": [
//!         { "id": "s001_text_0", "type": "text", "layer": "Text",
//!           "bbox": { "x": 0, "y": 0, "w": 100, "h": 40 },
//!           "content": "...", "fontFamily": "Arial", "fontSize": 12 }
//!     ] }
//!   ],
//!   "variant": { "variant": "color", "bleed_mm": 3.0 }
//! }
//! ```

use std::collections::HashMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::CoreError;

/// Object types the compiler knows how to place.
pub const KNOWN_OBJECT_TYPES: &[&str] = &["text", "image", "rectangle", "line", "ellipse"];

/// Page numbers key `pages` rows, an INTEGER column.
pub const MAX_PAGE_NUMBER: i64 = i32::MAX as i64;

/// Millimetres per inch.
const MM_PER_INCH: f64 = 25.4;

// ---------------------------------------------------------------------------
// Accessors
// ---------------------------------------------------------------------------

/// Convert millimetres to pixels at the given dpi.
pub fn mm_to_px(mm: f64, dpi: f64) -> f64 {
    (mm / MM_PER_INCH) * dpi
}

/// Read a number leniently: JSON numbers and numeric strings are accepted.
pub fn as_f64(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Read a string field, treating `null` and non-strings as empty.
pub fn str_field<'a>(obj: &'a Map<String, Value>, key: &str) -> &'a str {
    obj.get(key).and_then(Value::as_str).unwrap_or("")
}

/// Axis-aligned bounding box in document pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BBox {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl BBox {
    /// Parse a `{x, y, w, h}` object. All four keys must be present and numeric.
    pub fn from_value(value: Option<&Value>) -> Option<Self> {
        let obj = value?.as_object()?;
        Some(Self {
            x: as_f64(obj.get("x"))?,
            y: as_f64(obj.get("y"))?,
            w: as_f64(obj.get("w"))?,
            h: as_f64(obj.get("h"))?,
        })
    }

    pub fn right(&self) -> f64 {
        self.x + self.w
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.h
    }

    /// `true` when the box lies inside `[m, width - m] x [m, height - m]`.
    pub fn within_inset(&self, width: f64, height: f64, margin: f64) -> bool {
        self.x >= margin
            && self.y >= margin
            && self.right() <= width - margin
            && self.bottom() <= height - margin
    }

    pub fn to_value(self) -> Value {
        serde_json::json!({ "x": self.x, "y": self.y, "w": self.w, "h": self.h })
    }
}

/// Document dimensions `(width, height, dpi)`; missing values read as `0.0`.
pub fn document_dims(doc: &Value) -> (f64, f64, f64) {
    let d = doc.get("document");
    let field = |k: &str| as_f64(d.and_then(|d| d.get(k))).unwrap_or(0.0);
    (field("width"), field("height"), field("dpi"))
}

/// Iterate page objects, skipping anything that is not a JSON object.
pub fn pages(doc: &Value) -> impl Iterator<Item = &Map<String, Value>> {
    doc.get("pages")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
}

/// Iterate the objects placed on one page.
pub fn page_objects(page: &Map<String, Value>) -> impl Iterator<Item = &Map<String, Value>> {
    page.get("objects")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
}

/// Iterate every object on every page.
pub fn all_objects(doc: &Value) -> impl Iterator<Item = &Map<String, Value>> {
    pages(doc).flat_map(page_objects)
}

/// Page number as written, `0` when missing or not an integer.
pub fn page_number(page: &Map<String, Value>) -> i64 {
    as_f64(page.get("pageNumber")).map(|n| n as i64).unwrap_or(0)
}

/// Apply `f` to every object of every page, mutably.
pub fn for_each_object_mut(doc: &mut Value, mut f: impl FnMut(&mut Map<String, Value>)) {
    let Some(pages) = doc.get_mut("pages").and_then(Value::as_array_mut) else {
        return;
    };
    for page in pages {
        let Some(objects) = page.get_mut("objects").and_then(Value::as_array_mut) else {
            continue;
        };
        for obj in objects.iter_mut().filter_map(Value::as_object_mut) {
            f(obj);
        }
    }
}

/// Borrow (creating if needed) the `variant` object of a descriptor.
pub fn variant_mut(doc: &mut Value) -> Option<&mut Map<String, Value>> {
    let root = doc.as_object_mut()?;
    let entry = root
        .entry("variant")
        .or_insert_with(|| Value::Object(Map::new()));
    if !entry.is_object() {
        *entry = Value::Object(Map::new());
    }
    entry.as_object_mut()
}

// ---------------------------------------------------------------------------
// Structural validation
// ---------------------------------------------------------------------------

/// One structural problem, addressed by JSON pointer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaError {
    pub path: String,
    pub message: String,
}

impl SchemaError {
    fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for SchemaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Validate the structure of a descriptor. An empty list means valid.
pub fn validate_descriptor(doc: &Value) -> Vec<SchemaError> {
    let mut errors = Vec::new();

    let Some(root) = doc.as_object() else {
        errors.push(SchemaError::new("", "descriptor must be a JSON object"));
        return errors;
    };

    if let Some(version) = root.get("version") {
        if !version.is_string() {
            errors.push(SchemaError::new("/version", "must be a string"));
        }
    }

    match root.get("document").and_then(Value::as_object) {
        None => errors.push(SchemaError::new("/document", "required object is missing")),
        Some(document) => {
            for key in ["width", "height", "dpi"] {
                match document.get(key) {
                    None => errors.push(SchemaError::new(
                        format!("/document/{key}"),
                        "required field is missing",
                    )),
                    Some(v) if !v.is_number() => errors.push(SchemaError::new(
                        format!("/document/{key}"),
                        "must be a number",
                    )),
                    Some(_) => {}
                }
            }
        }
    }

    match root.get("pages") {
        None => errors.push(SchemaError::new("/pages", "required array is missing")),
        Some(Value::Array(pages)) => {
            if pages.is_empty() {
                errors.push(SchemaError::new("/pages", "must contain at least one page"));
            }
            let mut seen: HashMap<i64, usize> = HashMap::new();
            for (pi, page) in pages.iter().enumerate() {
                let path = format!("/pages/{pi}");
                let Some(number) = validate_page(page, &path, &mut errors) else {
                    continue;
                };
                if let Some(first) = seen.insert(number, pi) {
                    errors.push(SchemaError::new(
                        format!("{path}/pageNumber"),
                        format!("duplicates /pages/{first}/pageNumber ({number})"),
                    ));
                }
            }
        }
        Some(_) => errors.push(SchemaError::new("/pages", "must be an array")),
    }

    errors
}

/// Returns the page number when it is usable as a page row key.
fn validate_page(page: &Value, path: &str, errors: &mut Vec<SchemaError>) -> Option<i64> {
    let Some(page) = page.as_object() else {
        errors.push(SchemaError::new(path, "page must be an object"));
        return None;
    };

    let number_path = format!("{path}/pageNumber");
    let number = match page.get("pageNumber") {
        Some(Value::Number(n)) if n.is_i64() || n.is_u64() => match n.as_i64() {
            Some(v) if (1..=MAX_PAGE_NUMBER).contains(&v) => Some(v),
            _ => {
                errors.push(SchemaError::new(
                    number_path,
                    format!("must be between 1 and {MAX_PAGE_NUMBER}"),
                ));
                None
            }
        },
        Some(_) => {
            errors.push(SchemaError::new(number_path, "must be an integer"));
            None
        }
        None => {
            errors.push(SchemaError::new(number_path, "required field is missing"));
            None
        }
    };

    match page.get("objects") {
        None => errors.push(SchemaError::new(
            format!("{path}/objects"),
            "required array is missing",
        )),
        Some(Value::Array(objects)) => {
            for (oi, obj) in objects.iter().enumerate() {
                validate_object(obj, &format!("{path}/objects/{oi}"), errors);
            }
        }
        Some(_) => errors.push(SchemaError::new(format!("{path}/objects"), "must be an array")),
    }

    number
}

fn validate_object(obj: &Value, path: &str, errors: &mut Vec<SchemaError>) {
    let Some(obj) = obj.as_object() else {
        errors.push(SchemaError::new(path, "object must be a JSON object"));
        return;
    };

    if !obj.get("id").is_some_and(Value::is_string) {
        errors.push(SchemaError::new(format!("{path}/id"), "must be a string"));
    }

    match obj.get("type").and_then(Value::as_str) {
        None => errors.push(SchemaError::new(format!("{path}/type"), "must be a string")),
        Some(t) if !KNOWN_OBJECT_TYPES.contains(&t) => errors.push(SchemaError::new(
            format!("{path}/type"),
            format!("unknown object type '{t}'"),
        )),
        Some(_) => {}
    }

    match obj.get("bbox").and_then(Value::as_object) {
        None => errors.push(SchemaError::new(format!("{path}/bbox"), "required object is missing")),
        Some(bbox) => {
            for key in ["x", "y", "w", "h"] {
                if !bbox.get(key).is_some_and(Value::is_number) {
                    errors.push(SchemaError::new(
                        format!("{path}/bbox/{key}"),
                        "must be a number",
                    ));
                }
            }
        }
    }

    if let Some(size) = obj.get("fontSize") {
        if !size.is_number() {
            errors.push(SchemaError::new(format!("{path}/fontSize"), "must be a number"));
        }
    }
    if let Some(content) = obj.get("content") {
        if !content.is_string() {
            errors.push(SchemaError::new(format!("{path}/content"), "must be a string"));
        }
    }
}

// ---------------------------------------------------------------------------
// Size limits
// ---------------------------------------------------------------------------

/// Upper bounds enforced before a descriptor is stored.
#[derive(Debug, Clone, Copy)]
pub struct LayoutLimits {
    pub max_bytes: usize,
    pub max_pages: usize,
    pub max_objects_per_page: usize,
}

impl Default for LayoutLimits {
    fn default() -> Self {
        Self {
            max_bytes: 10 * 1024 * 1024,
            max_pages: 1000,
            max_objects_per_page: 1000,
        }
    }
}

impl LayoutLimits {
    /// Reject descriptors that exceed any limit.
    ///
    /// `encoded_len` is the size of the descriptor as it will be stored.
    pub fn check(&self, doc: &Value, encoded_len: usize) -> Result<(), CoreError> {
        if encoded_len > self.max_bytes {
            return Err(CoreError::Validation(format!(
                "Layout JSON too large: {encoded_len} bytes (max {} bytes)",
                self.max_bytes
            )));
        }

        let page_count = pages(doc).count();
        if page_count > self.max_pages {
            return Err(CoreError::Validation(format!(
                "Too many pages: {page_count} (max {})",
                self.max_pages
            )));
        }

        for page in pages(doc) {
            let count = page_objects(page).count();
            if count > self.max_objects_per_page {
                return Err(CoreError::Validation(format!(
                    "Page {} has too many elements: {count} (max {})",
                    page_number(page),
                    self.max_objects_per_page
                )));
            }
        }

        Ok(())
    }
}
