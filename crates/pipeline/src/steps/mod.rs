//! Built-in step actions and the helpers they share.
//!
//! Every action takes a typed input struct (the step's declared inputs,
//! hashed by the executor) and returns a [`StepOutput`](crate::executor::StepOutput).

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use pressline_core::hashing::hash_file_opt;

use crate::error::StepError;

pub mod agents;
pub mod convert;
pub mod gamma;
pub mod quality;
pub mod render;
pub mod variants;

pub const CONVERT_MANIFEST: &str = "convert_manifest";
pub const GAMMA_SYNC: &str = "gamma_sync";
pub const GENERATE_VARIANTS: &str = "generate_variants";
pub const AGENTS: &str = "agents";
pub const QUALITY_CHECK: &str = "quality_check";
pub const RENDER: &str = "render";

/// Step ids in pipeline order.
pub const STEP_ORDER: &[&str] = &[
    CONVERT_MANIFEST,
    GAMMA_SYNC,
    GENERATE_VARIANTS,
    AGENTS,
    QUALITY_CHECK,
    RENDER,
];

// ---------------------------------------------------------------------------
// Declared-input helpers
// ---------------------------------------------------------------------------

/// A file a step reads, with its content hash (`None` when unreadable).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHash {
    pub path: String,
    pub hash: Option<String>,
}

impl FileHash {
    pub fn of(path: &Path) -> Self {
        Self {
            path: path.to_string_lossy().into_owned(),
            hash: hash_file_opt(path),
        }
    }

    pub fn path_buf(&self) -> PathBuf {
        PathBuf::from(&self.path)
    }
}

/// Hash every path, preserving order.
pub fn hash_paths<P: AsRef<Path>>(paths: &[P]) -> Vec<FileHash> {
    paths.iter().map(|p| FileHash::of(p.as_ref())).collect()
}

// ---------------------------------------------------------------------------
// JSON files
// ---------------------------------------------------------------------------

pub fn read_json(path: &Path) -> Result<Value, StepError> {
    let text = fs::read_to_string(path)
        .map_err(|e| StepError::action(format!("Cannot read {}: {e}", path.display())))?;
    serde_json::from_str(&text)
        .map_err(|e| StepError::action(format!("Invalid JSON in {}: {e}", path.display())))
}

/// Write pretty JSON through a temp file and rename it into place.
pub fn write_json(path: &Path, value: &Value) -> Result<(), StepError> {
    write_atomic(path, &serde_json::to_vec_pretty(value)?)
}

pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StepError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = tmp_path(path);
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Sibling temp path used for atomic writes.
pub fn tmp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.tmp"))
}

// ---------------------------------------------------------------------------
// Manifest
// ---------------------------------------------------------------------------

/// One `files[]` entry of an extraction manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub name: String,
    /// Path of the extracted JSON relative to the source root, with
    /// forward slashes.
    pub json: String,
}

/// Parse `files[]`, skipping entries without a name or JSON path.
pub fn manifest_entries(manifest: &Value) -> Vec<ManifestEntry> {
    manifest
        .get("files")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|entry| {
            let name = entry.get("name")?.as_str()?.trim();
            let json = entry.get("json")?.as_str()?.trim();
            (!name.is_empty() && !json.is_empty()).then(|| ManifestEntry {
                name: name.to_string(),
                json: json.replace('\\', "/"),
            })
        })
        .collect()
}

/// Locate an extracted JSON file under `root`.
///
/// Falls back to a recursive search by file name, and then to any JSON
/// file whose name ends with the expected one (archives written on Windows
/// can carry backslashes inside file names).
pub fn resolve_extracted(root: &Path, rel: &str) -> Option<PathBuf> {
    let direct = root.join(rel);
    if direct.is_file() {
        return Some(direct);
    }
    let base = Path::new(rel).file_name()?.to_string_lossy().into_owned();

    let mut files = Vec::new();
    collect_files(root, &mut files);
    files.sort();
    files
        .iter()
        .find(|p| p.file_name().is_some_and(|n| n.to_string_lossy() == base))
        .or_else(|| {
            files.iter().find(|p| {
                p.extension().is_some_and(|e| e == "json")
                    && p.file_name().is_some_and(|n| n.to_string_lossy().ends_with(&base))
            })
        })
        .cloned()
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, out);
        } else {
            out.push(path);
        }
    }
}

/// `a/b/name.layout.json` -> `name`; `x.json` -> `x`.
pub fn layout_stem(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.strip_suffix(".layout.json")
        .or_else(|| name.strip_suffix(".json"))
        .unwrap_or(&name)
        .to_string()
}
