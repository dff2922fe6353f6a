//! Workflow bundle extraction and report packaging.
//!
//! Extraction never writes outside the destination: member names are
//! normalized (backslashes become separators) and any name that is
//! absolute or climbs with `..` rejects the whole bundle.

use std::fs::{self, File};
use std::io::{self, Cursor, Read, Write};
use std::path::{Component, Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::JobError;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const PROJECT_INIT_FILE: &str = "project_init.json";
pub const GAMMA_DIR: &str = "gamma";

/// Upper bound on archive members.
const MAX_ENTRIES: usize = 20_000;

/// Upper bound on the total uncompressed size.
const MAX_UNPACKED_BYTES: u64 = 2 * 1024 * 1024 * 1024;

/// Where an extracted bundle's inputs live.
#[derive(Debug, Clone)]
pub struct ExtractedBundle {
    /// Directory holding `manifest.json`.
    pub root: PathBuf,
    pub files: usize,
}

impl ExtractedBundle {
    pub fn manifest(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    /// `gamma/` beside the manifest, when present.
    pub fn gamma_dir(&self) -> Option<PathBuf> {
        Some(self.root.join(GAMMA_DIR)).filter(|p| p.is_dir())
    }

    pub fn project_init(&self) -> Option<PathBuf> {
        Some(self.root.join(PROJECT_INIT_FILE)).filter(|p| p.is_file())
    }
}

/// Map an archive member name to a relative path, or `None` when it would
/// escape the destination.
pub fn safe_member_path(name: &str) -> Option<PathBuf> {
    let normalized = name.replace('\\', "/");
    if normalized.starts_with('/') {
        return None;
    }
    let mut out = PathBuf::new();
    for component in Path::new(&normalized).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    (!out.as_os_str().is_empty()).then_some(out)
}

/// What [`inspect_bundle`] learns without unpacking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleSummary {
    /// Member name of the shallowest manifest.
    pub manifest: String,
    /// A `gamma/` directory sits beside the manifest.
    pub has_gamma_dir: bool,
}

/// Check an archive without unpacking it: readable, within the entry
/// limit, every member path safe, and a manifest present.
pub fn inspect_bundle(data: &[u8]) -> Result<BundleSummary, JobError> {
    let archive = ZipArchive::new(Cursor::new(data))?;
    if archive.len() > MAX_ENTRIES {
        return Err(JobError::Bundle(format!(
            "too many entries: {} (max {MAX_ENTRIES})",
            archive.len()
        )));
    }

    let mut members = Vec::with_capacity(archive.len());
    let mut manifest: Option<(usize, String, PathBuf)> = None;
    for name in archive.file_names() {
        let relative = safe_member_path(name)
            .ok_or_else(|| JobError::Bundle(format!("unsafe member path '{name}'")))?;
        if relative.file_name().is_some_and(|f| f == MANIFEST_FILE) {
            let depth = relative.components().count();
            let shallower = match &manifest {
                Some((best, _, _)) => depth < *best,
                None => true,
            };
            if shallower {
                manifest = Some((depth, name.to_string(), relative.clone()));
            }
        }
        members.push(relative);
    }

    let (_, manifest, relative) =
        manifest.ok_or_else(|| JobError::Bundle(format!("missing {MANIFEST_FILE}")))?;
    let gamma = relative.with_file_name(GAMMA_DIR);
    let has_gamma_dir = members.iter().any(|m| m.starts_with(&gamma) && m != &gamma);
    Ok(BundleSummary { manifest, has_gamma_dir })
}

/// Unpack `data` into `dest` and locate the manifest.
pub fn extract_bundle(data: &[u8], dest: &Path) -> Result<ExtractedBundle, JobError> {
    let mut archive = ZipArchive::new(Cursor::new(data))?;
    if archive.len() > MAX_ENTRIES {
        return Err(JobError::Bundle(format!(
            "too many entries: {} (max {MAX_ENTRIES})",
            archive.len()
        )));
    }

    fs::create_dir_all(dest)?;
    let mut unpacked = 0u64;
    let mut files = 0usize;
    let mut manifests = Vec::new();

    for index in 0..archive.len() {
        let mut member = archive.by_index(index)?;
        let name = member.name().to_string();
        let relative = safe_member_path(&name)
            .ok_or_else(|| JobError::Bundle(format!("unsafe member path '{name}'")))?;
        let target = dest.join(&relative);

        if member.is_dir() || name.ends_with('/') || name.ends_with('\\') {
            fs::create_dir_all(&target)?;
            continue;
        }

        unpacked = unpacked.saturating_add(member.size());
        if unpacked > MAX_UNPACKED_BYTES {
            return Err(JobError::Bundle("uncompressed size exceeds limit".into()));
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)?;
        io::copy(&mut (&mut member).take(MAX_UNPACKED_BYTES), &mut out)?;
        files += 1;

        if relative.file_name().is_some_and(|f| f == MANIFEST_FILE) {
            manifests.push(relative);
        }
    }

    // The shallowest manifest wins; bundles zipped from a parent folder nest
    // everything one level down.
    manifests.sort_by_key(|p| p.components().count());
    let manifest = manifests
        .into_iter()
        .next()
        .ok_or_else(|| JobError::Bundle(format!("missing {MANIFEST_FILE}")))?;
    let root = match manifest.parent() {
        Some(parent) => dest.join(parent),
        None => dest.to_path_buf(),
    };

    tracing::debug!(files, root = %root.display(), "Bundle extracted");
    Ok(ExtractedBundle { root, files })
}

/// Zip every file under `root`, skipping top-level entries named in
/// `exclude`. Member names are relative to `root` and use `/`.
pub fn zip_tree(root: &Path, exclude: &[&str]) -> Result<Vec<u8>, JobError> {
    let mut paths = Vec::new();
    collect_files(root, root, exclude, &mut paths)?;
    paths.sort();

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for relative in &paths {
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        writer.start_file(name, options)?;
        writer.write_all(&fs::read(root.join(relative))?)?;
    }
    Ok(writer.finish()?.into_inner())
}

fn collect_files(
    root: &Path,
    dir: &Path,
    exclude: &[&str],
    out: &mut Vec<PathBuf>,
) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };
        if dir == root && exclude.iter().any(|e| relative == Path::new(e)) {
            continue;
        }
        if entry.file_type()?.is_dir() {
            collect_files(root, &path, exclude, out)?;
        } else {
            out.push(relative.to_path_buf());
        }
    }
    Ok(())
}
