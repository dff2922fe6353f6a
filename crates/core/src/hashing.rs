//! Content hashing for idempotency fingerprints and artifact checksums.
//!
//! Skip decisions in the workflow depend on these functions producing the
//! same digest for the same content across runs and processes. Changing
//! any algorithm here requires bumping the workflow state schema version.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use md5::Md5;
use sha2::{Digest, Sha256};

/// Files up to this size are hashed in full.
pub const FULL_HASH_MAX_BYTES: u64 = 2_000_000;

/// Bytes taken from each end of a large file.
pub const EDGE_BYTES: u64 = 65_536;

/// Compute a SHA-256 hex digest of the given bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    let hash = Sha256::digest(data);
    format!("{hash:x}")
}

/// Compute an MD5 hex digest (artifact checksums only, never skip decisions).
pub fn md5_hex(data: &[u8]) -> String {
    let hash = Md5::digest(data);
    format!("{hash:x}")
}

/// Hash a file's contents.
///
/// Files up to [`FULL_HASH_MAX_BYTES`] are hashed in full. Larger files hash
/// `first 64 KiB || last 64 KiB || ascii(size)`.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let size = file.metadata()?.len();

    if size <= FULL_HASH_MAX_BYTES {
        let mut buf = Vec::with_capacity(size as usize);
        file.read_to_end(&mut buf)?;
        return Ok(sha256_hex(&buf));
    }

    let mut hasher = Sha256::new();
    let mut head = vec![0u8; EDGE_BYTES as usize];
    file.read_exact(&mut head)?;
    hasher.update(&head);

    let mut tail = vec![0u8; EDGE_BYTES as usize];
    file.seek(SeekFrom::Start(size - EDGE_BYTES))?;
    file.read_exact(&mut tail)?;
    hasher.update(&tail);

    hasher.update(size.to_string().as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

/// Hash a file, mapping a missing or unreadable file to `None`.
pub fn hash_file_opt(path: &Path) -> Option<String> {
    hash_file(path).ok()
}

/// Hash a directory tree by its sorted listing plus per-file content hashes.
///
/// Each entry contributes `relative/path` and the [`hash_file`] digest. Only
/// regular files are included. A missing directory hashes as an empty list.
pub fn hash_dir(root: &Path) -> io::Result<String> {
    let mut entries: Vec<(String, String)> = Vec::new();
    if root.is_dir() {
        collect_files(root, root, &mut entries)?;
    }
    entries.sort();

    let listing: Vec<serde_json::Value> = entries
        .into_iter()
        .map(|(path, hash)| serde_json::json!({ "path": path, "hash": hash }))
        .collect();
    Ok(hash_inputs(&serde_json::Value::Array(listing)))
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<(String, String)>) -> io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_files(root, &path, out)?;
        } else if file_type.is_file() {
            let rel = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .to_string_lossy()
                .replace('\\', "/");
            out.push((rel, hash_file(&path)?));
        }
    }
    Ok(())
}

/// Serialize a JSON value canonically: object keys sorted, no whitespace.
pub fn canonical_json(value: &serde_json::Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &serde_json::Value, out: &mut String) {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // Serializing a plain string cannot fail.
                out.push_str(&serde_json::Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        serde_json::Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Deterministic SHA-256 over the canonical JSON of `inputs`.
pub fn hash_inputs(inputs: &serde_json::Value) -> String {
    sha256_hex(canonical_json(inputs).as_bytes())
}

/// `true` when `value` looks like a SHA-256 hex digest.
pub fn is_sha256_hex(value: &str) -> bool {
    value.len() == 64 && value.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
