//! Storage URI grammar: `<scheme>://<container>/<kind>/<file_name>`.

use std::fmt;

use pressline_core::kinds::{ArtifactKind, StorageKind};

use crate::error::StorageError;

/// A parsed storage URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageUri {
    pub storage: StorageKind,
    pub container: String,
    /// Object key inside the container: `<kind>/<file_name>`.
    pub key: String,
}

impl StorageUri {
    pub fn new(storage: StorageKind, container: &str, kind: ArtifactKind, file_name: &str) -> Self {
        Self {
            storage,
            container: container.to_string(),
            key: format!("{}/{file_name}", kind.as_str()),
        }
    }

    pub fn parse(uri: &str) -> Result<Self, StorageError> {
        let invalid = || StorageError::InvalidUri(uri.to_string());

        let (scheme, rest) = uri.split_once("://").ok_or_else(invalid)?;
        let storage = StorageKind::parse(scheme).map_err(|_| invalid())?;
        let (container, key) = rest.split_once('/').ok_or_else(invalid)?;

        if container.is_empty() || key.is_empty() {
            return Err(invalid());
        }
        let (kind, file_name) = key.split_once('/').ok_or_else(invalid)?;
        ArtifactKind::parse(kind).map_err(|_| invalid())?;
        validate_file_name(file_name).map_err(|_| invalid())?;

        Ok(Self {
            storage,
            container: container.to_string(),
            key: key.to_string(),
        })
    }

    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

impl fmt::Display for StorageUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}/{}", self.storage.as_str(), self.container, self.key)
    }
}

/// File names are a single path segment.
pub fn validate_file_name(name: &str) -> Result<(), StorageError> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0')
    {
        return Err(StorageError::InvalidUri(format!("bad file name '{name}'")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn display_and_parse_agree() {
        let uri = StorageUri::new(StorageKind::S3, "sla-artifacts", ArtifactKind::Sla, "layout_1.sla");
        let text = uri.to_string();
        assert_eq!(text, "s3://sla-artifacts/sla/layout_1.sla");
        assert_eq!(StorageUri::parse(&text).unwrap(), uri);
        assert_eq!(uri.file_name(), "layout_1.sla");
    }

    #[test]
    fn rejects_malformed_uris() {
        for bad in [
            "sla-artifacts/sla/x",
            "ftp://b/sla/x",
            "s3://b",
            "s3:///sla/x",
            "s3://b/unknown/x",
            "s3://b/sla/../x",
            "s3://b/sla/",
        ] {
            assert_matches!(StorageUri::parse(bad), Err(StorageError::InvalidUri(_)), "{bad}");
        }
    }
}
