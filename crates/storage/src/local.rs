//! Local filesystem artifact store rooted at a configured directory.
//!
//! Objects live at `<root>/<container>/<kind>/<file_name>`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use pressline_core::ids::{new_id, to_hex};
use pressline_core::kinds::{ArtifactKind, StorageKind};

use crate::error::StorageError;
use crate::uri::{validate_file_name, StorageUri};
use crate::{ArtifactStore, StoredObject};

pub struct LocalStore {
    root: PathBuf,
    container: String,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>, container: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            container: container.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, uri: &StorageUri) -> Result<PathBuf, StorageError> {
        if uri.storage != StorageKind::Local {
            return Err(StorageError::InvalidUri(uri.to_string()));
        }
        Ok(self.root.join(&uri.container).join(&uri.key))
    }
}

#[async_trait]
impl ArtifactStore for LocalStore {
    fn storage_kind(&self) -> StorageKind {
        StorageKind::Local
    }

    async fn upload(
        &self,
        data: Vec<u8>,
        kind: ArtifactKind,
        file_name: Option<&str>,
        _mime: Option<&str>,
    ) -> Result<StoredObject, StorageError> {
        let file_name = match file_name {
            Some(name) => name.to_string(),
            None => format!("{}.bin", to_hex(new_id())),
        };
        validate_file_name(&file_name)?;

        let uri = StorageUri::new(StorageKind::Local, &self.container, kind, &file_name);
        let path = self.path_for(&uri)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write next to the target and rename so readers never see a partial blob.
        let tmp = path.with_file_name(format!(".{file_name}.{}.tmp", to_hex(new_id())));
        tokio::fs::write(&tmp, &data).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        Ok(StoredObject {
            uri: uri.to_string(),
            file_name,
            size: data.len() as u64,
        })
    }

    async fn download(&self, uri: &str) -> Result<Vec<u8>, StorageError> {
        let parsed = StorageUri::parse(uri)?;
        let path = self.path_for(&parsed)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(uri.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, uri: &str) -> Result<(), StorageError> {
        let parsed = StorageUri::parse(uri)?;
        let path = self.path_for(&parsed)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn ping(&self) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(self.root.join(&self.container)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn store(dir: &tempfile::TempDir) -> LocalStore {
        LocalStore::new(dir.path(), "sla-artifacts")
    }

    // -- upload / download ----------------------------------------------------

    #[tokio::test]
    async fn upload_then_download_returns_same_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        let stored = store
            .upload(b"hello".to_vec(), ArtifactKind::LayoutJson, Some("a.json"), None)
            .await
            .unwrap();
        assert_eq!(stored.uri, "local://sla-artifacts/layout_json/a.json");
        assert_eq!(stored.size, 5);
        assert_eq!(store.download(&stored.uri).await.unwrap(), b"hello");
        assert!(dir.path().join("sla-artifacts/layout_json/a.json").exists());
    }

    #[tokio::test]
    async fn generated_names_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let a = store.upload(vec![1], ArtifactKind::Png, None, None).await.unwrap();
        let b = store.upload(vec![2], ArtifactKind::Png, None, None).await.unwrap();
        assert_ne!(a.uri, b.uri);
        assert!(a.file_name.ends_with(".bin"));
    }

    #[tokio::test]
    async fn missing_blob_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let result = store(&dir).download("local://sla-artifacts/pdf/none.pdf").await;
        assert_matches!(result, Err(StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn path_traversal_names_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let result = store(&dir)
            .upload(vec![0], ArtifactKind::Sla, Some("../escape.sla"), None)
            .await;
        assert_matches!(result, Err(StorageError::InvalidUri(_)));
    }

    // -- delete ---------------------------------------------------------------

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let stored = store.upload(vec![9], ArtifactKind::Pdf, Some("x.pdf"), None).await.unwrap();
        store.delete(&stored.uri).await.unwrap();
        store.delete(&stored.uri).await.unwrap();
        assert_matches!(store.download(&stored.uri).await, Err(StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn s3_uris_are_not_served_locally() {
        let dir = tempfile::tempdir().unwrap();
        let result = store(&dir).download("s3://sla-artifacts/pdf/x.pdf").await;
        assert_matches!(result, Err(StorageError::InvalidUri(_)));
    }
}
