//! Artifact store: immutable blobs addressed by
//! `<scheme>://<container>/<kind>/<file_name>`.
//!
//! Two interchangeable backends implement [`ArtifactStore`]: an S3-compatible
//! object store and a local filesystem store. [`connect`] picks one from
//! [`StoreConfig`]. Neither backend caches.

use std::sync::Arc;

use async_trait::async_trait;
use pressline_core::hashing::md5_hex;
use pressline_core::kinds::{ArtifactKind, StorageKind};

pub mod config;
pub mod error;
pub mod local;
#[cfg(feature = "s3")]
pub mod s3;
pub mod uri;

pub use config::{StoreBackend, StoreConfig};
pub use error::StorageError;
pub use local::LocalStore;
pub use uri::StorageUri;

/// Where an uploaded blob ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub uri: String,
    pub file_name: String,
    pub size: u64,
}

/// Blob storage contract shared by every backend.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    fn storage_kind(&self) -> StorageKind;

    /// Store `data` under `<kind>/<file_name>`, generating a name when none
    /// is given. Creates the backing container on first use.
    async fn upload(
        &self,
        data: Vec<u8>,
        kind: ArtifactKind,
        file_name: Option<&str>,
        mime: Option<&str>,
    ) -> Result<StoredObject, StorageError>;

    async fn download(&self, uri: &str) -> Result<Vec<u8>, StorageError>;

    /// Remove a blob. Deleting a missing blob succeeds.
    async fn delete(&self, uri: &str) -> Result<(), StorageError>;

    /// Cheap reachability check for `/health/detailed`.
    async fn ping(&self) -> Result<(), StorageError>;

    /// MD5 hex digest recorded as the artifact checksum.
    fn checksum(&self, data: &[u8]) -> String {
        md5_hex(data)
    }
}

/// Shared handle used by the service and the worker.
pub type SharedStore = Arc<dyn ArtifactStore>;

/// Build the configured store.
///
/// Falls back to the local store when the S3 backend is not compiled in.
pub async fn connect(config: &StoreConfig) -> SharedStore {
    match config.backend {
        StoreBackend::Local => local_store(config),
        StoreBackend::S3 => s3_store(config).await,
    }
}

fn local_store(config: &StoreConfig) -> SharedStore {
    tracing::info!(root = %config.local_root.display(), "Using local artifact store");
    Arc::new(LocalStore::new(&config.local_root, &config.bucket))
}

#[cfg(feature = "s3")]
async fn s3_store(config: &StoreConfig) -> SharedStore {
    tracing::info!(endpoint = %config.endpoint, bucket = %config.bucket, "Using S3 artifact store");
    Arc::new(s3::S3Store::connect(config).await)
}

#[cfg(not(feature = "s3"))]
async fn s3_store(config: &StoreConfig) -> SharedStore {
    tracing::warn!("S3 backend not compiled in, falling back to the local artifact store");
    local_store(config)
}
