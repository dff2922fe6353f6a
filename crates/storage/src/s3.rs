//! S3-compatible artifact store (MinIO in development).

use async_trait::async_trait;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use pressline_core::ids::{new_id, to_hex};
use pressline_core::kinds::{ArtifactKind, StorageKind};
use tokio::sync::OnceCell;

use crate::config::StoreConfig;
use crate::error::StorageError;
use crate::uri::{validate_file_name, StorageUri};
use crate::{ArtifactStore, StoredObject};

/// Credentials provider name reported in SDK logs.
const PROVIDER_NAME: &str = "pressline-env";

pub struct S3Store {
    client: Client,
    bucket: String,
    /// Set once the bucket has been confirmed or created.
    bucket_ready: OnceCell<()>,
}

impl S3Store {
    /// Build a client for the configured endpoint. No request is sent until
    /// the first operation.
    pub async fn connect(config: &StoreConfig) -> Self {
        let credentials = aws_credential_types::Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            PROVIDER_NAME,
        );
        let shared = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .endpoint_url(config.endpoint_url())
            .credentials_provider(credentials)
            .load()
            .await;
        let s3_config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(s3_config),
            bucket: config.bucket.clone(),
            bucket_ready: OnceCell::new(),
        }
    }

    async fn ensure_bucket(&self) -> Result<(), StorageError> {
        self.bucket_ready
            .get_or_try_init(|| async {
                match self.client.head_bucket().bucket(&self.bucket).send().await {
                    Ok(_) => Ok(()),
                    Err(SdkError::ServiceError(e)) if e.err().is_not_found() => {
                        tracing::info!(bucket = %self.bucket, "Creating artifact bucket");
                        self.create_bucket().await
                    }
                    Err(e) => Err(unavailable(e)),
                }
            })
            .await
            .map(|_| ())
    }

    async fn create_bucket(&self) -> Result<(), StorageError> {
        match self.client.create_bucket().bucket(&self.bucket).send().await {
            Ok(_) => Ok(()),
            // Another process won the race.
            Err(SdkError::ServiceError(e)) if e.err().is_bucket_already_owned_by_you() => Ok(()),
            Err(e) => Err(unavailable(e)),
        }
    }

    fn key_for(&self, uri: &str) -> Result<String, StorageError> {
        let parsed = StorageUri::parse(uri)?;
        if parsed.storage != StorageKind::S3 {
            return Err(StorageError::InvalidUri(uri.to_string()));
        }
        if parsed.container != self.bucket {
            tracing::debug!(uri, bucket = %self.bucket, "URI names a different bucket");
        }
        Ok(parsed.key)
    }
}

fn unavailable<E, R>(err: SdkError<E, R>) -> StorageError
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug,
{
    StorageError::Unavailable(DisplayErrorContext(&err).to_string())
}

#[async_trait]
impl ArtifactStore for S3Store {
    fn storage_kind(&self) -> StorageKind {
        StorageKind::S3
    }

    async fn upload(
        &self,
        data: Vec<u8>,
        kind: ArtifactKind,
        file_name: Option<&str>,
        mime: Option<&str>,
    ) -> Result<StoredObject, StorageError> {
        self.ensure_bucket().await?;

        let file_name = match file_name {
            Some(name) => name.to_string(),
            None => format!("{}.bin", to_hex(new_id())),
        };
        validate_file_name(&file_name)?;

        let uri = StorageUri::new(StorageKind::S3, &self.bucket, kind, &file_name);
        let size = data.len() as u64;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&uri.key)
            .content_type(mime.unwrap_or("application/octet-stream"))
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(unavailable)?;

        Ok(StoredObject {
            uri: uri.to_string(),
            file_name,
            size,
        })
    }

    async fn download(&self, uri: &str) -> Result<Vec<u8>, StorageError> {
        let key = self.key_for(uri)?;
        let response = match self.client.get_object().bucket(&self.bucket).key(&key).send().await {
            Ok(r) => r,
            Err(SdkError::ServiceError(e)) if e.err().is_no_such_key() => {
                return Err(StorageError::NotFound(uri.to_string()));
            }
            Err(e) => return Err(unavailable(e)),
        };
        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        Ok(bytes.into_bytes().to_vec())
    }

    async fn delete(&self, uri: &str) -> Result<(), StorageError> {
        let key = self.key_for(uri)?;
        // S3 deletes are idempotent: a missing key is not an error.
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), StorageError> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(unavailable)?;
        Ok(())
    }
}
