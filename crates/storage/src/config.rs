//! Artifact store configuration loaded from environment variables.

use std::path::PathBuf;

/// Artifact store configuration.
///
/// | Env var | Default |
/// |---------|---------|
/// | `ARTIFACT_STORE` | `s3` (`s3` or `local`) |
/// | `MINIO_ENDPOINT` | `localhost:9000` |
/// | `MINIO_ACCESS_KEY` | `minioadmin` |
/// | `MINIO_SECRET_KEY` | `minioadmin` |
/// | `MINIO_BUCKET` | `sla-artifacts` |
/// | `MINIO_SECURE` | `false` |
/// | `MINIO_REGION` | `us-east-1` |
/// | `ARTIFACT_LOCAL_ROOT` | `./artifacts` |
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    pub secure: bool,
    pub region: String,
    pub local_root: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    S3,
    Local,
}

impl StoreConfig {
    pub fn from_env() -> Self {
        let backend = match std::env::var("ARTIFACT_STORE")
            .unwrap_or_default()
            .trim()
            .to_lowercase()
            .as_str()
        {
            "local" | "fs" | "filesystem" => StoreBackend::Local,
            _ => StoreBackend::S3,
        };

        Self {
            backend,
            endpoint: env_or("MINIO_ENDPOINT", "localhost:9000"),
            access_key: env_or("MINIO_ACCESS_KEY", "minioadmin"),
            secret_key: env_or("MINIO_SECRET_KEY", "minioadmin"),
            bucket: env_or("MINIO_BUCKET", "sla-artifacts"),
            secure: env_or("MINIO_SECURE", "false").eq_ignore_ascii_case("true"),
            region: env_or("MINIO_REGION", "us-east-1"),
            local_root: PathBuf::from(env_or("ARTIFACT_LOCAL_ROOT", "./artifacts")),
        }
    }

    /// A local-filesystem configuration rooted at `root` (tests, CLI).
    pub fn local(root: impl Into<PathBuf>) -> Self {
        Self {
            backend: StoreBackend::Local,
            endpoint: String::new(),
            access_key: String::new(),
            secret_key: String::new(),
            bucket: "sla-artifacts".to_string(),
            secure: false,
            region: "us-east-1".to_string(),
            local_root: root.into(),
        }
    }

    /// Endpoint as a URL, adding the scheme from `secure` when missing.
    pub fn endpoint_url(&self) -> String {
        if self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://") {
            self.endpoint.clone()
        } else if self.secure {
            format!("https://{}", self.endpoint)
        } else {
            format!("http://{}", self.endpoint)
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_url_adds_scheme() {
        let mut cfg = StoreConfig::local("/tmp/a");
        cfg.endpoint = "minio:9000".into();
        assert_eq!(cfg.endpoint_url(), "http://minio:9000");
        cfg.secure = true;
        assert_eq!(cfg.endpoint_url(), "https://minio:9000");
        cfg.endpoint = "http://already".into();
        assert_eq!(cfg.endpoint_url(), "http://already");
    }
}
