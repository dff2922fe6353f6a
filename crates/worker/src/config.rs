//! Worker configuration loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use pressline_queue::{QueueError, QueueName};
use pressline_storage::StoreConfig;

/// Worker process configuration.
///
/// | Env var | Default |
/// |---------|---------|
/// | `DATABASE_URL` | (required) |
/// | `REDIS_URL` | `redis://localhost:6379/0` |
/// | `WORKER_QUEUES` | `compile,export,workflow` |
/// | `WORKER_WORK_DIR` | `./work` |
/// | `WORKFLOW_RETRY_MAX` | `1` |
/// | `WORKER_POLL_SECS` | `5` |
/// | `WORKER_STALE_PENDING_SECS` | `900` |
/// | `EVENT_BUS_ENABLED` | `true` |
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub redis_url: String,
    /// Queues consumed, in priority order.
    pub queues: Vec<QueueName>,
    /// Parent of the per-job work directories.
    pub work_dir: PathBuf,
    pub workflow_retry_max: u32,
    /// How long one dequeue call blocks before the loop checks for shutdown.
    pub poll_interval: Duration,
    /// Pending jobs untouched for longer than this are re-enqueued.
    pub stale_pending_after: Duration,
    pub event_bus_enabled: bool,
    pub store: StoreConfig,
}

impl WorkerConfig {
    /// Load from the environment. Fails on a missing `DATABASE_URL` or an
    /// unknown queue name.
    pub fn from_env() -> Result<Self, WorkerConfigError> {
        let database_url =
            std::env::var("DATABASE_URL").map_err(|_| WorkerConfigError::Missing("DATABASE_URL"))?;
        let queues = QueueName::parse_list(&env_or("WORKER_QUEUES", "compile,export,workflow"))?;
        if queues.is_empty() {
            return Err(WorkerConfigError::Invalid("WORKER_QUEUES lists no queue".into()));
        }

        Ok(Self {
            database_url,
            redis_url: env_or("REDIS_URL", "redis://localhost:6379/0"),
            queues,
            work_dir: PathBuf::from(env_or("WORKER_WORK_DIR", "./work")),
            workflow_retry_max: parse_env("WORKFLOW_RETRY_MAX", 1)?,
            poll_interval: Duration::from_secs(parse_env::<u64>("WORKER_POLL_SECS", 5)?.max(1)),
            stale_pending_after: Duration::from_secs(parse_env("WORKER_STALE_PENDING_SECS", 900)?),
            event_bus_enabled: env_or("EVENT_BUS_ENABLED", "true").eq_ignore_ascii_case("true"),
            store: StoreConfig::from_env(),
        })
    }

    /// Configuration for tests: local store and work directory under `root`.
    pub fn local(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            database_url: String::new(),
            redis_url: String::new(),
            queues: QueueName::ALL.to_vec(),
            work_dir: root.join("work"),
            workflow_retry_max: 1,
            poll_interval: Duration::from_secs(1),
            stale_pending_after: Duration::from_secs(900),
            event_bus_enabled: false,
            store: StoreConfig::local(root.join("artifacts")),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("Invalid worker configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T, WorkerConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| WorkerConfigError::Invalid(format!("{key}='{raw}' is not a valid number"))),
        Err(_) => Ok(default),
    }
}
