//! Queue names and the job envelope.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::QueueError;

/// The named queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueName {
    Compile,
    Export,
    Workflow,
}

impl QueueName {
    pub const ALL: [QueueName; 3] = [QueueName::Compile, QueueName::Export, QueueName::Workflow];

    pub fn as_str(self) -> &'static str {
        match self {
            QueueName::Compile => "compile",
            QueueName::Export => "export",
            QueueName::Workflow => "workflow",
        }
    }

    /// Hard timeout for jobs on this queue.
    pub fn default_timeout(self) -> Duration {
        match self {
            QueueName::Compile | QueueName::Export => Duration::from_secs(20 * 60),
            QueueName::Workflow => Duration::from_secs(60 * 60),
        }
    }

    /// Broker key holding this queue's list.
    pub fn redis_key(self) -> String {
        format!("queue:{}", self.as_str())
    }

    /// Parse a comma-separated list such as `compile,export,workflow`.
    pub fn parse_list(list: &str) -> Result<Vec<QueueName>, QueueError> {
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .collect()
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueName {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "compile" => Ok(QueueName::Compile),
            "export" => Ok(QueueName::Export),
            "workflow" => Ok(QueueName::Workflow),
            other => Err(QueueError::UnknownQueue(other.to_string())),
        }
    }
}

/// Function reference for compile jobs. Args: `[job_id_hex]`.
pub const COMPILE_FUNCTION: &str = "process_compile_job";

/// Function reference for workflow jobs. Args: `[job_id_hex]`.
pub const WORKFLOW_FUNCTION: &str = "process_workflow_job";

/// Serialized job envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedJob {
    pub id: String,
    /// Textual function reference resolved by the worker.
    pub func: String,
    pub args: Vec<serde_json::Value>,
    pub timeout_secs: u64,
    pub enqueued_at: chrono::DateTime<chrono::Utc>,
}

impl QueuedJob {
    pub fn new(function_ref: &str, args: Vec<serde_json::Value>, timeout: Duration) -> Self {
        Self {
            id: pressline_core::ids::to_hex(pressline_core::ids::new_id()),
            func: function_ref.to_string(),
            args,
            timeout_secs: timeout.as_secs(),
            enqueued_at: chrono::Utc::now(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// First positional argument as a string (the job id by convention).
    pub fn first_arg_str(&self) -> Option<&str> {
        self.args.first().and_then(serde_json::Value::as_str)
    }
}
