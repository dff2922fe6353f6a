//! Named work queues between the service and the workers.
//!
//! The adapter serializes `(function_ref, args, timeout)` into a
//! [`QueuedJob`] envelope. Delivery is at-most-once from the enqueuer's
//! point of view; workers are idempotent so redelivery is safe.

use std::time::Duration;

use async_trait::async_trait;

pub mod backoff;
pub mod error;
pub mod job;
pub mod memory;
pub mod redis_queue;

pub use error::QueueError;
pub use job::{QueueName, QueuedJob, COMPILE_FUNCTION, WORKFLOW_FUNCTION};
pub use memory::MemoryQueue;
pub use redis_queue::RedisQueue;

/// Queue operations used by the service (enqueue, length) and the worker
/// (dequeue).
#[async_trait]
pub trait QueueAdapter: Send + Sync {
    /// Push a job onto `queue`. Returns the envelope id.
    async fn enqueue(
        &self,
        queue: QueueName,
        function_ref: &str,
        args: Vec<serde_json::Value>,
        timeout: Duration,
    ) -> Result<String, QueueError>;

    /// Number of jobs waiting on `queue`.
    async fn length(&self, queue: QueueName) -> Result<u64, QueueError>;

    /// Pop the oldest job from the first non-empty queue in `queues`,
    /// waiting at most `wait`.
    async fn dequeue(
        &self,
        queues: &[QueueName],
        wait: Duration,
    ) -> Result<Option<(QueueName, QueuedJob)>, QueueError>;

    /// Reachability check for `/health/detailed`.
    async fn ping(&self) -> Result<(), QueueError>;
}
