//! In-process queue for tests and single-process deployments.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use crate::{QueueAdapter, QueueError, QueueName, QueuedJob};

#[derive(Default)]
pub struct MemoryQueue {
    queues: Mutex<HashMap<QueueName, VecDeque<QueuedJob>>>,
    notify: Notify,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the jobs waiting on `queue`, oldest first.
    pub async fn pending(&self, queue: QueueName) -> Vec<QueuedJob> {
        self.queues
            .lock()
            .await
            .get(&queue)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    async fn try_pop(&self, queues: &[QueueName]) -> Option<(QueueName, QueuedJob)> {
        let mut guard = self.queues.lock().await;
        queues.iter().find_map(|name| {
            guard
                .get_mut(name)
                .and_then(VecDeque::pop_front)
                .map(|job| (*name, job))
        })
    }
}

#[async_trait]
impl QueueAdapter for MemoryQueue {
    async fn enqueue(
        &self,
        queue: QueueName,
        function_ref: &str,
        args: Vec<serde_json::Value>,
        timeout: Duration,
    ) -> Result<String, QueueError> {
        let job = QueuedJob::new(function_ref, args, timeout);
        let id = job.id.clone();
        self.queues.lock().await.entry(queue).or_default().push_back(job);
        self.notify.notify_waiters();
        Ok(id)
    }

    async fn length(&self, queue: QueueName) -> Result<u64, QueueError> {
        Ok(self
            .queues
            .lock()
            .await
            .get(&queue)
            .map_or(0, |q| q.len() as u64))
    }

    async fn dequeue(
        &self,
        queues: &[QueueName],
        wait: Duration,
    ) -> Result<Option<(QueueName, QueuedJob)>, QueueError> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let notified = self.notify.notified();
            if let Some(found) = self.try_pop(queues).await {
                return Ok(Some(found));
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn ping(&self) -> Result<(), QueueError> {
        Ok(())
    }
}
