//! Redis-backed queue: one list per queue name, `LPUSH` to enqueue and
//! `BRPOP` to dequeue.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::{QueueAdapter, QueueError, QueueName, QueuedJob};

#[derive(Clone)]
pub struct RedisQueue {
    conn: ConnectionManager,
}

impl RedisQueue {
    pub async fn connect(url: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        tracing::info!("Connected to queue broker");
        Ok(Self { conn })
    }
}

impl std::fmt::Debug for RedisQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisQueue").finish_non_exhaustive()
    }
}

#[async_trait]
impl QueueAdapter for RedisQueue {
    async fn enqueue(
        &self,
        queue: QueueName,
        function_ref: &str,
        args: Vec<serde_json::Value>,
        timeout: Duration,
    ) -> Result<String, QueueError> {
        let job = QueuedJob::new(function_ref, args, timeout);
        let payload = serde_json::to_string(&job)?;
        let mut conn = self.conn.clone();
        let _: i64 = conn.lpush(queue.redis_key(), payload).await?;
        tracing::debug!(queue = %queue, job_id = %job.id, func = function_ref, "Enqueued job");
        Ok(job.id)
    }

    async fn length(&self, queue: QueueName) -> Result<u64, QueueError> {
        let mut conn = self.conn.clone();
        Ok(conn.llen(queue.redis_key()).await?)
    }

    async fn dequeue(
        &self,
        queues: &[QueueName],
        wait: Duration,
    ) -> Result<Option<(QueueName, QueuedJob)>, QueueError> {
        let keys: Vec<String> = queues.iter().map(|q| q.redis_key()).collect();
        let mut conn = self.conn.clone();
        let popped: Option<(String, String)> = conn.brpop(keys, wait.as_secs_f64().max(1.0)).await?;

        let Some((key, payload)) = popped else {
            return Ok(None);
        };
        let name = key
            .strip_prefix("queue:")
            .unwrap_or(&key)
            .parse::<QueueName>()?;
        let job: QueuedJob = serde_json::from_str(&payload)?;
        Ok(Some((name, job)))
    }

    async fn ping(&self) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}
