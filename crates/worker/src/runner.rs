//! The dequeue loop.
//!
//! Consumes the configured queues in order, one job at a time, until the
//! cancellation token fires. A job already in progress when shutdown is
//! requested runs to completion.

use tokio_util::sync::CancellationToken;

use crate::context::WorkerContext;
use crate::jobs;

pub struct Worker {
    ctx: WorkerContext,
}

impl Worker {
    pub fn new(ctx: WorkerContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &WorkerContext {
        &self.ctx
    }

    /// Run until `cancel` is triggered.
    pub async fn run(&self, cancel: CancellationToken) {
        let queues = self.ctx.config.queues.clone();
        let wait = self.ctx.config.poll_interval;
        tracing::info!(
            queues = ?queues.iter().map(|q| q.as_str()).collect::<Vec<_>>(),
            poll_secs = wait.as_secs(),
            "Worker started",
        );

        loop {
            let dequeued = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Worker shutting down");
                    break;
                }
                dequeued = self.ctx.queue.dequeue(&queues, wait) => dequeued,
            };

            match dequeued {
                Ok(Some((queue, queued))) => jobs::process(&self.ctx, queue, queued).await,
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(error = %e, "Dequeue failed");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(wait) => {}
                    }
                }
            }
        }
    }

    /// Drain whatever is queued right now, then return. Used by tests and
    /// one-shot invocations.
    pub async fn run_until_idle(&self) -> usize {
        let queues = self.ctx.config.queues.clone();
        let mut processed = 0;
        while let Ok(Some((queue, queued))) = self
            .ctx
            .queue
            .dequeue(&queues, std::time::Duration::ZERO)
            .await
        {
            jobs::process(&self.ctx, queue, queued).await;
            processed += 1;
        }
        processed
    }
}
