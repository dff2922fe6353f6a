//! Stale-pending sweeper.
//!
//! The service enqueues after its transaction commits, so a crash in
//! between leaves a pending job nobody will ever dequeue. This loop finds
//! pending rows untouched for longer than the configured threshold and
//! enqueues them again.

use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use pressline_core::ids::to_hex;
use pressline_db::models::job::Job;
use pressline_db::models::status::JobKind;
use pressline_db::repositories::JobRepo;
use pressline_queue::{QueueName, COMPILE_FUNCTION, WORKFLOW_FUNCTION};

use crate::context::WorkerContext;
use crate::error::JobError;

/// How often the sweeper looks for stale jobs.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Queue and function reference a job kind is dispatched to.
pub fn dispatch_target(kind: JobKind) -> Option<(QueueName, &'static str)> {
    match kind {
        JobKind::Compile => Some((QueueName::Compile, COMPILE_FUNCTION)),
        JobKind::Workflow => Some((QueueName::Workflow, WORKFLOW_FUNCTION)),
        // Export runs inside the compile job.
        JobKind::Export => None,
    }
}

/// Run the sweep loop until `cancel` is triggered.
pub async fn run(ctx: WorkerContext, cancel: CancellationToken) {
    let threshold = ctx.config.stale_pending_after;
    tracing::info!(
        threshold_secs = threshold.as_secs(),
        interval_secs = SWEEP_INTERVAL.as_secs(),
        "Stale-pending sweeper started"
    );

    let mut interval = tokio::time::interval(SWEEP_INTERVAL);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Stale-pending sweeper stopping");
                break;
            }
            _ = interval.tick() => {
                match sweep_once(&ctx, threshold).await {
                    Ok(0) => tracing::debug!("Sweeper: no stale jobs"),
                    Ok(requeued) => tracing::info!(requeued, "Sweeper: re-enqueued stale jobs"),
                    Err(e) => tracing::error!(error = %e, "Sweeper: cycle failed"),
                }
            }
        }
    }
}

/// One sweep. Returns how many jobs were enqueued again.
pub async fn sweep_once(ctx: &WorkerContext, threshold: Duration) -> Result<usize, JobError> {
    let stale = JobRepo::list_stale_pending(&ctx.pool, threshold.as_secs() as i64).await?;
    let mut requeued = 0;
    for job in stale {
        if requeue(ctx, &job).await? {
            requeued += 1;
        }
    }
    Ok(requeued)
}

async fn requeue(ctx: &WorkerContext, job: &Job) -> Result<bool, JobError> {
    let Some((queue, func)) = job.kind().and_then(dispatch_target) else {
        tracing::warn!(job_id = %job.id, job_type = %job.job_type, "Stale job has no dispatch target");
        return Ok(false);
    };
    ctx.queue
        .enqueue(queue, func, vec![json!(to_hex(job.id))], queue.default_timeout())
        .await?;
    JobRepo::touch(&ctx.pool, job.id).await?;
    tracing::info!(job_id = %job.id, queue = %queue, "Re-enqueued stale pending job");
    Ok(true)
}
