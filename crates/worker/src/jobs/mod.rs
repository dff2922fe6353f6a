//! Job handlers resolved from queue function references.
//!
//! Every handler owns its job row while it runs. Whatever goes wrong, the
//! row ends terminal: the failure path appends an ERROR log, marks the job
//! failed and publishes `job.failed`, then returns normally so the queue
//! never re-dispatches.

use serde_json::{json, Value};
use tracing::Instrument;

use pressline_core::ids::{from_hex, new_id, to_hex};
use pressline_core::types::DbId;
use pressline_db::models::job::Job;
use pressline_db::models::status::LogLevel;
use pressline_db::repositories::JobRepo;
use pressline_events::BusEvent;
use pressline_queue::{QueueName, QueuedJob, COMPILE_FUNCTION, WORKFLOW_FUNCTION};

use crate::context::WorkerContext;
use crate::error::JobError;

pub mod compile;
pub mod workflow;

/// Channel for job lifecycle events.
pub const JOBS_CHANNEL: &str = "jobs";

/// Correlation id recorded by the service in the job metadata.
pub fn correlation_id(job: &Job) -> Option<&str> {
    job.metadata.get("correlation_id").and_then(Value::as_str)
}

/// Publish a job lifecycle event carrying the job's correlation id.
pub fn emit_job_event(ctx: &WorkerContext, job: &Job, event_type: &str, mut data: Value) {
    if let Value::Object(map) = &mut data {
        map.insert("job_id".into(), json!(job.id));
        map.insert("job_type".into(), json!(job.job_type));
    }
    ctx.bus.publish(
        BusEvent::new(JOBS_CHANNEL, event_type)
            .with_data(data)
            .with_correlation_id(correlation_id(job)),
    );
}

/// Short random tag naming one run of a job. Every blob key a run writes
/// carries it, so a redelivered job stores under new keys and never rewrites
/// bytes an earlier artifact row describes.
pub fn attempt_tag() -> String {
    to_hex(new_id())[..8].to_string()
}

fn job_id_arg(queued: &QueuedJob) -> Option<DbId> {
    queued.first_arg_str().and_then(|raw| from_hex(raw).ok())
}

/// Run one dequeued job to a terminal state.
pub async fn process(ctx: &WorkerContext, queue: QueueName, queued: QueuedJob) {
    let Some(job_id) = job_id_arg(&queued) else {
        tracing::error!(queue = %queue, envelope = %queued.id, func = %queued.func, "Queued job has no job id argument");
        return;
    };

    let job = match JobRepo::find_by_id(&ctx.pool, job_id).await {
        Ok(Some(job)) => job,
        Ok(None) => {
            tracing::warn!(job_id = %job_id, "Dequeued job no longer exists");
            return;
        }
        Err(e) => {
            tracing::error!(job_id = %job_id, error = %e, "Failed to load dequeued job");
            return;
        }
    };
    if job.is_terminal() {
        tracing::info!(job_id = %job_id, status = %job.status, "Job already terminal, skipping redelivery");
        return;
    }

    let span = tracing::info_span!(
        "job",
        job_id = %job.id,
        job_type = %job.job_type,
        correlation_id = correlation_id(&job).unwrap_or_default(),
    );

    let timeout = queued.timeout();
    tracing::info!(job_id = %job.id, queue = %queue, func = %queued.func, "Processing job");

    let run = async {
        match queued.func.as_str() {
            COMPILE_FUNCTION => compile::run(ctx, &job).await,
            WORKFLOW_FUNCTION => workflow::run(ctx, &job).await,
            other => Err(JobError::InvalidJob(format!("unknown function reference '{other}'"))),
        }
    };
    let result = match tokio::time::timeout(timeout, run.instrument(span)).await {
        Ok(result) => result,
        Err(_) => Err(JobError::TimedOut(timeout.as_secs())),
    };

    match result {
        Ok(()) => tracing::info!(job_id = %job.id, "Job finished"),
        Err(err) => fail_job(ctx, &job, queue, &err).await,
    }
}

/// Record a terminal failure: ERROR log, failed row, `job.failed` event.
pub async fn fail_job(ctx: &WorkerContext, job: &Job, queue: QueueName, err: &JobError) {
    let message = err.to_string();
    tracing::error!(job_id = %job.id, error_kind = err.kind(), error = %message, "Job failed");

    let context = json!({
        "error_kind": err.kind(),
        "step_id": err.step_id(),
        "queue": queue.as_str(),
        "correlation_id": correlation_id(job),
    });
    ctx.job_log(job.id, LogLevel::Error, &message, Some(context)).await;

    if let Err(e) = JobRepo::fail(&ctx.pool, job.id, &message).await {
        tracing::error!(job_id = %job.id, error = %e, "Failed to mark job failed");
    }

    emit_job_event(
        ctx,
        job,
        "job.failed",
        json!({ "error": message, "step_id": err.step_id() }),
    );
}
