use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pressline_events::{EventBus, RedisForwarder, RedisPublisher};
use pressline_queue::{QueueAdapter, RedisQueue};
use pressline_worker::{sweeper, Worker, WorkerConfig, WorkerContext};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "pressline_worker=debug,pressline_pipeline=debug".into());
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    // --- Configuration ---
    let config = WorkerConfig::from_env().context("Invalid worker configuration")?;
    tracing::info!(queues = ?config.queues, work_dir = %config.work_dir.display(), "Loaded worker configuration");
    std::fs::create_dir_all(&config.work_dir).context("Failed to create work directory")?;

    // --- Database ---
    let pool = pressline_db::create_pool(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    pressline_db::health_check(&pool)
        .await
        .context("Database health check failed")?;
    pressline_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database ready");

    // --- Queue, store, events ---
    let queue: Arc<dyn QueueAdapter> = Arc::new(
        RedisQueue::connect(&config.redis_url)
            .await
            .context("Failed to connect to queue broker")?,
    );
    let store = pressline_storage::connect(&config.store).await;

    let event_bus = Arc::new(if config.event_bus_enabled {
        EventBus::default()
    } else {
        EventBus::disabled()
    });
    let cancel = CancellationToken::new();
    let publisher = if config.event_bus_enabled {
        RedisPublisher::connect(&config.redis_url).await
    } else {
        RedisPublisher::disabled()
    };
    let forwarder_handle = tokio::spawn(RedisForwarder::run(
        publisher,
        event_bus.subscribe(),
        cancel.clone(),
    ));

    let ctx = WorkerContext::new(pool, store, queue, Arc::clone(&event_bus), config);

    // --- Sweeper ---
    let sweeper_handle = tokio::spawn(sweeper::run(ctx.clone(), cancel.clone()));

    // --- Worker loop ---
    let worker = Worker::new(ctx);
    let worker_cancel = cancel.clone();
    let worker_handle = tokio::spawn(async move { worker.run(worker_cancel).await });

    shutdown_signal().await;
    cancel.cancel();

    // The loop only notices the token between jobs.
    if let Err(e) = worker_handle.await {
        tracing::error!(error = %e, "Worker task ended abnormally");
    }
    let _ = tokio::time::timeout(Duration::from_secs(5), sweeper_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), forwarder_handle).await;

    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
