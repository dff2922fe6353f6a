use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pressline_api::cache::JobCache;
use pressline_api::config::ServerConfig;
use pressline_api::middleware::rate_limit::RateLimiter;
use pressline_api::router::build_app_router;
use pressline_api::state::AppState;
use pressline_events::{EventBus, RedisForwarder, RedisPublisher};
use pressline_queue::{QueueAdapter, RedisQueue};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "pressline_api=debug,tower_http=debug".into());
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
    let config = ServerConfig::from_env().context("Invalid server configuration")?;
    tracing::info!(
        host = %config.host,
        port = config.port,
        api_key_enabled = config.api_key_enabled,
        rate_limit_enabled = config.rate_limit.enabled,
        "Loaded server configuration"
    );

    // --- Database ---
    let pool = pressline_db::create_pool(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connection pool created");

    pressline_db::health_check(&pool)
        .await
        .context("Database health check failed")?;
    pressline_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    // --- Queue and artifact store ---
    let queue: Arc<dyn QueueAdapter> = Arc::new(
        RedisQueue::connect(&config.redis_url)
            .await
            .context("Failed to connect to queue broker")?,
    );
    let store = pressline_storage::connect(&config.store).await;

    // --- Event bus ---
    let cancel = CancellationToken::new();
    let event_bus = Arc::new(if config.event_bus_enabled {
        EventBus::default()
    } else {
        EventBus::disabled()
    });
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

    // --- Rate limiter and response cache ---
    let limiter = Arc::new(RateLimiter::connect(&config.redis_url, config.rate_limit).await);
    let cache = Arc::new(JobCache::new(config.cache_enabled, config.cache_ttl));

    // --- App state ---
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        store,
        queue,
        bus: Arc::clone(&event_bus),
        limiter,
        cache,
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;
    tracing::info!(%addr, "Server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");
    cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), forwarder_handle).await;
    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Wait for SIGINT (Ctrl-C) or, on Unix, SIGTERM.
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
