//! Shared harness for the HTTP integration tests.
//!
//! The app is built with [`build_app_router`], the same function `main.rs`
//! uses, over test doubles for everything except the database: a local
//! artifact store in a temp dir, the in-memory queue, the in-memory rate
//! limiter and an in-process event bus with no Redis forwarder.
#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use sqlx::PgPool;
use tempfile::TempDir;
use tower::ServiceExt;

use pressline_api::cache::JobCache;
use pressline_api::config::{RateLimitSettings, ServerConfig};
use pressline_api::middleware::rate_limit::RateLimiter;
use pressline_api::router::build_app_router;
use pressline_api::state::AppState;
use pressline_events::EventBus;
use pressline_queue::{MemoryQueue, QueueName};
use pressline_storage::StoreConfig;

pub const TEST_API_KEY: &str = "test-key";

/// Test `ServerConfig`: API key and rate limiting off, small bundle limit.
pub fn test_config(store_root: &std::path::Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        database_url: String::new(),
        redis_url: "redis://localhost:6379/0".to_string(),
        api_key: None,
        api_key_enabled: false,
        rate_limit: RateLimitSettings {
            enabled: false,
            requests: 100,
            window: Duration::from_secs(60),
        },
        max_json_bytes: 1024 * 1024,
        max_pages: 10,
        max_elements_per_page: 20,
        max_workflow_bundle_bytes: 64 * 1024,
        cache_enabled: true,
        cache_ttl: Duration::from_secs(3600),
        event_bus_enabled: true,
        correlation_header: "x-correlation-id".to_string(),
        store: StoreConfig::local(store_root),
    }
}

/// A running test app plus handles on its doubles.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub queue: Arc<MemoryQueue>,
    /// Keeps the artifact store directory alive.
    pub store_dir: TempDir,
}

impl TestApp {
    pub fn app(&self) -> Router {
        self.router.clone()
    }

    /// Wait for the background enqueue to land, up to one second.
    pub async fn wait_for_enqueued(&self, queue: QueueName, count: usize) -> Vec<pressline_queue::QueuedJob> {
        for _ in 0..50 {
            let pending = self.queue.pending(queue).await;
            if pending.len() >= count {
                return pending;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.queue.pending(queue).await
    }
}

/// Build the app with `customize` applied to the test config.
pub async fn spawn_app(pool: PgPool, customize: impl FnOnce(&mut ServerConfig)) -> TestApp {
    let store_dir = tempfile::tempdir().unwrap();
    let mut config = test_config(store_dir.path());
    customize(&mut config);

    let limiter = if config.rate_limit.enabled {
        RateLimiter::in_memory(config.rate_limit.requests, config.rate_limit.window)
    } else {
        RateLimiter::disabled()
    };
    let queue = Arc::new(MemoryQueue::new());
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        store: pressline_storage::connect(&config.store).await,
        queue: queue.clone(),
        bus: Arc::new(EventBus::default()),
        limiter: Arc::new(limiter),
        cache: Arc::new(JobCache::new(config.cache_enabled, config.cache_ttl)),
    };

    TestApp {
        router: build_app_router(state.clone(), &config),
        state,
        queue,
        store_dir,
    }
}

/// Build the full application router with default test settings.
pub async fn build_test_app(pool: PgPool) -> TestApp {
    spawn_app(pool, |_| {}).await
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

pub async fn send(app: Router, request: Request<Body>) -> Response<Body> {
    app.oneshot(request).await.unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(app, request).await
}

pub async fn post_json(app: Router, uri: &str, body: Value) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

/// A multipart form with one file part per `(name, file_name, data)` and
/// one text part per `(name, value)`.
pub fn multipart_request(
    uri: &str,
    files: &[(&str, &str, &[u8])],
    fields: &[(&str, &str)],
) -> Request<Body> {
    let boundary = "pressline-test-boundary";
    let mut body = Vec::new();
    for (name, value) in fields {
        write!(
            body,
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        )
        .unwrap();
    }
    for (name, file_name, data) in files {
        write!(
            body,
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n\
             Content-Type: application/zip\r\n\r\n"
        )
        .unwrap();
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    write!(body, "--{boundary}--\r\n").unwrap();

    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", format!("multipart/form-data; boundary={boundary}"))
        .body(Body::from(body))
        .unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// A descriptor with `pages` pages of two objects each.
pub fn layout(pages: usize) -> Value {
    let pages: Vec<Value> = (1..=pages)
        .map(|n| {
            json!({
                "pageNumber": n,
                "objects": [
                    {"id": format!("t{n}"), "type": "text",
                     "bbox": {"x": 100, "y": 100, "w": 800, "h": 200},
                     "content": "Hello", "fontFamily": "Arial", "fontSize": 12},
                    {"id": format!("r{n}"), "type": "rectangle",
                     "bbox": {"x": 100, "y": 400, "w": 800, "h": 600}}
                ]
            })
        })
        .collect();
    json!({
        "version": "1.0.0",
        "document": {"width": 2480, "height": 3508, "dpi": 300},
        "pages": pages,
    })
}

/// Zip `entries` in memory.
pub fn zip_of(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        writer
            .start_file(*name, zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Smallest bundle the service accepts.
pub fn minimal_bundle() -> Vec<u8> {
    zip_of(&[
        ("manifest.json", br#"{"files": [{"name": "deck", "json": "json/deck.json"}]}"#),
        ("json/deck.json", br#"{"slides": []}"#),
    ])
}

pub async fn count_rows(pool: &PgPool, table: &str) -> i64 {
    sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await
        .unwrap()
}
