//! Sliding-window rate limiting per client.
//!
//! The shared backend keeps one Redis sorted set of request timestamps per
//! client, trimmed to the window on every request by a Lua script so that
//! several service instances see the same counts. A single instance can run
//! with the in-process backend instead. Backend errors never reject a
//! request: the limiter fails open and logs.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use redis::aio::ConnectionManager;
use redis::Script;
use tokio::sync::Mutex;

use crate::config::RateLimitSettings;
use crate::error::AppError;
use crate::state::AppState;

const KEY_PREFIX: &str = "pressline:ratelimit";

/// In-process maps are swept of idle clients once they grow past this.
const MEMORY_SWEEP_THRESHOLD: usize = 10_000;

/// Trim, count, and either record the request or report when the oldest
/// entry leaves the window. Times are in milliseconds.
const SLIDING_WINDOW_SCRIPT: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local limit = tonumber(ARGV[3])
local member = ARGV[4]

redis.call('ZREMRANGEBYSCORE', key, 0, now - window)
local current = redis.call('ZCARD', key)

if current < limit then
    redis.call('ZADD', key, now, member)
    redis.call('PEXPIRE', key, window)
    return {1, current + 1, 0}
end

local oldest = redis.call('ZRANGE', key, 0, 0, 'WITHSCORES')
local reset = window
if oldest[2] then
    reset = tonumber(oldest[2]) + window - now
end
return {0, current, reset}
"#;

/// Outcome of one limiter check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    /// Whole seconds until a slot frees up, at least 1.
    Denied { retry_after: u64 },
}

enum Backend {
    Disabled,
    Memory(Mutex<HashMap<String, VecDeque<Instant>>>),
    Redis {
        conn: ConnectionManager,
        script: Script,
    },
}

pub struct RateLimiter {
    limit: u32,
    window: Duration,
    backend: Backend,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let backend = match self.backend {
            Backend::Disabled => "disabled",
            Backend::Memory(_) => "memory",
            Backend::Redis { .. } => "redis",
        };
        f.debug_struct("RateLimiter")
            .field("limit", &self.limit)
            .field("window", &self.window)
            .field("backend", &backend)
            .finish()
    }
}

impl RateLimiter {
    pub fn disabled() -> Self {
        Self {
            limit: 0,
            window: Duration::ZERO,
            backend: Backend::Disabled,
        }
    }

    pub fn in_memory(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            backend: Backend::Memory(Mutex::new(HashMap::new())),
        }
    }

    /// Build the limiter described by `settings`, sharing state through
    /// Redis. Falls back to the in-process backend when Redis cannot be
    /// reached at startup.
    pub async fn connect(redis_url: &str, settings: RateLimitSettings) -> Self {
        if !settings.enabled {
            tracing::info!("Rate limiting disabled");
            return Self::disabled();
        }

        let conn = match redis::Client::open(redis_url) {
            Ok(client) => ConnectionManager::new(client).await,
            Err(e) => Err(e),
        };
        match conn {
            Ok(conn) => {
                tracing::info!(
                    limit = settings.requests,
                    window_secs = settings.window.as_secs(),
                    "Rate limiter using Redis"
                );
                Self {
                    limit: settings.requests,
                    window: settings.window,
                    backend: Backend::Redis {
                        conn,
                        script: Script::new(SLIDING_WINDOW_SCRIPT),
                    },
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Redis unavailable, rate limiter using in-process state");
                Self::in_memory(settings.requests, settings.window)
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self.backend, Backend::Disabled)
    }

    /// Count one request from `client` and decide whether it may proceed.
    pub async fn check(&self, client: &str) -> Decision {
        match &self.backend {
            Backend::Disabled => Decision::Allowed,
            Backend::Memory(entries) => self.check_memory(entries, client, Instant::now()).await,
            Backend::Redis { conn, script } => match self.check_redis(conn, script, client).await {
                Ok(decision) => decision,
                Err(e) => {
                    tracing::warn!(error = %e, client, "Rate limiter backend error, allowing request");
                    Decision::Allowed
                }
            },
        }
    }

    async fn check_memory(
        &self,
        entries: &Mutex<HashMap<String, VecDeque<Instant>>>,
        client: &str,
        now: Instant,
    ) -> Decision {
        let mut entries = entries.lock().await;
        if entries.len() > MEMORY_SWEEP_THRESHOLD {
            let window = self.window;
            entries.retain(|_, stamps| stamps.back().is_some_and(|t| now.duration_since(*t) < window));
        }

        let stamps = entries.entry(client.to_string()).or_default();
        while stamps.front().is_some_and(|t| now.duration_since(*t) >= self.window) {
            stamps.pop_front();
        }

        if stamps.len() < self.limit as usize {
            stamps.push_back(now);
            return Decision::Allowed;
        }

        let reset = stamps
            .front()
            .map(|oldest| self.window.saturating_sub(now.duration_since(*oldest)))
            .unwrap_or(self.window);
        Decision::Denied {
            retry_after: ceil_secs(reset),
        }
    }

    async fn check_redis(
        &self,
        conn: &ConnectionManager,
        script: &Script,
        client: &str,
    ) -> Result<Decision, redis::RedisError> {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let window_ms = self.window.as_millis() as i64;
        let member = format!("{now_ms}-{}", uuid::Uuid::new_v4().simple());

        let mut conn = conn.clone();
        let result: Vec<i64> = script
            .key(format!("{KEY_PREFIX}:{client}"))
            .arg(now_ms)
            .arg(window_ms)
            .arg(self.limit)
            .arg(member)
            .invoke_async(&mut conn)
            .await?;

        match result.as_slice() {
            [1, ..] => Ok(Decision::Allowed),
            [_, _, reset_ms, ..] => Ok(Decision::Denied {
                retry_after: ceil_secs(Duration::from_millis((*reset_ms).max(0) as u64)),
            }),
            _ => Ok(Decision::Allowed),
        }
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    let millis = duration.as_millis() as u64;
    millis.div_ceil(1000).max(1)
}

/// Health routes are never limited.
fn is_exempt(path: &str) -> bool {
    path == "/health" || path.starts_with("/health/")
}

/// Identify the caller: first `x-forwarded-for` hop, then the peer address.
pub fn client_key(req: &Request<Body>) -> String {
    let forwarded = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if !state.limiter.is_enabled() || is_exempt(req.uri().path()) {
        return next.run(req).await;
    }

    let client = client_key(&req);
    match state.limiter.check(&client).await {
        Decision::Allowed => next.run(req).await,
        Decision::Denied { retry_after } => {
            tracing::warn!(client = %client, retry_after, path = %req.uri().path(), "Rate limit exceeded");
            AppError::RateLimited { retry_after }.into_response()
        }
    }
}
