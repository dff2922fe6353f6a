use std::sync::Arc;

use pressline_events::EventBus;
use pressline_queue::QueueAdapter;
use pressline_storage::SharedStore;

use crate::cache::JobCache;
use crate::config::ServerConfig;
use crate::middleware::rate_limit::RateLimiter;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheap to clone: every field is a pool handle or behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub pool: sqlx::PgPool,
    pub config: Arc<ServerConfig>,
    pub store: SharedStore,
    pub queue: Arc<dyn QueueAdapter>,
    pub bus: Arc<EventBus>,
    pub limiter: Arc<RateLimiter>,
    /// Final-state job responses.
    pub cache: Arc<JobCache>,
}
