use std::time::Duration;

use pressline_core::layout::LayoutLimits;
use pressline_storage::StoreConfig;

const MB: usize = 1024 * 1024;

/// Server configuration loaded from environment variables.
///
/// Defaults suit local development; production overrides them through the
/// environment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    pub database_url: String,
    pub redis_url: String,
    pub api_key: Option<String>,
    pub api_key_enabled: bool,
    pub rate_limit: RateLimitSettings,
    pub max_json_bytes: usize,
    pub max_pages: usize,
    pub max_elements_per_page: usize,
    pub max_workflow_bundle_bytes: usize,
    pub cache_enabled: bool,
    pub cache_ttl: Duration,
    pub event_bus_enabled: bool,
    /// Header carrying the correlation id, lower-case.
    pub correlation_header: String,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitSettings {
    pub enabled: bool,
    /// Requests allowed per identifier and window.
    pub requests: u32,
    pub window: Duration,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                  | Default                    |
    /// |--------------------------|----------------------------|
    /// | `HOST`                   | `0.0.0.0`                  |
    /// | `PORT`                   | `8000`                     |
    /// | `CORS_ORIGINS`           | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS`   | `30`                       |
    /// | `DATABASE_URL`           | (required)                 |
    /// | `REDIS_URL`              | `redis://localhost:6379/0` |
    /// | `API_KEY`                | unset                      |
    /// | `API_KEY_ENABLED`        | `false`                    |
    /// | `RATE_LIMIT_ENABLED`     | `true`                     |
    /// | `RATE_LIMIT_REQUESTS`    | `100`                      |
    /// | `RATE_LIMIT_WINDOW`      | `60` (seconds)             |
    /// | `MAX_JSON_SIZE_MB`       | `10`                       |
    /// | `MAX_PAGES_PER_DOCUMENT` | `1000`                     |
    /// | `MAX_ELEMENTS_PER_PAGE`  | `1000`                     |
    /// | `MAX_WORKFLOW_BUNDLE_MB` | `200`                      |
    /// | `CACHE_ENABLED`          | `true`                     |
    /// | `CACHE_DEFAULT_TTL`      | `3600` (seconds)           |
    /// | `EVENT_BUS_ENABLED`      | `true`                     |
    /// | `CORRELATION_HEADER`     | `x-correlation-id`         |
    ///
    /// The result is validated before it is returned.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url =
            std::env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?;

        let cors_origins = env_or("CORS_ORIGINS", "http://localhost:5173")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let config = Self {
            host: env_or("HOST", "0.0.0.0"),
            port: parse_env("PORT", 8000)?,
            cors_origins,
            request_timeout_secs: parse_env("REQUEST_TIMEOUT_SECS", 30)?,
            database_url,
            redis_url: env_or("REDIS_URL", "redis://localhost:6379/0"),
            api_key: std::env::var("API_KEY").ok().filter(|k| !k.is_empty()),
            api_key_enabled: env_flag("API_KEY_ENABLED", false),
            rate_limit: RateLimitSettings {
                enabled: env_flag("RATE_LIMIT_ENABLED", true),
                requests: parse_env("RATE_LIMIT_REQUESTS", 100)?,
                window: Duration::from_secs(parse_env("RATE_LIMIT_WINDOW", 60)?),
            },
            max_json_bytes: parse_env::<usize>("MAX_JSON_SIZE_MB", 10)? * MB,
            max_pages: parse_env("MAX_PAGES_PER_DOCUMENT", 1000)?,
            max_elements_per_page: parse_env("MAX_ELEMENTS_PER_PAGE", 1000)?,
            max_workflow_bundle_bytes: parse_env::<usize>("MAX_WORKFLOW_BUNDLE_MB", 200)? * MB,
            cache_enabled: env_flag("CACHE_ENABLED", true),
            cache_ttl: Duration::from_secs(parse_env("CACHE_DEFAULT_TTL", 3600)?),
            event_bus_enabled: env_flag("EVENT_BUS_ENABLED", true),
            correlation_header: env_or("CORRELATION_HEADER", "x-correlation-id").to_lowercase(),
            store: StoreConfig::from_env(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject combinations the service cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        if self.api_key_enabled && self.api_key.is_none() {
            errors.push("API_KEY_ENABLED is true but API_KEY is not set".to_string());
        }
        for (name, value) in [
            ("MAX_JSON_SIZE_MB", self.max_json_bytes),
            ("MAX_PAGES_PER_DOCUMENT", self.max_pages),
            ("MAX_ELEMENTS_PER_PAGE", self.max_elements_per_page),
            ("MAX_WORKFLOW_BUNDLE_MB", self.max_workflow_bundle_bytes),
        ] {
            if value == 0 {
                errors.push(format!("{name} must be > 0"));
            }
        }
        if self.rate_limit.enabled && (self.rate_limit.requests == 0 || self.rate_limit.window.is_zero()) {
            errors.push("RATE_LIMIT_REQUESTS and RATE_LIMIT_WINDOW must be > 0".to_string());
        }
        if self.correlation_header.parse::<axum::http::HeaderName>().is_err() {
            errors.push(format!("CORRELATION_HEADER '{}' is not a valid header name", self.correlation_header));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errors.join(", ")))
        }
    }

    /// Descriptor limits enforced on job creation.
    pub fn layout_limits(&self) -> LayoutLimits {
        LayoutLimits {
            max_bytes: self.max_json_bytes,
            max_pages: self.max_pages,
            max_objects_per_page: self.max_elements_per_page,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("Configuration errors: {0}")]
    Invalid(String),
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_flag(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(raw) => matches!(raw.trim().to_lowercase().as_str(), "true" | "1" | "yes"),
        Err(_) => default,
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("{key}='{raw}' is not a valid number"))),
        Err(_) => Ok(default),
    }
}
