//! Request-level concerns shared by every route.
//!
//! - [`api_key::RequireApiKey`] -- Requires the configured API key on write routes.
//! - [`correlation::correlation_middleware`] -- Assigns and echoes the correlation id.
//! - [`rate_limit::rate_limit_middleware`] -- Sliding-window limit per client.

pub mod api_key;
pub mod correlation;
pub mod rate_limit;
