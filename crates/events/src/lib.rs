//! Fire-and-forget progress and lifecycle events.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`. Publishing never blocks and never fails.
//! - [`BusEvent`]: the `{type, data}` envelope published on a named channel.
//! - [`RedisForwarder`]: background task that relays every bus event to
//!   Redis pub/sub for out-of-process subscribers.

pub mod bus;
pub mod redis_forwarder;

pub use bus::{BusEvent, EventBus, CHANNELS};
pub use redis_forwarder::{RedisForwarder, RedisPublisher};
