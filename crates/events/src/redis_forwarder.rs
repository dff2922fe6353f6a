//! Relay of bus events to Redis pub/sub.
//!
//! [`RedisForwarder`] subscribes to the [`EventBus`](crate::bus::EventBus)
//! and publishes every received [`BusEvent`] on the Redis channel of the
//! same name. Failures are logged and never reach the publisher.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::bus::BusEvent;

/// Redis publisher that disables itself when Redis is unreachable at start.
#[derive(Clone)]
pub struct RedisPublisher {
    conn: Option<ConnectionManager>,
}

impl std::fmt::Debug for RedisPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisPublisher")
            .field("enabled", &self.conn.is_some())
            .finish()
    }
}

impl RedisPublisher {
    /// Connect to Redis. On failure the publisher is returned disabled.
    pub async fn connect(redis_url: &str) -> Self {
        let conn = match redis::Client::open(redis_url) {
            Ok(client) => match ConnectionManager::new(client).await {
                Ok(conn) => Some(conn),
                Err(e) => {
                    tracing::warn!(error = %e, "Redis unavailable for event bus, forwarding disabled");
                    None
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "Invalid Redis URL for event bus, forwarding disabled");
                None
            }
        };
        Self { conn }
    }

    /// A publisher that never sends anything.
    pub fn disabled() -> Self {
        Self { conn: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.conn.is_some()
    }

    /// Publish one event. Errors are logged, not returned.
    pub async fn publish(&self, event: &BusEvent) {
        let Some(conn) = &self.conn else {
            tracing::debug!(channel = %event.channel, event_type = %event.event_type, "Event forwarding disabled");
            return;
        };
        let mut conn = conn.clone();
        match conn
            .publish::<_, _, i64>(&event.channel, event.to_message())
            .await
        {
            Ok(receivers) => {
                tracing::debug!(channel = %event.channel, event_type = %event.event_type, receivers, "Event published");
            }
            Err(e) => {
                tracing::error!(error = %e, channel = %event.channel, event_type = %event.event_type, "Failed to publish event");
            }
        }
    }
}

/// Background task forwarding bus events to Redis.
pub struct RedisForwarder;

impl RedisForwarder {
    /// Run the forwarding loop until `cancel` fires or the bus is dropped.
    pub async fn run(
        publisher: RedisPublisher,
        mut receiver: broadcast::Receiver<BusEvent>,
        cancel: CancellationToken,
    ) {
        loop {
            let received = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Event forwarder shutting down");
                    break;
                }
                received = receiver.recv() => received,
            };
            match received {
                Ok(event) => publisher.publish(&event).await,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Event forwarder lagged, some events were not forwarded");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, forwarder shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBus;

    #[tokio::test]
    async fn disabled_publisher_is_a_no_op() {
        let publisher = RedisPublisher::disabled();
        assert!(!publisher.is_enabled());
        publisher.publish(&BusEvent::new("jobs", "job.created")).await;
    }

    #[tokio::test]
    async fn forwarder_stops_on_cancel() {
        let bus = EventBus::default();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(RedisForwarder::run(
            RedisPublisher::disabled(),
            bus.subscribe(),
            cancel.clone(),
        ));

        bus.emit("jobs", "job.created", serde_json::json!({}));
        cancel.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .expect("forwarder should stop")
            .unwrap();
    }

    #[tokio::test]
    async fn forwarder_stops_when_bus_dropped() {
        let bus = EventBus::default();
        let rx = bus.subscribe();
        drop(bus);
        RedisForwarder::run(RedisPublisher::disabled(), rx, CancellationToken::new()).await;
    }
}
