//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is shared via `Arc<EventBus>` between request handlers, the
//! workflow progress tracker and the Redis forwarder.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Channels events are published on.
pub const CHANNELS: &[&str] = &["jobs", "workflow", "quality", "variants"];

// ---------------------------------------------------------------------------
// BusEvent
// ---------------------------------------------------------------------------

/// An event on a named channel.
///
/// Serialized for subscribers as `{"type": ..., "data": {...}}`; the channel
/// and timestamp travel out of band.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusEvent {
    #[serde(skip)]
    pub channel: String,

    /// Dot-separated event name, e.g. `"job.created"`.
    #[serde(rename = "type")]
    pub event_type: String,

    pub data: serde_json::Value,

    #[serde(skip, default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl BusEvent {
    /// Create an event with an empty data object.
    pub fn new(channel: impl Into<String>, event_type: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            event_type: event_type.into(),
            data: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    /// Add `correlation_id` to the data object when one is known.
    pub fn with_correlation_id(mut self, correlation_id: Option<&str>) -> Self {
        if let (Some(id), Some(obj)) = (correlation_id, self.data.as_object_mut()) {
            obj.insert("correlation_id".into(), serde_json::Value::String(id.to_string()));
        }
        self
    }

    /// Wire form sent to external subscribers.
    pub fn to_message(&self) -> String {
        serde_json::json!({ "type": self.event_type, "data": self.data }).to_string()
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
pub struct EventBus {
    sender: broadcast::Sender<BusEvent>,
    enabled: bool,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full the oldest unconsumed events are dropped and
    /// slow receivers observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            enabled: true,
        }
    }

    /// A bus that drops every event (`EVENT_BUS_ENABLED=false`).
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new(1)
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Publish an event to all current subscribers.
    pub fn publish(&self, event: BusEvent) {
        if !self.enabled {
            tracing::trace!(channel = %event.channel, event_type = %event.event_type, "Event bus disabled");
            return;
        }
        // A SendError only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    /// Shorthand for `publish(BusEvent::new(..).with_data(..))`.
    pub fn emit(&self, channel: &str, event_type: &str, data: serde_json::Value) {
        self.publish(BusEvent::new(channel, event_type).with_data(data));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
