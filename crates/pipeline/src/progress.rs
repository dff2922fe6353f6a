//! Typed progress events for a workflow run.
//!
//! Every event is delivered to an optional in-process callback and, when a
//! bus is attached, published on the `workflow` channel as
//! `workflow.<event>` (events already named `workflow.*` keep their name).
//! Delivery failures are swallowed.

use std::sync::Arc;

use serde_json::{Map, Value};

use pressline_events::{BusEvent, EventBus};

/// Synchronous observer invoked with every `{event, ...payload}` message.
pub type ProgressCallback = Arc<dyn Fn(&Value) + Send + Sync>;

const BUS_CHANNEL: &str = "workflow";
const BUS_EVENT_PREFIX: &str = "workflow";

#[derive(Clone, Default)]
pub struct ProgressTracker {
    on_event: Option<ProgressCallback>,
    bus: Option<Arc<EventBus>>,
    correlation_id: Option<String>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(mut self, callback: ProgressCallback) -> Self {
        self.on_event = Some(callback);
        self
    }

    pub fn with_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Attach a correlation id to every bus event.
    pub fn with_correlation_id(mut self, correlation_id: Option<String>) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    /// Emit `event` with `payload` merged into the message. Non-object
    /// payloads are placed under `data`.
    pub fn emit(&self, event: &str, payload: Value) {
        let mut message = Map::new();
        message.insert("event".into(), Value::String(event.to_string()));
        match payload {
            Value::Object(fields) => message.extend(fields),
            Value::Null => {}
            other => {
                message.insert("data".into(), other);
            }
        }
        let message = Value::Object(message);

        tracing::debug!(event, "Workflow progress");

        if let Some(callback) = &self.on_event {
            callback(&message);
        }

        if let Some(bus) = &self.bus {
            let event_type = if event.strip_prefix(BUS_EVENT_PREFIX).is_some_and(|rest| rest.starts_with('.')) {
                event.to_string()
            } else {
                format!("{BUS_EVENT_PREFIX}.{event}")
            };
            bus.publish(
                BusEvent::new(BUS_CHANNEL, event_type)
                    .with_data(message)
                    .with_correlation_id(self.correlation_id.as_deref()),
            );
        }
    }

    /// Emit an event scoped to a step: the payload gains `step_id`.
    pub fn emit_step(&self, event: &str, step_id: &str, extra: Value) {
        let mut payload = match extra {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        payload.insert("step_id".into(), Value::String(step_id.to_string()));
        self.emit(event, Value::Object(payload));
    }
}

impl std::fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("callback", &self.on_event.is_some())
            .field("bus", &self.bus.is_some())
            .field("correlation_id", &self.correlation_id)
            .finish()
    }
}

/// Collects every emitted message. Used by tests and the CLI.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<std::sync::Mutex<Vec<Value>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A callback that appends to this log.
    pub fn callback(&self) -> ProgressCallback {
        let events = Arc::clone(&self.events);
        Arc::new(move |message: &Value| {
            if let Ok(mut guard) = events.lock() {
                guard.push(message.clone());
            }
        })
    }

    pub fn events(&self) -> Vec<Value> {
        self.events.lock().map(|g| g.clone()).unwrap_or_default()
    }

    /// Names of the emitted events, in order.
    pub fn names(&self) -> Vec<String> {
        self.events()
            .iter()
            .filter_map(|e| e.get("event").and_then(Value::as_str).map(str::to_string))
            .collect()
    }

    /// `(event, step_id)` pairs for step lifecycle events.
    pub fn step_events(&self) -> Vec<(String, String)> {
        self.events()
            .iter()
            .filter_map(|e| {
                let name = e.get("event")?.as_str()?;
                let step = e.get("step_id")?.as_str()?;
                name.starts_with("step.")
                    .then(|| (name.to_string(), step.to_string()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn callback_receives_flattened_message() {
        let log = EventLog::new();
        let tracker = ProgressTracker::new().with_callback(log.callback());
        tracker.emit("convert.done", json!({"outputs": 2}));
        tracker.emit_step("step.started", "convert_manifest", Value::Null);

        let events = log.events();
        assert_eq!(events[0], json!({"event": "convert.done", "outputs": 2}));
        assert_eq!(
            log.step_events(),
            vec![("step.started".to_string(), "convert_manifest".to_string())]
        );
    }

    #[tokio::test]
    async fn bus_receives_prefixed_event() {
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let tracker = ProgressTracker::new()
            .with_bus(Arc::clone(&bus))
            .with_correlation_id(Some("corr-1".into()));

        tracker.emit("step.started", json!({}));
        tracker.emit("workflow.start", json!({}));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.channel, "workflow");
        assert_eq!(event.event_type, "workflow.step.started");
        assert_eq!(rx.recv().await.unwrap().event_type, "workflow.start");
        assert_eq!(event.data["correlation_id"], "corr-1");
    }

    #[test]
    fn disabled_bus_never_fails() {
        let tracker = ProgressTracker::new().with_bus(Arc::new(EventBus::disabled()));
        tracker.emit("step.skipped", json!({"step_id": "render"}));
    }
}
