use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use qorch_core::model::{Event, EventData, EventPayload, EventType};
use qorch_core::Error;
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use crate::handler::{Handler, Middleware};

/// Single-process publish/subscribe event bus.
///
/// Registers typed handlers (keyed by `EventType`) and wildcard handlers
/// (receiving every event), applies a middleware chain before dispatch, and
/// keeps a ring buffer of the last `max_history` events for inspection.
///
/// `emit` is specified as producing a lazy sequence of response events;
/// this implementation awaits every handler synchronously within one call
/// and returns the fully collected `Vec<Event>`, so `emit_and_collect` is a
/// thin alias kept for call-site clarity against the three-operation
/// surface the specification names (`emit`, `publish`, `emit_and_collect`).
pub struct EventBus {
    typed_handlers: DashMap<&'static str, Vec<Arc<dyn Handler>>>,
    wildcard_handlers: Mutex<Vec<Arc<dyn Handler>>>,
    middleware: Mutex<Vec<Arc<dyn Middleware>>>,
    history: Mutex<VecDeque<Event>>,
    max_history: usize,
}

impl EventBus {
    #[must_use]
    pub fn new(max_history: usize) -> Self {
        Self {
            typed_handlers: DashMap::new(),
            wildcard_handlers: Mutex::new(Vec::new()),
            middleware: Mutex::new(Vec::new()),
            history: Mutex::new(VecDeque::with_capacity(max_history)),
            max_history,
        }
    }

    pub fn register_handler(&self, event_type: EventType, handler: Arc<dyn Handler>) {
        self.typed_handlers
            .entry(event_type.as_str())
            .or_default()
            .push(handler);
    }

    pub fn register_wildcard(&self, handler: Arc<dyn Handler>) {
        self.wildcard_handlers.lock().push(handler);
    }

    pub fn register_middleware(&self, middleware: Arc<dyn Middleware>) {
        self.middleware.lock().push(middleware);
    }

    /// Runs the middleware chain in registration order. Any middleware
    /// returning `None` suppresses the event entirely.
    fn apply_middleware(&self, mut event: Event) -> Option<Event> {
        for mw in self.middleware.lock().iter() {
            event = mw.process(event)?;
        }
        Some(event)
    }

    fn record_history(&self, event: &Event) {
        let mut history = self.history.lock();
        if history.len() >= self.max_history {
            history.pop_front();
        }
        history.push_back(event.clone());
    }

    /// Converts a handler failure into an `error` event carrying
    /// `{message, handler_identifier, original_event}` rather than letting
    /// it propagate and tear down the bus.
    fn error_event(handler_name: &str, original: &Event, err: &Error) -> Event {
        Event::new(
            EventType::Error,
            "event_bus",
            original.correlation_id,
            EventPayload::with_data(
                err.to_string(),
                EventData::Opaque(json!({
                    "message": err.to_string(),
                    "handler_identifier": handler_name,
                    "original_event": original,
                })),
            ),
        )
    }

    /// Dispatches one event through middleware, then typed handlers (in
    /// registration order), then wildcard handlers (in registration order).
    /// Returns the concatenation of every handler's response events.
    pub async fn emit(&self, event: Event) -> Vec<Event> {
        let Some(event) = self.apply_middleware(event) else {
            return Vec::new();
        };
        self.record_history(&event);

        let mut responses = Vec::new();

        let typed: Vec<Arc<dyn Handler>> = self
            .typed_handlers
            .get(event.kind.as_str())
            .map(|entry| entry.value().clone())
            .unwrap_or_default();
        for handler in &typed {
            match handler.handle(&event).await {
                Ok(mut events) => responses.append(&mut events),
                Err(err) => {
                    warn!(handler = handler.name(), error = %err, "event handler failed");
                    responses.push(Self::error_event(handler.name(), &event, &err));
                }
            }
        }

        let wildcard: Vec<Arc<dyn Handler>> = self.wildcard_handlers.lock().clone();
        for handler in &wildcard {
            match handler.handle(&event).await {
                Ok(mut events) => responses.append(&mut events),
                Err(err) => {
                    warn!(handler = handler.name(), error = %err, "wildcard event handler failed");
                    responses.push(Self::error_event(handler.name(), &event, &err));
                }
            }
        }

        responses
    }

    /// Fire-and-forget: emits the event and discards any response events.
    pub async fn publish(&self, event: Event) {
        let _ = self.emit(event).await;
    }

    /// Emits the event and returns every response event collected.
    pub async fn emit_and_collect(&self, event: Event) -> Vec<Event> {
        self.emit(event).await
    }

    /// A snapshot of the last `max_history` events, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<Event> {
        self.history.lock().iter().cloned().collect()
    }

    #[must_use]
    pub fn history_for(&self, correlation_id: Uuid) -> Vec<Event> {
        self.history
            .lock()
            .iter()
            .filter(|e| e.correlation_id == correlation_id)
            .cloned()
            .collect()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}
