/*!
 * Progress events.
 *
 * The orchestrator reports coarse checkpoints through an `EventPublisher`.
 * Delivery failures are never fatal: `emit_progress` and `emit_error` log and
 * swallow them.
 */

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::EventError;

/// Event type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    TranslationStarted,
    TranslationProgress,
    TranslationCompleted,
    TranslationError,
}

/// A progress event. Observers recognize at least the `phase`,
/// `content_type` and `genre` payload keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub event_type: EventType,
    pub session_id: String,
    pub message: String,
    #[serde(default)]
    pub data: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Create an event with an empty payload.
    pub fn new(event_type: EventType, session_id: &str, message: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            session_id: session_id.to_string(),
            message: message.to_string(),
            data: Map::new(),
            timestamp: Utc::now(),
        }
    }

    /// Add a payload entry, builder style.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.data.insert(key.to_string(), value.into());
        self
    }

    /// Payload entry as a string, if present and textual.
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }
}

/// Event sink contract.
pub trait EventPublisher: Send + Sync {
    /// Deliver one event
    fn publish(&self, event: Event) -> Result<(), EventError>;
}

/// Subscriber callback
pub type EventHandler = Arc<dyn Fn(&Event) + Send + Sync>;

/// In-process publish/subscribe bus with per-type subscribers.
#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<HashMap<EventType, Vec<EventHandler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for one event type.
    pub fn subscribe<F>(&self, event_type: EventType, handler: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.subscribers
            .write()
            .entry(event_type)
            .or_default()
            .push(Arc::new(handler));
    }

    /// Number of callbacks registered for a type.
    pub fn subscriber_count(&self, event_type: EventType) -> usize {
        self.subscribers
            .read()
            .get(&event_type)
            .map_or(0, Vec::len)
    }
}

impl EventPublisher for EventBus {
    fn publish(&self, event: Event) -> Result<(), EventError> {
        // Clone handlers out so callbacks may subscribe without deadlocking.
        let handlers: Vec<EventHandler> = self
            .subscribers
            .read()
            .get(&event.event_type)
            .cloned()
            .unwrap_or_default();

        for handler in handlers {
            handler(&event);
        }
        Ok(())
    }
}

/// Publisher that writes events through the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPublisher;

impl EventPublisher for LogPublisher {
    fn publish(&self, event: Event) -> Result<(), EventError> {
        match event.event_type {
            EventType::TranslationError => warn!("[{}] {}", event.session_id, event.message),
            _ => info!("[{}] {}", event.session_id, event.message),
        }
        if !event.data.is_empty() {
            debug!("  {}", Value::Object(event.data.clone()));
        }
        Ok(())
    }
}

/// Publish an event, absorbing delivery failures.
pub fn emit(publisher: &dyn EventPublisher, event: Event) {
    let event_type = event.event_type;
    if let Err(e) = publisher.publish(event) {
        warn!("Dropped {:?} event: {}", event_type, e);
    }
}

/// Publish a progress event with the given payload entries.
pub fn emit_progress<'a>(
    publisher: &dyn EventPublisher,
    session_id: &str,
    message: &str,
    data: impl IntoIterator<Item = (&'a str, Value)>,
) {
    let mut event = Event::new(EventType::TranslationProgress, session_id, message);
    for (key, value) in data {
        event.data.insert(key.to_string(), value);
    }
    emit(publisher, event);
}

/// Publish an error event carrying the error text under `error`.
pub fn emit_error(
    publisher: &dyn EventPublisher,
    session_id: &str,
    message: &str,
    error: &dyn std::error::Error,
) {
    let event = Event::new(EventType::TranslationError, session_id, message)
        .with("error", error.to_string());
    emit(publisher, event);
}
