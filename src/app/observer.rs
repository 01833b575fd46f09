//! Structured event sink handed to every pipeline component.
//!
//! Parsing, standardization and persistence never log through a global.
//! They emit [`Event`]s into an injected [`Observer`]; the binary uses
//! [`TracingObserver`], tests use [`MemoryObserver`].

use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone)]
pub struct Event {
    pub level: Level,
    pub component: &'static str,
    pub message: String,
    pub fields: Vec<(&'static str, String)>,
}

impl Event {
    pub fn new(level: Level, component: &'static str, message: impl Into<String>) -> Self {
        Self {
            level,
            component,
            message: message.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, key: &'static str, value: impl ToString) -> Self {
        self.fields.push((key, value.to_string()));
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }
}

pub trait Observer: Send + Sync {
    fn record(&self, event: Event);
}

/// Forwards events to `tracing`, keeping component and fields.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn record(&self, event: Event) {
        let fields = event
            .fields
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(" ");

        match event.level {
            Level::Debug => {
                tracing::debug!(component = event.component, %fields, "{}", event.message)
            }
            Level::Info => {
                tracing::info!(component = event.component, %fields, "{}", event.message)
            }
            Level::Warn => {
                tracing::warn!(component = event.component, %fields, "{}", event.message)
            }
            Level::Error => {
                tracing::error!(component = event.component, %fields, "{}", event.message)
            }
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl Observer for NullObserver {
    fn record(&self, _event: Event) {}
}

/// Keeps every event in memory. Used by tests to assert on pipeline behavior.
#[derive(Debug, Default)]
pub struct MemoryObserver {
    events: Mutex<Vec<Event>>,
}

impl MemoryObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn by_component(&self, component: &str) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| e.component == component)
            .collect()
    }
}

impl Observer for MemoryObserver {
    fn record(&self, event: Event) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

pub fn tracing_observer() -> Arc<dyn Observer> {
    Arc::new(TracingObserver)
}
