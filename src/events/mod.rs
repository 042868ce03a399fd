//! Observability event sink.
//!
//! The core produces events to a sink and never blocks on it; running with
//! the default [`NoOpEventSink`] must not affect correctness.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, error, info, warn};

/// Severity of an emitted event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventLevel {
    /// Diagnostic detail.
    Debug,
    /// Normal lifecycle.
    Info,
    /// Degraded but continuing.
    Warning,
    /// A failure was recorded.
    Error,
}

impl fmt::Display for EventLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// One observability event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Severity.
    pub level: EventLevel,
    /// The component that produced the event (e.g. "orchestrator").
    pub component: String,
    /// Human-readable message.
    pub message: String,
    /// The agent involved, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    /// Structured payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// When the event was created.
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Creates a new event.
    #[must_use]
    pub fn new(level: EventLevel, component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            component: component.into(),
            message: message.into(),
            agent: None,
            data: None,
            timestamp: Utc::now(),
        }
    }

    /// Attaches the agent name.
    #[must_use]
    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    /// Attaches a structured payload.
    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Trait for sinks that receive observability events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits an event asynchronously.
    async fn emit(&self, event: Event);

    /// Emits an event without blocking. Must never panic or raise;
    /// delivery failures are swallowed.
    fn try_emit(&self, event: Event);
}

/// A sink that discards all events. The default when none is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event: Event) {}

    fn try_emit(&self, _event: Event) {}
}

/// A sink that forwards events to the `tracing` framework.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingEventSink;

impl LoggingEventSink {
    /// Creates a new logging sink.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn log(event: &Event) {
        match event.level {
            EventLevel::Debug => debug!(
                component = %event.component,
                agent = ?event.agent,
                data = ?event.data,
                "{}", event.message
            ),
            EventLevel::Info => info!(
                component = %event.component,
                agent = ?event.agent,
                data = ?event.data,
                "{}", event.message
            ),
            EventLevel::Warning => warn!(
                component = %event.component,
                agent = ?event.agent,
                data = ?event.data,
                "{}", event.message
            ),
            EventLevel::Error => error!(
                component = %event.component,
                agent = ?event.agent,
                data = ?event.data,
                "{}", event.message
            ),
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event: Event) {
        Self::log(&event);
    }

    fn try_emit(&self, event: Event) {
        Self::log(&event);
    }
}

/// A sink that collects events in memory, for tests.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: parking_lot::RwLock<Vec<Event>>,
}

impl CollectingEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.events.read().clone()
    }

    /// Returns events whose message starts with the given prefix.
    #[must_use]
    pub fn events_matching(&self, message_prefix: &str) -> Vec<Event> {
        self.events
            .read()
            .iter()
            .filter(|e| e.message.starts_with(message_prefix))
            .cloned()
            .collect()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events were collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event: Event) {
        self.events.write().push(event);
    }

    fn try_emit(&self, event: Event) {
        self.events.write().push(event);
    }
}
