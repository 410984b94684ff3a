//! Event types shared between the dispatcher and the event watcher.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A scalar severity in `[0..10]` attached to health events, used by UIs
/// to choose iconography.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Priority(u8);

impl Priority {
    pub const MIN: Priority = Priority(0);
    pub const MAX: Priority = Priority(10);

    /// Clamp `value` into `[0..10]`.
    pub fn new(value: u8) -> Self {
        Self(value.min(10))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The type tag of an event, used as the key for the "last event per
/// type" cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Dispatcher,
    Health,
    /// `logfile:<tag>` — tag identifies the watched file, e.g. "replication", "snapshots".
    LogFile(String),
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Dispatcher => f.write_str("dispatcher"),
            EventType::Health => f.write_str("health"),
            EventType::LogFile(tag) => write!(f, "logfile:{tag}"),
        }
    }
}

/// A single emitted event.
///
/// `payload` is a structured map that is domain-specific per type — a
/// closed enum per log line would fight the classifier's free-form
/// nature, so it is kept as JSON, keeping wire-facing DTOs loosely
/// typed at the edges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(event_type: EventType, payload: serde_json::Value, timestamp: DateTime<Utc>) -> Self {
        Self { event_type, payload, timestamp }
    }
}
