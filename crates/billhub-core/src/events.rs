//! Outward plugin events.
//!
//! Plugins broadcast their own named events through [`EventEmitter`]. This
//! channel is distinct from the internal hook dispatch queue: hooks flow
//! *into* plugins, events flow *out of* them to the rest of the system.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A named event broadcast by a plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginEvent {
    /// Unique event ID.
    pub id: Uuid,
    /// The plugin that emitted the event.
    pub source: String,
    /// Event name (e.g. `"proration.calculated"`).
    pub name: String,
    /// Arbitrary event data.
    pub data: Value,
    /// When the event was emitted.
    pub timestamp: DateTime<Utc>,
}

impl PluginEvent {
    /// Create a new plugin event.
    pub fn new(source: impl Into<String>, name: impl Into<String>, data: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            source: source.into(),
            name: name.into(),
            data,
            timestamp: Utc::now(),
        }
    }
}

/// Sink for outward plugin events.
///
/// Emitting never fails from the caller's perspective; implementations
/// drop events nobody is listening for.
pub trait EventEmitter: Send + Sync + std::fmt::Debug {
    /// Broadcast an event to all current subscribers.
    fn emit(&self, event: PluginEvent);
}
