//! Hook names, payloads, and dispatch reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Well-known hook names fired by the host.
pub mod names {
    // ── Plugin lifecycle ──
    /// A plugin was registered.
    pub const PLUGIN_INSTALLED: &str = "plugin.installed";
    /// A plugin was unregistered.
    pub const PLUGIN_UNINSTALLED: &str = "plugin.uninstalled";
    /// A plugin was enabled.
    pub const PLUGIN_ENABLED: &str = "plugin.enabled";
    /// A plugin was disabled.
    pub const PLUGIN_DISABLED: &str = "plugin.disabled";
    /// A plugin's configuration changed through the manager.
    pub const PLUGIN_CONFIGURED: &str = "plugin.configured";

    // ── System ──
    /// The host finished startup.
    pub const SYSTEM_STARTED: &str = "system.started";
    /// The host is shutting down.
    pub const SYSTEM_SHUTDOWN: &str = "system.shutdown";

    // ── Billing ──
    /// An invoice was created.
    pub const INVOICE_CREATED: &str = "invoice.created";
    /// An invoice was paid.
    pub const INVOICE_PAID: &str = "invoice.paid";
    /// A subscription was created.
    pub const SUBSCRIPTION_CREATED: &str = "subscription.created";
    /// A subscription moved to a different plan mid-period.
    pub const SUBSCRIPTION_PLAN_CHANGED: &str = "subscription.plan_changed";
    /// A subscription was cancelled.
    pub const SUBSCRIPTION_CANCELLED: &str = "subscription.cancelled";
}

/// Payload delivered to every handler of one hook event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookPayload {
    /// Unique event ID.
    pub id: Uuid,
    /// Hook name.
    pub hook: String,
    /// Event data.
    pub data: Value,
    /// When the event was enqueued.
    pub timestamp: DateTime<Utc>,
}

impl HookPayload {
    /// Creates a payload carrying `data`.
    pub fn new(hook: impl Into<String>, data: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            hook: hook.into(),
            data,
            timestamp: Utc::now(),
        }
    }

    /// Creates a payload with an empty data object.
    pub fn empty(hook: impl Into<String>) -> Self {
        Self::new(hook, Value::Object(Map::new()))
    }

    /// Sets a data field, turning non-object data into an object first.
    pub fn with_data(mut self, key: &str, value: impl Into<Value>) -> Self {
        if !self.data.is_object() {
            self.data = Value::Object(Map::new());
        }
        if let Value::Object(map) = &mut self.data {
            map.insert(key.to_string(), value.into());
        }
        self
    }

    /// Gets a data field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Gets a string data field.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    /// Gets an integer data field.
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.data.get(key).and_then(Value::as_i64)
    }

    /// Deserializes the whole data value into `T`.
    pub fn parse<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.data)
    }
}

/// One handler failure within a dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerFailure {
    /// The plugin whose handler failed.
    pub plugin_id: String,
    /// Failure message.
    pub message: String,
    /// Whether the handler exceeded its execution window.
    pub timed_out: bool,
}

/// Outcome of dispatching one hook event to every target.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatchReport {
    /// Hook name.
    pub hook: String,
    /// Event ID.
    pub event_id: Uuid,
    /// Plugins whose handler was invoked, by name.
    pub invoked: Vec<String>,
    /// Handlers that failed, timed out, or panicked.
    pub failures: Vec<HandlerFailure>,
}

impl DispatchReport {
    /// Whether every invoked handler succeeded.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Plugins whose handler completed successfully.
    pub fn succeeded(&self) -> Vec<&str> {
        self.invoked
            .iter()
            .filter(|p| !self.failures.iter().any(|f| &f.plugin_id == *p))
            .map(String::as_str)
            .collect()
    }
}
