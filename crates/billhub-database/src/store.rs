//! Store traits consumed by the plugin registry.
//!
//! The registry never talks to a database directly. It depends on these
//! four collaborators, implemented by the PostgreSQL repositories in
//! [`crate::repositories`] and by the in-memory stores in `memory`.

use async_trait::async_trait;
use serde_json::{Map, Value};

use billhub_core::result::AppResult;
use billhub_entity::audit::PluginAction;
use billhub_entity::plugin::{PluginErrorRecord, PluginRecord};

/// Durable storage of plugin records.
///
/// Every write performed for a lifecycle transition must be durable once
/// the returned future resolves with `Ok`.
#[async_trait]
pub trait PluginStore: Send + Sync + std::fmt::Debug {
    /// List every persisted plugin record.
    async fn list_installed(&self) -> AppResult<Vec<PluginRecord>>;

    /// Insert or replace the record keyed by `record.name`.
    async fn upsert(&self, record: &PluginRecord) -> AppResult<()>;

    /// Delete the record for `name`. Deleting a missing record is not an error.
    async fn delete(&self, name: &str) -> AppResult<()>;
}

/// Durable per-plugin configuration storage, keyed by plugin name.
#[async_trait]
pub trait PluginConfigStore: Send + Sync + std::fmt::Debug {
    /// Fetch the stored configuration object, if any.
    async fn get(&self, plugin_id: &str) -> AppResult<Option<Map<String, Value>>>;

    /// Insert or replace the configuration object.
    async fn upsert(&self, plugin_id: &str, config: &Map<String, Value>) -> AppResult<()>;

    /// Delete the configuration. Deleting a missing entry is not an error.
    async fn delete(&self, plugin_id: &str) -> AppResult<()>;
}

/// Sink for plugin failures.
///
/// Callers treat this as fire-and-forget: an `Err` is logged and dropped.
#[async_trait]
pub trait ErrorLogSink: Send + Sync + std::fmt::Debug {
    /// Record a plugin failure.
    async fn record(&self, record: PluginErrorRecord) -> AppResult<()>;
}

/// Audit trail for plugin administration actions.
#[async_trait]
pub trait AuditLogger: Send + Sync + std::fmt::Debug {
    /// Record that `action` was performed on `plugin_id`.
    async fn log_plugin_action(
        &self,
        action: PluginAction,
        plugin_id: &str,
        metadata: Option<Value>,
    ) -> AppResult<()>;
}
