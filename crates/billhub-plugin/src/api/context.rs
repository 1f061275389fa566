//! Plugin context: the capabilities a plugin receives from the host.

use std::sync::Arc;

use serde_json::{Map, Value};

use billhub_core::events::{EventEmitter, PluginEvent};
use billhub_core::result::AppResult;
use billhub_database::store::AuditLogger;
use billhub_entity::audit::PluginAction;

use crate::config_store::ConfigStoreAdapter;
use crate::schema::ConfigSchema;

/// Context passed to lifecycle callbacks, hook handlers, and routes.
///
/// Every capability is bound to the owning plugin: configuration reads
/// and writes, audit entries, and emitted events all carry its id, so a
/// plugin cannot act on another plugin's data through its context.
#[derive(Clone)]
pub struct PluginContext {
    plugin_id: String,
    logger: PluginLogger,
    emitter: Arc<dyn EventEmitter>,
    audit: Arc<dyn AuditLogger>,
    config: ConfigStoreAdapter,
    schema: Option<Arc<ConfigSchema>>,
}

impl std::fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginContext")
            .field("plugin_id", &self.plugin_id)
            .field("has_schema", &self.schema.is_some())
            .finish()
    }
}

impl PluginContext {
    pub(crate) fn new(
        plugin_id: &str,
        emitter: Arc<dyn EventEmitter>,
        audit: Arc<dyn AuditLogger>,
        config: ConfigStoreAdapter,
        schema: Option<Arc<ConfigSchema>>,
    ) -> Self {
        Self {
            plugin_id: plugin_id.to_string(),
            logger: PluginLogger::new(plugin_id),
            emitter,
            audit,
            config,
            schema,
        }
    }

    /// The owning plugin's name.
    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    /// Logger tagged with the owning plugin's name.
    pub fn logger(&self) -> &PluginLogger {
        &self.logger
    }

    /// Broadcast a named event from this plugin.
    pub fn emit(&self, name: &str, data: Value) {
        self.emitter
            .emit(PluginEvent::new(self.plugin_id.as_str(), name, data));
    }

    /// Append an audit entry for this plugin.
    pub async fn audit(&self, action: PluginAction, details: Option<Value>) -> AppResult<()> {
        self.audit
            .log_plugin_action(action, &self.plugin_id, details)
            .await
    }

    /// This plugin's configuration (empty when none is stored).
    pub async fn get_plugin_config(&self) -> AppResult<Map<String, Value>> {
        self.config.get_plugin_config(&self.plugin_id).await
    }

    /// Merge `partial` into this plugin's configuration.
    pub async fn set_plugin_config(&self, partial: Map<String, Value>) -> AppResult<Map<String, Value>> {
        self.config
            .set_plugin_config(&self.plugin_id, partial, self.schema.as_deref())
            .await
    }

    /// Initialize this plugin's configuration if absent.
    pub async fn create_settings(&self, defaults: Map<String, Value>) -> AppResult<Map<String, Value>> {
        self.config
            .create_settings(&self.plugin_id, defaults, self.schema.as_deref())
            .await
    }

    /// Remove this plugin's configuration.
    pub async fn delete_settings(&self) -> AppResult<()> {
        self.config.delete_settings(&self.plugin_id).await
    }
}

/// Structured logger bound to one plugin.
#[derive(Debug, Clone)]
pub struct PluginLogger {
    plugin_id: String,
}

impl PluginLogger {
    fn new(plugin_id: &str) -> Self {
        Self {
            plugin_id: plugin_id.to_string(),
        }
    }

    /// Debug-level message.
    pub fn debug(&self, message: &str) {
        tracing::debug!(target: "billhub::plugin", plugin_id = %self.plugin_id, "{}", message);
    }

    /// Info-level message.
    pub fn info(&self, message: &str) {
        tracing::info!(target: "billhub::plugin", plugin_id = %self.plugin_id, "{}", message);
    }

    /// Warn-level message.
    pub fn warn(&self, message: &str) {
        tracing::warn!(target: "billhub::plugin", plugin_id = %self.plugin_id, "{}", message);
    }

    /// Error-level message.
    pub fn error(&self, message: &str) {
        tracing::error!(target: "billhub::plugin", plugin_id = %self.plugin_id, "{}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use billhub_database::memory::{MemoryAuditLog, MemoryConfigStore};
    use serde_json::json;

    use crate::api::events::BroadcastEmitter;

    #[tokio::test]
    async fn test_context_is_bound_to_plugin() {
        let store = MemoryConfigStore::new();
        let audit = MemoryAuditLog::new();
        let emitter = BroadcastEmitter::new(16);
        let mut rx = emitter.subscribe();
        let config = ConfigStoreAdapter::new(Arc::new(store.clone()), Arc::new(audit.clone()));
        let ctx = PluginContext::new(
            "ledger",
            Arc::new(emitter),
            Arc::new(audit.clone()),
            config,
            None,
        );

        let mut partial = Map::new();
        partial.insert("currency".to_string(), json!("EUR"));
        ctx.set_plugin_config(partial).await.unwrap();
        assert!(store.contains("ledger"));
        assert_eq!(ctx.get_plugin_config().await.unwrap()["currency"], "EUR");

        ctx.emit("ledger.synced", json!({ "rows": 3 }));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.source, "ledger");
        assert_eq!(event.name, "ledger.synced");

        ctx.audit(PluginAction::Enable, None).await.unwrap();
        assert_eq!(audit.count(PluginAction::Enable, "ledger").await, 1);

        ctx.delete_settings().await.unwrap();
        assert!(!store.contains("ledger"));
    }
}
