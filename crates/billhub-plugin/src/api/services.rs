//! The host services bundle handed to the registry and to plugin contexts.

use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use billhub_core::error::AppError;
use billhub_core::events::EventEmitter;
use billhub_database::store::{AuditLogger, ErrorLogSink, PluginConfigStore, PluginStore};
use billhub_entity::audit::PluginAction;
use billhub_entity::plugin::PluginErrorRecord;

use super::context::PluginContext;
use crate::config_store::ConfigStoreAdapter;
use crate::locks::NameLocks;
use crate::schema::ConfigSchema;

/// Store, log, and event collaborators the plugin system is built on.
#[derive(Debug, Clone)]
pub struct PluginServices {
    /// Durable plugin records.
    pub store: Arc<dyn PluginStore>,
    /// Per-plugin configuration.
    pub config_store: Arc<dyn PluginConfigStore>,
    /// Sink for plugin failures.
    pub error_log: Arc<dyn ErrorLogSink>,
    /// Audit trail.
    pub audit: Arc<dyn AuditLogger>,
    /// Outward event channel.
    pub emitter: Arc<dyn EventEmitter>,
    config_locks: Arc<NameLocks>,
}

impl PluginServices {
    /// Bundle the given collaborators.
    pub fn new(
        store: Arc<dyn PluginStore>,
        config_store: Arc<dyn PluginConfigStore>,
        error_log: Arc<dyn ErrorLogSink>,
        audit: Arc<dyn AuditLogger>,
        emitter: Arc<dyn EventEmitter>,
    ) -> Self {
        Self {
            store,
            config_store,
            error_log,
            audit,
            emitter,
            config_locks: Arc::new(NameLocks::new()),
        }
    }

    /// Configuration access on top of the config store. Every adapter
    /// handed out by one services bundle serializes writes per plugin.
    pub fn config(&self) -> ConfigStoreAdapter {
        ConfigStoreAdapter::with_locks(
            self.config_store.clone(),
            self.audit.clone(),
            self.config_locks.clone(),
        )
    }

    /// Build the context scoped to one plugin.
    pub fn context_for(&self, plugin_id: &str, schema: Option<Arc<ConfigSchema>>) -> PluginContext {
        PluginContext::new(
            plugin_id,
            self.emitter.clone(),
            self.audit.clone(),
            self.config(),
            schema,
        )
    }

    /// Append an audit entry; failures are logged and dropped.
    pub(crate) async fn audit(&self, action: PluginAction, plugin_id: &str, details: Option<Value>) {
        audit_best_effort(self.audit.as_ref(), action, plugin_id, details).await;
    }

    /// Record a plugin failure; failures of the sink itself are logged and dropped.
    pub(crate) async fn record_error(&self, plugin_id: &str, operation: &str, error: &AppError) {
        let mut record = PluginErrorRecord::new(plugin_id, operation, error.message.clone());
        if let Some(source) = std::error::Error::source(error) {
            record = record.with_stack(source.to_string());
        }
        if let Err(e) = self.error_log.record(record).await {
            warn!(
                plugin_id = %plugin_id,
                operation = %operation,
                error = %e,
                "Failed to record plugin error"
            );
        }
    }
}

/// Append an audit entry, logging instead of failing.
pub(crate) async fn audit_best_effort(
    audit: &dyn AuditLogger,
    action: PluginAction,
    plugin_id: &str,
    details: Option<Value>,
) {
    if let Err(e) = audit.log_plugin_action(action, plugin_id, details).await {
        warn!(
            plugin_id = %plugin_id,
            action = %action,
            error = %e,
            "Failed to write audit entry"
        );
    }
}
