//! Per-plugin configuration access with merge and schema validation.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use billhub_core::error::AppError;
use billhub_core::result::AppResult;
use billhub_database::store::{AuditLogger, PluginConfigStore};
use billhub_entity::audit::PluginAction;

use crate::api::services::audit_best_effort;
use crate::locks::NameLocks;
use crate::schema::ConfigSchema;

/// Reads and writes plugin configuration objects.
///
/// Writes to the same plugin id are serialized, so concurrent partial
/// updates each merge over the result of the previous one. Adapters
/// obtained from the same [`PluginServices`](crate::PluginServices) share
/// their locks.
#[derive(Debug, Clone)]
pub struct ConfigStoreAdapter {
    store: Arc<dyn PluginConfigStore>,
    audit: Arc<dyn AuditLogger>,
    locks: Arc<NameLocks>,
}

impl ConfigStoreAdapter {
    /// Wrap a config store and audit trail.
    pub fn new(store: Arc<dyn PluginConfigStore>, audit: Arc<dyn AuditLogger>) -> Self {
        Self::with_locks(store, audit, Arc::new(NameLocks::new()))
    }

    pub(crate) fn with_locks(
        store: Arc<dyn PluginConfigStore>,
        audit: Arc<dyn AuditLogger>,
        locks: Arc<NameLocks>,
    ) -> Self {
        Self { store, audit, locks }
    }

    /// Current configuration, or an empty object when none is stored.
    pub async fn get_plugin_config(&self, plugin_id: &str) -> AppResult<Map<String, Value>> {
        Ok(self.store.get(plugin_id).await?.unwrap_or_default())
    }

    /// Shallow-merge `partial` into the stored configuration and persist
    /// the result. A `null` value removes the key.
    ///
    /// The merged object is validated against `schema` before anything is
    /// written; on violation the stored configuration is untouched.
    pub async fn set_plugin_config(
        &self,
        plugin_id: &str,
        partial: Map<String, Value>,
        schema: Option<&ConfigSchema>,
    ) -> AppResult<Map<String, Value>> {
        let _guard = self.locks.lock(plugin_id).await;
        let mut merged = self.get_plugin_config(plugin_id).await?;
        let changed: Vec<String> = partial.keys().cloned().collect();
        for (key, value) in partial {
            if value.is_null() {
                merged.remove(&key);
            } else {
                merged.insert(key, value);
            }
        }

        validate_against(plugin_id, &merged, schema)?;
        self.store.upsert(plugin_id, &merged).await?;

        debug!(plugin_id = %plugin_id, keys = ?changed, "Plugin configuration updated");
        audit_best_effort(
            self.audit.as_ref(),
            PluginAction::Configure,
            plugin_id,
            Some(serde_json::json!({ "keys": changed })),
        )
        .await;

        Ok(merged)
    }

    /// Initialize configuration from schema defaults overlaid with
    /// `defaults` if none exists yet. Returns the effective configuration.
    pub async fn create_settings(
        &self,
        plugin_id: &str,
        defaults: Map<String, Value>,
        schema: Option<&ConfigSchema>,
    ) -> AppResult<Map<String, Value>> {
        let _guard = self.locks.lock(plugin_id).await;
        if let Some(existing) = self.store.get(plugin_id).await? {
            return Ok(existing);
        }

        let mut initial = schema.map(ConfigSchema::defaults).unwrap_or_default();
        initial.extend(defaults);

        validate_against(plugin_id, &initial, schema)?;
        self.store.upsert(plugin_id, &initial).await?;

        debug!(plugin_id = %plugin_id, "Plugin settings created");
        Ok(initial)
    }

    /// Remove the stored configuration.
    pub async fn delete_settings(&self, plugin_id: &str) -> AppResult<()> {
        let result = {
            let _guard = self.locks.lock(plugin_id).await;
            self.store.delete(plugin_id).await
        };
        self.locks.evict(plugin_id);
        result
    }
}

fn validate_against(
    plugin_id: &str,
    config: &Map<String, Value>,
    schema: Option<&ConfigSchema>,
) -> AppResult<()> {
    match schema.map(|s| s.validate(config)) {
        Some(Err(violations)) => Err(AppError::validation(format!(
            "Plugin '{}': invalid configuration: {}",
            plugin_id,
            violations.join("; ")
        ))),
        _ => Ok(()),
    }
}
