//! Plugin manager: administrative façade over the registry.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::{info, warn};

use billhub_core::result::AppResult;
use billhub_entity::plugin::PluginStatus;

use crate::dependency::dependency_order;
use crate::hooks::definitions::names;
use crate::loader::{PluginDescriptor, PluginLoader};
use crate::metadata::{PluginInfo, PluginMetadata};
use crate::registry::PluginRegistry;
use crate::traits::Plugin;

/// Metadata and lifecycle info for one plugin.
#[derive(Debug, Clone, Serialize)]
pub struct PluginListing {
    /// Declared metadata.
    pub metadata: PluginMetadata,
    /// Current lifecycle info.
    pub info: PluginInfo,
}

/// Administrative operations over installed plugins.
#[derive(Debug, Clone)]
pub struct PluginManager {
    registry: Arc<PluginRegistry>,
}

impl PluginManager {
    /// Creates a manager over `registry`.
    pub fn new(registry: Arc<PluginRegistry>) -> Self {
        Self { registry }
    }

    /// The underlying registry.
    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    /// Registers and installs a plugin.
    pub async fn install(&self, plugin: Arc<dyn Plugin>) -> AppResult<PluginInfo> {
        self.registry.register(plugin).await
    }

    /// Loads a plugin through `loader` and installs it.
    pub async fn load_and_install(
        &self,
        loader: &mut dyn PluginLoader,
        descriptor: &PluginDescriptor,
    ) -> AppResult<PluginInfo> {
        let plugin = loader.load(descriptor)?;
        self.registry.register(plugin).await
    }

    /// Uninstalls a plugin.
    pub async fn uninstall(&self, name: &str) -> AppResult<()> {
        self.registry.unregister(name).await
    }

    /// Enables a plugin.
    pub async fn enable(&self, name: &str) -> AppResult<PluginInfo> {
        self.registry.enable(name).await
    }

    /// Disables a plugin.
    pub async fn disable(&self, name: &str) -> AppResult<PluginInfo> {
        self.registry.disable(name).await
    }

    /// Enables the named plugins, dependencies first. Returns the
    /// failures; successes and already-enabled plugins are not reported.
    pub async fn enable_all(&self, names: &[String]) -> Vec<(String, String)> {
        let mut metadata = Vec::with_capacity(names.len());
        let mut failures = Vec::new();
        for name in names {
            match self.registry.metadata(name).await {
                Some(meta) => metadata.push(meta),
                None => failures.push((name.clone(), format!("Plugin '{name}' not found"))),
            }
        }

        for name in dependency_order(&metadata) {
            if let Err(e) = self.registry.enable(&name).await {
                warn!(plugin_id = %name, error = %e, "Failed to enable plugin");
                failures.push((name, e.message));
            }
        }
        failures
    }

    /// Every plugin, ordered by name.
    pub async fn list_plugins(&self) -> Vec<PluginListing> {
        self.registry
            .listings()
            .await
            .into_iter()
            .map(|(metadata, info)| PluginListing { metadata, info })
            .collect()
    }

    /// Plugins whose name, description, or keywords contain `query`,
    /// case-insensitively. An empty query matches everything.
    pub async fn search_plugins(&self, query: &str) -> Vec<PluginListing> {
        let query = query.trim().to_lowercase();
        self.list_plugins()
            .await
            .into_iter()
            .filter(|l| query.is_empty() || l.metadata.matches_query(&query))
            .collect()
    }

    /// Plugins currently in `status`.
    pub async fn get_plugins_by_status(&self, status: PluginStatus) -> Vec<PluginListing> {
        self.list_plugins()
            .await
            .into_iter()
            .filter(|l| l.info.status == status)
            .collect()
    }

    /// A plugin's configuration.
    pub async fn get_plugin_config(&self, name: &str) -> AppResult<Map<String, Value>> {
        self.registry
            .context_for(name)
            .await?
            .get_plugin_config()
            .await
    }

    /// Merge `partial` into a plugin's configuration, validated against
    /// its schema, then fire `plugin.configured`.
    pub async fn update_plugin_config(
        &self,
        name: &str,
        partial: Map<String, Value>,
    ) -> AppResult<Map<String, Value>> {
        let keys: Vec<String> = partial.keys().cloned().collect();
        let merged = self.registry.update_plugin_config(name, partial).await?;
        self.registry
            .execute_hook(names::PLUGIN_CONFIGURED, json!({ "plugin": name, "keys": keys }))
            .await;
        Ok(merged)
    }

    /// Invoke one of an enabled plugin's routes.
    pub async fn invoke_route(&self, name: &str, path: &str, request: Value) -> AppResult<Value> {
        let (handler, ctx) = self.registry.route(name, path).await?;
        handler.handle(&ctx, request).await
    }

    /// Fire `system.shutdown`, disable every enabled plugin dependents
    /// first, and wait for queued hooks to drain.
    pub async fn shutdown(&self) {
        self.registry
            .execute_hook(names::SYSTEM_SHUTDOWN, json!({}))
            .await;
        self.registry.dispatcher().flush().await;

        let enabled: Vec<PluginMetadata> = self
            .list_plugins()
            .await
            .into_iter()
            .filter(|l| l.info.is_enabled())
            .map(|l| l.metadata)
            .collect();

        let mut order = dependency_order(&enabled);
        order.reverse();
        for name in order {
            if let Err(e) = self.registry.disable(&name).await {
                warn!(plugin_id = %name, error = %e, "Failed to disable plugin during shutdown");
            }
        }

        self.registry.dispatcher().flush().await;
        info!("Plugin system shut down");
    }
}
