//! In-memory plugin table shared by the registry and the hook dispatcher.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use billhub_entity::plugin::PluginStatus;

use crate::dependency::InstalledPlugin;
use crate::metadata::{PluginInfo, PluginMetadata};
use crate::schema::ConfigSchema;
use crate::traits::{ComponentFactory, HookHandler, Plugin, RouteHandler};
use crate::validator::PluginShape;

/// A plugin plus the snapshot of everything it declared at registration.
#[derive(Clone)]
pub(crate) struct RegisteredPlugin {
    pub plugin: Arc<dyn Plugin>,
    pub metadata: PluginMetadata,
    pub schema: Option<Arc<ConfigSchema>>,
    pub hooks: HashMap<String, Arc<dyn HookHandler>>,
    pub routes: HashMap<String, Arc<dyn RouteHandler>>,
    pub components: HashMap<String, Arc<dyn ComponentFactory>>,
}

impl std::fmt::Debug for RegisteredPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredPlugin")
            .field("name", &self.metadata.name)
            .field("hooks", &self.hooks.keys().collect::<Vec<_>>())
            .field("routes", &self.routes.keys().collect::<Vec<_>>())
            .field("components", &self.components.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl RegisteredPlugin {
    /// Read metadata, schema, hooks, routes, and components once.
    pub fn capture(plugin: Arc<dyn Plugin>) -> Self {
        Self {
            metadata: plugin.metadata(),
            schema: plugin.config_schema().map(Arc::new),
            hooks: plugin.hooks(),
            routes: plugin.routes(),
            components: plugin.components(),
            plugin,
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn shape(&self) -> PluginShape<'_> {
        PluginShape {
            metadata: &self.metadata,
            hooks: self.hooks.keys().map(String::as_str).collect(),
            routes: self.routes.keys().map(String::as_str).collect(),
            slots: self.components.keys().map(String::as_str).collect(),
            schema: self.schema.as_deref(),
        }
    }
}

/// A registered plugin and its current lifecycle info.
#[derive(Debug, Clone)]
pub(crate) struct TableEntry {
    pub registered: RegisteredPlugin,
    pub info: PluginInfo,
}

/// One handler to invoke for a hook event.
#[derive(Clone)]
pub(crate) struct HookTarget {
    pub plugin_id: String,
    pub handler: Arc<dyn HookHandler>,
    pub schema: Option<Arc<ConfigSchema>>,
}

/// Name → entry map behind a single lock.
#[derive(Debug, Default)]
pub(crate) struct PluginTable {
    entries: RwLock<HashMap<String, TableEntry>>,
}

impl PluginTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, name: &str) -> Option<TableEntry> {
        self.entries.read().await.get(name).cloned()
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.entries.read().await.contains_key(name)
    }

    pub async fn insert(&self, registered: RegisteredPlugin, info: PluginInfo) {
        let name = registered.name().to_string();
        self.entries
            .write()
            .await
            .insert(name, TableEntry { registered, info });
    }

    /// Replace the info of an existing entry.
    pub async fn set_info(&self, info: PluginInfo) {
        if let Some(entry) = self.entries.write().await.get_mut(&info.name) {
            entry.info = info;
        }
    }

    pub async fn remove(&self, name: &str) -> Option<TableEntry> {
        self.entries.write().await.remove(name)
    }

    /// All entries, ordered by name.
    pub async fn entries(&self) -> Vec<TableEntry> {
        let mut entries: Vec<TableEntry> = self.entries.read().await.values().cloned().collect();
        entries.sort_by(|a, b| a.info.name.cmp(&b.info.name));
        entries
    }

    /// Version and status of every installed plugin.
    pub async fn installed(&self) -> HashMap<String, InstalledPlugin> {
        self.entries
            .read()
            .await
            .iter()
            .map(|(name, e)| {
                (
                    name.clone(),
                    InstalledPlugin {
                        version: e.info.version.clone(),
                        status: e.info.status,
                    },
                )
            })
            .collect()
    }

    /// Enabled plugins that declare `name` as a dependency, ordered by name.
    pub async fn enabled_dependents(&self, name: &str) -> Vec<String> {
        let mut dependents: Vec<String> = self
            .entries
            .read()
            .await
            .values()
            .filter(|e| {
                e.info.status == PluginStatus::Enabled
                    && e.registered.metadata.dependencies.contains_key(name)
            })
            .map(|e| e.info.name.clone())
            .collect();
        dependents.sort();
        dependents
    }

    /// Handlers of enabled plugins subscribed to `hook`, ordered by plugin name.
    pub async fn hook_targets(&self, hook: &str) -> Vec<HookTarget> {
        let mut targets: Vec<HookTarget> = self
            .entries
            .read()
            .await
            .values()
            .filter(|e| e.info.status == PluginStatus::Enabled)
            .filter_map(|e| {
                e.registered.hooks.get(hook).map(|handler| HookTarget {
                    plugin_id: e.info.name.clone(),
                    handler: handler.clone(),
                    schema: e.registered.schema.clone(),
                })
            })
            .collect();
        targets.sort_by(|a, b| a.plugin_id.cmp(&b.plugin_id));
        targets
    }
}
