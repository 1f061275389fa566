//! UI slot registry: components contributed by enabled plugins.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use crate::registry::PluginRegistry;
use crate::traits::ComponentFactory;

/// A component an enabled plugin contributes to a slot.
#[derive(Clone)]
pub struct SlotComponent {
    /// The contributing plugin.
    pub plugin_id: String,
    /// The component factory.
    pub factory: Arc<dyn ComponentFactory>,
}

impl std::fmt::Debug for SlotComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotComponent")
            .field("plugin_id", &self.plugin_id)
            .field("component", &self.factory.component_name())
            .finish()
    }
}

/// Slot id → components, rebuilt from the registry on refresh.
#[derive(Debug)]
pub struct SlotRegistry {
    registry: Arc<PluginRegistry>,
    slots: RwLock<BTreeMap<String, Vec<SlotComponent>>>,
}

impl SlotRegistry {
    /// Creates an empty slot registry; call [`refresh_slots`](Self::refresh_slots) to populate it.
    pub fn new(registry: Arc<PluginRegistry>) -> Self {
        Self {
            registry,
            slots: RwLock::new(BTreeMap::new()),
        }
    }

    /// Rebuild the slot map from currently enabled plugins. Components
    /// within a slot are ordered by plugin name.
    pub async fn refresh_slots(&self) {
        let mut slots: BTreeMap<String, Vec<SlotComponent>> = BTreeMap::new();
        for entry in self.registry.entries().await {
            if !entry.info.is_enabled() {
                continue;
            }
            for (slot, factory) in &entry.registered.components {
                slots.entry(slot.clone()).or_default().push(SlotComponent {
                    plugin_id: entry.info.name.clone(),
                    factory: factory.clone(),
                });
            }
        }

        debug!(slot_count = slots.len(), "Plugin UI slots refreshed");
        *self.slots.write().await = slots;
    }

    /// Components registered for `slot` as of the last refresh.
    pub async fn get_slot_components(&self, slot: &str) -> Vec<SlotComponent> {
        self.slots.read().await.get(slot).cloned().unwrap_or_default()
    }

    /// Slot ids with at least one component.
    pub async fn slot_ids(&self) -> Vec<String> {
        self.slots.read().await.keys().cloned().collect()
    }

    /// Render every component in `slot` with the same props.
    pub async fn render_slot(&self, slot: &str, props: &Value) -> Vec<Value> {
        self.get_slot_components(slot)
            .await
            .iter()
            .map(|c| c.factory.render(props))
            .collect()
    }
}
