//! In-memory plugin stores.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use billhub_core::result::AppResult;
use billhub_entity::audit::{AuditLogEntry, PluginAction};
use billhub_entity::plugin::{PluginErrorRecord, PluginRecord};

use crate::store::{AuditLogger, ErrorLogSink, PluginConfigStore, PluginStore};

/// In-memory plugin record store.
#[derive(Debug, Clone, Default)]
pub struct MemoryPluginStore {
    records: Arc<DashMap<String, PluginRecord>>,
}

impl MemoryPluginStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the stored record for `name`, if any.
    pub fn get(&self, name: &str) -> Option<PluginRecord> {
        self.records.get(name).map(|r| r.value().clone())
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl PluginStore for MemoryPluginStore {
    async fn list_installed(&self) -> AppResult<Vec<PluginRecord>> {
        let mut records: Vec<PluginRecord> =
            self.records.iter().map(|r| r.value().clone()).collect();
        records.sort_by(|a, b| {
            a.installed_at
                .cmp(&b.installed_at)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(records)
    }

    async fn upsert(&self, record: &PluginRecord) -> AppResult<()> {
        self.records.insert(record.name.clone(), record.clone());
        Ok(())
    }

    async fn delete(&self, name: &str) -> AppResult<()> {
        self.records.remove(name);
        Ok(())
    }
}

/// In-memory plugin configuration store.
#[derive(Debug, Clone, Default)]
pub struct MemoryConfigStore {
    configs: Arc<DashMap<String, Map<String, Value>>>,
}

impl MemoryConfigStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a configuration exists for `plugin_id`.
    pub fn contains(&self, plugin_id: &str) -> bool {
        self.configs.contains_key(plugin_id)
    }
}

#[async_trait]
impl PluginConfigStore for MemoryConfigStore {
    async fn get(&self, plugin_id: &str) -> AppResult<Option<Map<String, Value>>> {
        Ok(self.configs.get(plugin_id).map(|c| c.value().clone()))
    }

    async fn upsert(&self, plugin_id: &str, config: &Map<String, Value>) -> AppResult<()> {
        self.configs.insert(plugin_id.to_string(), config.clone());
        Ok(())
    }

    async fn delete(&self, plugin_id: &str) -> AppResult<()> {
        self.configs.remove(plugin_id);
        Ok(())
    }
}

/// In-memory plugin error log, retained in arrival order.
#[derive(Debug, Clone, Default)]
pub struct MemoryErrorLog {
    records: Arc<RwLock<Vec<PluginErrorRecord>>>,
}

impl MemoryErrorLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded failures.
    pub async fn records(&self) -> Vec<PluginErrorRecord> {
        self.records.read().await.clone()
    }

    /// Snapshot of failures recorded for one plugin.
    pub async fn records_for(&self, plugin_id: &str) -> Vec<PluginErrorRecord> {
        self.records
            .read()
            .await
            .iter()
            .filter(|r| r.plugin_id == plugin_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ErrorLogSink for MemoryErrorLog {
    async fn record(&self, record: PluginErrorRecord) -> AppResult<()> {
        self.records.write().await.push(record);
        Ok(())
    }
}

/// In-memory audit trail, retained in arrival order.
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditLog {
    entries: Arc<RwLock<Vec<AuditLogEntry>>>,
}

impl MemoryAuditLog {
    /// Create an empty audit log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all entries.
    pub async fn entries(&self) -> Vec<AuditLogEntry> {
        self.entries.read().await.clone()
    }

    /// Number of entries with `action` recorded for `plugin_id`.
    pub async fn count(&self, action: PluginAction, plugin_id: &str) -> usize {
        self.entries
            .read()
            .await
            .iter()
            .filter(|e| e.action == action.as_str() && e.target_id == plugin_id)
            .count()
    }
}

#[async_trait]
impl AuditLogger for MemoryAuditLog {
    async fn log_plugin_action(
        &self,
        action: PluginAction,
        plugin_id: &str,
        metadata: Option<Value>,
    ) -> AppResult<()> {
        self.entries
            .write()
            .await
            .push(AuditLogEntry::plugin(action, plugin_id, metadata));
        Ok(())
    }
}
