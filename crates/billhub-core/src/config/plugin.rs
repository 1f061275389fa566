//! Plugin system configuration.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Which backend persists plugin records, configuration, and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PluginStoreKind {
    /// Process-local in-memory stores (lost on restart).
    #[default]
    Memory,
    /// PostgreSQL tables managed by the migrations in `migrations/`.
    Postgres,
}

/// Plugin system configuration.
#[derive(Debug, Clone, Validate, Serialize, Deserialize)]
pub struct PluginSystemConfig {
    /// Backend used for plugin persistence.
    #[serde(default)]
    pub store: PluginStoreKind,
    /// Directory containing plugin shared libraries (`dynamic` feature).
    #[serde(default = "default_plugin_directory")]
    pub directory: String,
    /// Execution window for a single hook handler invocation.
    #[serde(default = "default_hook_timeout")]
    #[validate(range(min = 1, max = 600))]
    pub hook_timeout_seconds: u64,
    /// Execution window for a single lifecycle callback.
    #[serde(default = "default_lifecycle_timeout")]
    #[validate(range(min = 1, max = 3600))]
    pub lifecycle_timeout_seconds: u64,
    /// Capacity of the outward event broadcast channel.
    #[serde(default = "default_event_buffer")]
    #[validate(range(min = 16, max = 65536))]
    pub event_buffer_size: usize,
    /// Plugins enabled automatically after startup (in dependency order).
    #[serde(default)]
    pub auto_enable: Vec<String>,
}

impl Default for PluginSystemConfig {
    fn default() -> Self {
        Self {
            store: PluginStoreKind::default(),
            directory: default_plugin_directory(),
            hook_timeout_seconds: default_hook_timeout(),
            lifecycle_timeout_seconds: default_lifecycle_timeout(),
            event_buffer_size: default_event_buffer(),
            auto_enable: Vec::new(),
        }
    }
}

fn default_plugin_directory() -> String {
    "./plugins".to_string()
}

fn default_hook_timeout() -> u64 {
    30
}

fn default_lifecycle_timeout() -> u64 {
    60
}

fn default_event_buffer() -> usize {
    256
}
