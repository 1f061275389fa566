//! Plugin persistence models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::status::PluginStatus;

/// The persisted record of an installed plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct PluginRecord {
    /// Unique plugin name (primary key).
    pub name: String,
    /// Installed version (semver string).
    pub version: String,
    /// Full plugin metadata as declared at registration (JSON).
    pub metadata: serde_json::Value,
    /// Current lifecycle status.
    pub status: PluginStatus,
    /// Whether the plugin is currently enabled.
    pub enabled: bool,
    /// When the plugin was installed.
    pub installed_at: DateTime<Utc>,
    /// When the plugin was last enabled (cleared on disable).
    pub enabled_at: Option<DateTime<Utc>>,
}

impl PluginRecord {
    /// Return a copy of this record moved to a new status.
    ///
    /// `enabled` and `enabled_at` follow the status: entering `Enabled`
    /// stamps `enabled_at` with `now`, any other status clears it.
    pub fn with_status(&self, status: PluginStatus, now: DateTime<Utc>) -> Self {
        let enabled = status == PluginStatus::Enabled;
        Self {
            status,
            enabled,
            enabled_at: if enabled { Some(now) } else { None },
            ..self.clone()
        }
    }
}

/// The persisted configuration of a plugin.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PluginConfigRecord {
    /// Plugin name the configuration belongs to.
    pub plugin_id: String,
    /// Configuration object (JSON).
    pub config: serde_json::Value,
    /// When the configuration was last written.
    pub updated_at: DateTime<Utc>,
}

/// A recorded plugin failure (lifecycle callback or hook handler).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PluginErrorRecord {
    /// Unique record identifier.
    pub id: Uuid,
    /// The plugin that failed.
    pub plugin_id: String,
    /// What was running (e.g. `"enable"`, `"hook:invoice.created"`).
    pub operation: String,
    /// Error message.
    pub message: String,
    /// Optional detailed cause chain.
    pub stack: Option<String>,
    /// When the failure occurred.
    pub occurred_at: DateTime<Utc>,
}

impl PluginErrorRecord {
    /// Create a new error record stamped with the current time.
    pub fn new(
        plugin_id: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            plugin_id: plugin_id.into(),
            operation: operation.into(),
            message: message.into(),
            stack: None,
            occurred_at: Utc::now(),
        }
    }

    /// Attach a detailed cause chain.
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }
}
