//! Audit log entry entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Plugin administration actions that produce audit entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginAction {
    /// Plugin registered.
    Install,
    /// Plugin removed.
    Uninstall,
    /// Plugin enabled.
    Enable,
    /// Plugin disabled.
    Disable,
    /// Plugin configuration changed.
    Configure,
}

impl PluginAction {
    /// Return the audit action string (e.g. `"plugin.install"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Install => "plugin.install",
            Self::Uninstall => "plugin.uninstall",
            Self::Enable => "plugin.enable",
            Self::Disable => "plugin.disable",
            Self::Configure => "plugin.configure",
        }
    }
}

impl std::fmt::Display for PluginAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An immutable audit log entry recording a plugin administration action.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuditLogEntry {
    /// Unique audit entry identifier.
    pub id: Uuid,
    /// The action that was performed (e.g., `"plugin.enable"`).
    pub action: String,
    /// The type of target resource (always `"plugin"` for this subsystem).
    pub target_type: String,
    /// The plugin name the action targeted.
    pub target_id: String,
    /// Additional details about the action (JSON).
    pub details: Option<serde_json::Value>,
    /// When the action occurred.
    pub created_at: DateTime<Utc>,
}

impl AuditLogEntry {
    /// Create a plugin audit entry stamped with the current time.
    pub fn plugin(
        action: PluginAction,
        plugin_id: impl Into<String>,
        details: Option<serde_json::Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            action: action.as_str().to_string(),
            target_type: "plugin".to_string(),
            target_id: plugin_id.into(),
            details,
            created_at: Utc::now(),
        }
    }
}
