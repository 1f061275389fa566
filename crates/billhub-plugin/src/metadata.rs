//! Plugin metadata and the derived per-plugin info record.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use billhub_core::error::AppError;
use billhub_entity::plugin::{PluginRecord, PluginStatus};

/// Immutable metadata a plugin declares at registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginMetadata {
    /// Unique plugin name (registry key).
    pub name: String,
    /// Plugin version (semver).
    pub version: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Author or maintainer.
    #[serde(default)]
    pub author: String,
    /// Required plugins: name → semver version range.
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    /// Search keywords.
    #[serde(default)]
    pub keywords: BTreeSet<String>,
}

impl PluginMetadata {
    /// Creates metadata with just a name and version.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: String::new(),
            author: String::new(),
            dependencies: BTreeMap::new(),
            keywords: BTreeSet::new(),
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the author.
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    /// Declares a dependency on another plugin.
    pub fn with_dependency(mut self, name: impl Into<String>, range: impl Into<String>) -> Self {
        self.dependencies.insert(name.into(), range.into());
        self
    }

    /// Adds a search keyword.
    pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keywords.insert(keyword.into());
        self
    }

    /// Whether `query` (already lowercased) occurs in the name,
    /// description, or any keyword.
    pub(crate) fn matches_query(&self, query: &str) -> bool {
        self.name.to_lowercase().contains(query)
            || self.description.to_lowercase().contains(query)
            || self
                .keywords
                .iter()
                .any(|k| k.to_lowercase().contains(query))
    }
}

/// Mutable lifecycle info the registry tracks for each plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginInfo {
    /// Plugin name.
    pub name: String,
    /// Installed version.
    pub version: String,
    /// Current lifecycle status.
    pub status: PluginStatus,
    /// When the plugin was installed.
    pub installed_at: DateTime<Utc>,
    /// When the plugin was last enabled.
    pub enabled_at: Option<DateTime<Utc>>,
    /// Last lifecycle failure message.
    pub error: Option<String>,
}

impl PluginInfo {
    /// Info for a freshly installed plugin.
    pub(crate) fn installed(metadata: &PluginMetadata, now: DateTime<Utc>) -> Self {
        Self {
            name: metadata.name.clone(),
            version: metadata.version.clone(),
            status: PluginStatus::Installed,
            installed_at: now,
            enabled_at: None,
            error: None,
        }
    }

    /// Info restored from a persisted record.
    pub(crate) fn from_record(record: &PluginRecord) -> Self {
        Self {
            name: record.name.clone(),
            version: record.version.clone(),
            status: record.status,
            installed_at: record.installed_at,
            enabled_at: record.enabled_at,
            error: None,
        }
    }

    /// Copy of this info moved to `status`; `enabled_at` follows the status.
    pub(crate) fn transition(&self, status: PluginStatus, now: DateTime<Utc>) -> Self {
        Self {
            status,
            enabled_at: (status == PluginStatus::Enabled).then_some(now),
            ..self.clone()
        }
    }

    /// Whether the plugin is currently enabled.
    pub fn is_enabled(&self) -> bool {
        self.status == PluginStatus::Enabled
    }

    /// Build the persisted record for this info.
    pub(crate) fn to_record(&self, metadata: &PluginMetadata) -> Result<PluginRecord, AppError> {
        Ok(PluginRecord {
            name: self.name.clone(),
            version: self.version.clone(),
            metadata: serde_json::to_value(metadata)?,
            status: self.status,
            enabled: self.is_enabled(),
            installed_at: self.installed_at,
            enabled_at: self.enabled_at,
        })
    }
}
