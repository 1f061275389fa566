//! Plugin configuration repository implementation.

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::PgPool;

use billhub_core::error::{AppError, ErrorKind};
use billhub_core::result::AppResult;
use billhub_entity::plugin::PluginConfigRecord;

use crate::store::PluginConfigStore;

/// Repository for per-plugin configuration objects.
#[derive(Debug, Clone)]
pub struct PluginConfigRepository {
    pool: PgPool,
}

impl PluginConfigRepository {
    /// Create a new plugin configuration repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Fetch the full configuration row, including its timestamp.
    pub async fn find_record(&self, plugin_id: &str) -> AppResult<Option<PluginConfigRecord>> {
        sqlx::query_as::<_, PluginConfigRecord>(
            "SELECT * FROM plugin_configs WHERE plugin_id = $1",
        )
        .bind(plugin_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Persistence, "Failed to find plugin config", e)
        })
    }
}

#[async_trait]
impl PluginConfigStore for PluginConfigRepository {
    async fn get(&self, plugin_id: &str) -> AppResult<Option<Map<String, Value>>> {
        let record = self.find_record(plugin_id).await?;
        Ok(record.map(|r| match r.config {
            Value::Object(map) => map,
            _ => Map::new(),
        }))
    }

    async fn upsert(&self, plugin_id: &str, config: &Map<String, Value>) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO plugin_configs (plugin_id, config, updated_at) VALUES ($1, $2, NOW()) \
             ON CONFLICT (plugin_id) DO UPDATE SET config = EXCLUDED.config, updated_at = NOW()",
        )
        .bind(plugin_id)
        .bind(Value::Object(config.clone()))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(
                ErrorKind::Persistence,
                format!("Failed to persist config for plugin '{plugin_id}'"),
                e,
            )
        })?;
        Ok(())
    }

    async fn delete(&self, plugin_id: &str) -> AppResult<()> {
        sqlx::query("DELETE FROM plugin_configs WHERE plugin_id = $1")
            .bind(plugin_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(
                    ErrorKind::Persistence,
                    format!("Failed to delete config for plugin '{plugin_id}'"),
                    e,
                )
            })?;
        Ok(())
    }
}
