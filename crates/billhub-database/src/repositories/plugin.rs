//! Plugin record repository implementation.

use async_trait::async_trait;
use sqlx::PgPool;

use billhub_core::error::{AppError, ErrorKind};
use billhub_core::result::AppResult;
use billhub_entity::plugin::PluginRecord;

use crate::store::PluginStore;

/// Repository for installed plugin records.
#[derive(Debug, Clone)]
pub struct PluginRepository {
    pool: PgPool,
}

impl PluginRepository {
    /// Create a new plugin repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PluginStore for PluginRepository {
    async fn list_installed(&self) -> AppResult<Vec<PluginRecord>> {
        sqlx::query_as::<_, PluginRecord>("SELECT * FROM plugins ORDER BY installed_at, name")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Persistence, "Failed to list plugin records", e)
            })
    }

    async fn upsert(&self, record: &PluginRecord) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO plugins (name, version, metadata, status, enabled, installed_at, enabled_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (name) DO UPDATE SET \
                version = EXCLUDED.version, \
                metadata = EXCLUDED.metadata, \
                status = EXCLUDED.status, \
                enabled = EXCLUDED.enabled, \
                installed_at = EXCLUDED.installed_at, \
                enabled_at = EXCLUDED.enabled_at",
        )
        .bind(&record.name)
        .bind(&record.version)
        .bind(&record.metadata)
        .bind(record.status)
        .bind(record.enabled)
        .bind(record.installed_at)
        .bind(record.enabled_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(
                ErrorKind::Persistence,
                format!("Failed to persist plugin record '{}'", record.name),
                e,
            )
        })?;
        Ok(())
    }

    async fn delete(&self, name: &str) -> AppResult<()> {
        sqlx::query("DELETE FROM plugins WHERE name = $1")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(
                    ErrorKind::Persistence,
                    format!("Failed to delete plugin record '{name}'"),
                    e,
                )
            })?;
        Ok(())
    }
}
