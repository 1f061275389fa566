//! Audit log repository implementation.

use async_trait::async_trait;
use sqlx::PgPool;

use billhub_core::error::{AppError, ErrorKind};
use billhub_core::result::AppResult;
use billhub_entity::audit::{AuditLogEntry, PluginAction};

use crate::store::AuditLogger;

/// Repository for audit log entries.
#[derive(Debug, Clone)]
pub struct AuditLogRepository {
    pool: PgPool,
}

impl AuditLogRepository {
    /// Create a new audit log repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert an audit log entry.
    pub async fn create(&self, entry: &AuditLogEntry) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO audit_log (id, action, target_type, target_id, details, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(entry.id)
        .bind(&entry.action)
        .bind(&entry.target_type)
        .bind(&entry.target_id)
        .bind(&entry.details)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Persistence, "Failed to create audit entry", e)
        })?;
        Ok(())
    }
}

#[async_trait]
impl AuditLogger for AuditLogRepository {
    async fn log_plugin_action(
        &self,
        action: PluginAction,
        plugin_id: &str,
        metadata: Option<serde_json::Value>,
    ) -> AppResult<()> {
        self.create(&AuditLogEntry::plugin(action, plugin_id, metadata))
            .await
    }
}
