//! Plugin error log repository implementation.

use async_trait::async_trait;
use sqlx::PgPool;

use billhub_core::error::{AppError, ErrorKind};
use billhub_core::result::AppResult;
use billhub_entity::plugin::PluginErrorRecord;

use crate::store::ErrorLogSink;

/// Repository for recorded plugin failures.
#[derive(Debug, Clone)]
pub struct PluginErrorRepository {
    pool: PgPool,
}

impl PluginErrorRepository {
    /// Create a new plugin error repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ErrorLogSink for PluginErrorRepository {
    async fn record(&self, record: PluginErrorRecord) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO plugin_errors (id, plugin_id, operation, message, stack, occurred_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(record.id)
        .bind(&record.plugin_id)
        .bind(&record.operation)
        .bind(&record.message)
        .bind(&record.stack)
        .bind(record.occurred_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Persistence, "Failed to record plugin error", e)
        })?;
        Ok(())
    }
}
