//! Embedded migrations for the plugin tables.

use sqlx::PgPool;
use sqlx::migrate::Migrator;
use tracing::info;

use billhub_core::error::{AppError, ErrorKind};

/// `plugins`, `plugin_configs`, `plugin_errors`, and `audit_log`.
pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

/// Apply any migrations not yet recorded in `_sqlx_migrations`.
pub async fn run_migrations(pool: &PgPool) -> Result<(), AppError> {
    let latest = MIGRATOR.iter().map(|m| m.version).max().unwrap_or_default();
    info!(latest, "Applying plugin table migrations");

    MIGRATOR.run(pool).await.map_err(|e| {
        AppError::with_source(
            ErrorKind::Persistence,
            format!("Plugin table migration failed: {e}"),
            e,
        )
    })?;

    Ok(())
}
