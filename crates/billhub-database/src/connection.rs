//! PostgreSQL pool backing the plugin repositories.

use std::time::Duration;

use sqlx::Executor;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{info, warn};

use billhub_core::config::DatabaseConfig;
use billhub_core::error::{AppError, ErrorKind};

use crate::migration;

/// Shared handle to the plugin database.
#[derive(Debug, Clone)]
pub struct DatabasePool {
    pool: PgPool,
}

impl DatabasePool {
    /// Open the pool and, when `migrate_on_start` is set, bring the plugin
    /// tables up to date.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, AppError> {
        info!(
            url = %redact(&config.url),
            max_connections = config.max_connections,
            "Opening plugin database"
        );

        let statement_timeout = config.statement_timeout_seconds;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
            .after_connect(move |conn, _meta| {
                Box::pin(async move {
                    if statement_timeout > 0 {
                        let set = format!("SET statement_timeout = '{statement_timeout}s'");
                        conn.execute(set.as_str()).await?;
                    }
                    Ok(())
                })
            })
            .connect(&config.url)
            .await
            .map_err(|e| {
                AppError::with_source(
                    ErrorKind::Persistence,
                    format!("Cannot open plugin database at {}", redact(&config.url)),
                    e,
                )
            })?;

        let db = Self { pool };
        if config.migrate_on_start {
            migration::run_migrations(&db.pool).await?;
        } else {
            warn!("Skipping plugin table migrations (migrate_on_start = false)");
        }
        Ok(db)
    }

    /// The underlying sqlx pool, shared by the repositories.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Wait for in-flight store calls and close every connection.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Plugin database closed");
    }
}

/// Replace the password in `user:password@host` URLs with `****`.
fn redact(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    match rest.split_once('@') {
        Some((credentials, host)) => match credentials.split_once(':') {
            Some((user, _)) => format!("{scheme}://{user}:****@{host}"),
            None => url.to_string(),
        },
        None => url.to_string(),
    }
}
