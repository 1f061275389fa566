//! Application configuration schemas.
//!
//! All configuration structs are deserialized from TOML files via the
//! `config` crate. Each sub-module represents a logical configuration
//! section.

pub mod database;
pub mod logging;
pub mod plugin;

use serde::{Deserialize, Serialize};
use validator::Validate;

pub use self::database::DatabaseConfig;
pub use self::logging::{LogFormat, LoggingConfig};
pub use self::plugin::{PluginStoreKind, PluginSystemConfig};

use crate::error::AppError;

/// Root application configuration.
///
/// This struct is the top-level deserialization target for the merged
/// TOML configuration files (default.toml + environment overlay).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Database connection settings (required for the postgres store).
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
    /// Plugin system settings.
    #[serde(default)]
    pub plugins: PluginSystemConfig,
}

impl AppConfig {
    /// Load configuration from TOML files under `dir`.
    ///
    /// Merges the default configuration with an environment-specific overlay
    /// and environment variables prefixed with `BILLHUB__`.
    pub fn load(dir: &str, env: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(&format!("{dir}/default")).required(false))
            .add_source(config::File::with_name(&format!("{dir}/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("BILLHUB")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("plugins.auto_enable"),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Check cross-section constraints.
    pub fn validate(&self) -> Result<(), AppError> {
        self.plugins.validate()?;

        match (&self.database, self.plugins.store) {
            (Some(database), _) => database.validate()?,
            (None, PluginStoreKind::Postgres) => {
                return Err(AppError::configuration(
                    "plugins.store = \"postgres\" requires a [database] section",
                ));
            }
            (None, PluginStoreKind::Memory) => {}
        }

        Ok(())
    }
}
