//! PostgreSQL repository implementations of the plugin store traits.

pub mod audit;
pub mod plugin;
pub mod plugin_config;
pub mod plugin_error;

pub use audit::AuditLogRepository;
pub use plugin::PluginRepository;
pub use plugin_config::PluginConfigRepository;
pub use plugin_error::PluginErrorRepository;
