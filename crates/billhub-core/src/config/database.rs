//! PostgreSQL settings for the `postgres` plugin store.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Connection settings for the plugin tables.
#[derive(Debug, Clone, Validate, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL.
    #[validate(length(min = 1))]
    pub url: String,
    /// Upper bound on pooled connections.
    #[serde(default = "default_max_connections")]
    #[validate(range(min = 1, max = 200))]
    pub max_connections: u32,
    /// Seconds to wait for a free connection before a store call fails.
    #[serde(default = "default_acquire_timeout")]
    #[validate(range(min = 1, max = 300))]
    pub acquire_timeout_seconds: u64,
    /// Server-side `statement_timeout` applied to every connection, in seconds.
    /// `0` leaves the server default in place.
    #[serde(default = "default_statement_timeout")]
    pub statement_timeout_seconds: u64,
    /// Apply pending migrations when the host starts.
    #[serde(default = "default_migrate_on_start")]
    pub migrate_on_start: bool,
}

fn default_max_connections() -> u32 {
    5
}

fn default_acquire_timeout() -> u64 {
    10
}

fn default_statement_timeout() -> u64 {
    15
}

fn default_migrate_on_start() -> bool {
    true
}
