//! # billhub-database
//!
//! Persistence collaborators for the BillHub plugin system: the store
//! traits the plugin registry depends on, PostgreSQL repositories that
//! implement them, and in-memory implementations for tests and
//! single-node deployments.

pub mod connection;
#[cfg(feature = "memory")]
pub mod memory;
pub mod migration;
pub mod repositories;
pub mod store;

pub use connection::DatabasePool;
pub use store::{AuditLogger, ErrorLogSink, PluginConfigStore, PluginStore};
