//! In-memory store implementations backed by `dashmap`.
//!
//! Used by tests and by single-node deployments configured with
//! `plugins.store = "memory"`.

pub mod store;

pub use store::{MemoryAuditLog, MemoryConfigStore, MemoryErrorLog, MemoryPluginStore};
