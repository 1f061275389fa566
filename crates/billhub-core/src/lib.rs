//! # billhub-core
//!
//! Core crate for BillHub. Contains configuration schemas, the outward
//! plugin event type and emitter trait, and the unified error system.
//!
//! This crate has **no** internal dependencies on other BillHub crates.

pub mod config;
pub mod error;
pub mod events;
pub mod result;

pub use error::{AppError, ErrorKind};
pub use events::{EventEmitter, PluginEvent};
pub use result::AppResult;
