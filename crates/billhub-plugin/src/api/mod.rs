//! Plugin API: context and services exposed to plugin code.

pub mod context;
pub mod events;
pub mod services;

pub use context::{PluginContext, PluginLogger};
pub use events::BroadcastEmitter;
pub use services::PluginServices;
