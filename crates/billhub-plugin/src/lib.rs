//! # billhub-plugin
//!
//! Plugin system for BillHub. Provides:
//!
//! - Plugin lifecycle management (install, enable, disable, uninstall)
//!   with every transition persisted before it becomes visible
//! - Dependency checks against installed plugin versions
//! - A FIFO hook dispatcher with per-handler isolation and timeouts
//! - Per-plugin configuration validated against the plugin's schema
//! - A plugin context exposing logging, events, audit, and configuration
//! - UI slot aggregation and plugin routes
//! - Compiled-in and (feature `dynamic`) shared-library loaders

#[macro_use]
mod macros;

pub mod api;
pub mod config_store;
pub mod dependency;
pub mod hooks;
pub mod loader;
pub mod manager;
pub mod metadata;
pub mod prelude;
pub mod registry;
pub mod schema;
pub mod slots;
pub mod traits;
pub mod validator;

mod locks;
mod table;

pub use api::{BroadcastEmitter, PluginContext, PluginLogger, PluginServices};
pub use config_store::ConfigStoreAdapter;
pub use hooks::{DispatchReport, HandlerFailure, HookDispatcher, HookPayload, HookTicket, names};
pub use loader::{PluginDescriptor, PluginLoader, StaticPluginLoader};
pub use manager::{PluginListing, PluginManager};
pub use metadata::{PluginInfo, PluginMetadata};
pub use registry::{PluginRegistry, RegistrySettings, RestoreReport};
pub use schema::ConfigSchema;
pub use slots::{SlotComponent, SlotRegistry};
pub use traits::{ComponentFactory, HookHandler, Plugin, RouteHandler};
