//! Prelude for convenient imports.

pub use async_trait::async_trait;

pub use billhub_core::error::{AppError, ErrorKind};
pub use billhub_core::result::AppResult;
pub use billhub_entity::audit::PluginAction;
pub use billhub_entity::plugin::PluginStatus;

pub use crate::api::context::{PluginContext, PluginLogger};
pub use crate::hooks::definitions::{HookPayload, names};
pub use crate::metadata::{PluginInfo, PluginMetadata};
pub use crate::schema::{ConfigFieldSchema, ConfigFieldType, ConfigSchema, ValidationRules};
pub use crate::traits::{
    ClosureHandler, ClosureRoute, ComponentFactory, HookHandler, Plugin, RouteHandler,
    StaticComponent,
};

pub use crate::{hook_payload, plugin_metadata};
