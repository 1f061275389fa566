//! Plugin record, configuration, and error-log entities.

pub mod model;
pub mod status;

pub use model::{PluginConfigRecord, PluginErrorRecord, PluginRecord};
pub use status::PluginStatus;
