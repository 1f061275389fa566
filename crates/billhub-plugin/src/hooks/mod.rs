//! Hook names, payloads, and the FIFO dispatcher.

pub mod definitions;
pub mod dispatcher;

pub use definitions::{DispatchReport, HandlerFailure, HookPayload, names};
pub use dispatcher::{HookDispatcher, HookTicket};
