//! Traits plugins implement: the plugin itself, hook handlers, route
//! handlers, and UI component factories.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;

use billhub_core::result::AppResult;

use crate::api::context::PluginContext;
use crate::hooks::definitions::HookPayload;
use crate::metadata::PluginMetadata;
use crate::schema::ConfigSchema;

/// Trait that all plugins must implement.
///
/// Hooks, routes, and components are read once at registration; the
/// registry keeps its own snapshot of the returned maps.
#[async_trait]
pub trait Plugin: Send + Sync + std::fmt::Debug {
    /// Returns plugin metadata.
    fn metadata(&self) -> PluginMetadata;

    /// Schema the plugin's configuration must satisfy.
    fn config_schema(&self) -> Option<ConfigSchema> {
        None
    }

    /// Hook name → handler.
    fn hooks(&self) -> HashMap<String, Arc<dyn HookHandler>> {
        HashMap::new()
    }

    /// Route path → handler.
    fn routes(&self) -> HashMap<String, Arc<dyn RouteHandler>> {
        HashMap::new()
    }

    /// UI slot id → component factory.
    fn components(&self) -> HashMap<String, Arc<dyn ComponentFactory>> {
        HashMap::new()
    }

    /// Called once after the plugin record is first persisted.
    async fn on_install(&self, _ctx: &PluginContext) -> AppResult<()> {
        Ok(())
    }

    /// Called when the plugin is being enabled.
    async fn on_enable(&self, _ctx: &PluginContext) -> AppResult<()> {
        Ok(())
    }

    /// Called when the plugin is being disabled.
    async fn on_disable(&self, _ctx: &PluginContext) -> AppResult<()> {
        Ok(())
    }

    /// Called before the plugin is removed.
    async fn on_uninstall(&self, _ctx: &PluginContext) -> AppResult<()> {
        Ok(())
    }
}

/// Handles one named hook for one plugin.
#[async_trait]
pub trait HookHandler: Send + Sync {
    /// Handles the hook invocation.
    async fn handle(&self, ctx: &PluginContext, payload: &HookPayload) -> AppResult<()>;
}

/// Handles requests for one plugin route.
#[async_trait]
pub trait RouteHandler: Send + Sync {
    /// Handles the request and returns the response body.
    async fn handle(&self, ctx: &PluginContext, request: Value) -> AppResult<Value>;
}

/// Produces a UI component for a named slot.
pub trait ComponentFactory: Send + Sync {
    /// Component name, for diagnostics and rendering.
    fn component_name(&self) -> &str;

    /// Render the component description for the given props.
    fn render(&self, props: &Value) -> Value;
}

type HookFn = Arc<dyn Fn(PluginContext, HookPayload) -> BoxFuture<'static, AppResult<()>> + Send + Sync>;

/// A closure-based hook handler for quick handler creation.
#[derive(Clone)]
pub struct ClosureHandler {
    handler: HookFn,
}

impl std::fmt::Debug for ClosureHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClosureHandler")
            .field("handler", &"<closure>")
            .finish()
    }
}

impl ClosureHandler {
    /// Creates a new closure-based handler.
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(PluginContext, HookPayload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AppResult<()>> + Send + 'static,
    {
        Self {
            handler: Arc::new(move |ctx, payload| Box::pin(handler(ctx, payload))),
        }
    }

    /// Wraps a closure into an `Arc<dyn HookHandler>`.
    pub fn wrap<F, Fut>(handler: F) -> Arc<dyn HookHandler>
    where
        F: Fn(PluginContext, HookPayload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AppResult<()>> + Send + 'static,
    {
        Arc::new(Self::new(handler))
    }
}

#[async_trait]
impl HookHandler for ClosureHandler {
    async fn handle(&self, ctx: &PluginContext, payload: &HookPayload) -> AppResult<()> {
        (self.handler)(ctx.clone(), payload.clone()).await
    }
}

type RouteFn = Arc<dyn Fn(PluginContext, Value) -> BoxFuture<'static, AppResult<Value>> + Send + Sync>;

/// A closure-based route handler.
#[derive(Clone)]
pub struct ClosureRoute {
    handler: RouteFn,
}

impl std::fmt::Debug for ClosureRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClosureRoute")
            .field("handler", &"<closure>")
            .finish()
    }
}

impl ClosureRoute {
    /// Wraps a closure into an `Arc<dyn RouteHandler>`.
    pub fn wrap<F, Fut>(handler: F) -> Arc<dyn RouteHandler>
    where
        F: Fn(PluginContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AppResult<Value>> + Send + 'static,
    {
        Arc::new(Self {
            handler: Arc::new(move |ctx, request| Box::pin(handler(ctx, request))),
        })
    }
}

#[async_trait]
impl RouteHandler for ClosureRoute {
    async fn handle(&self, ctx: &PluginContext, request: Value) -> AppResult<Value> {
        (self.handler)(ctx.clone(), request).await
    }
}

/// A component that renders a fixed template merged with its props.
#[derive(Debug, Clone)]
pub struct StaticComponent {
    name: String,
    template: Value,
}

impl StaticComponent {
    /// Creates a component rendering `template`.
    pub fn new(name: impl Into<String>, template: Value) -> Self {
        Self {
            name: name.into(),
            template,
        }
    }
}

impl ComponentFactory for StaticComponent {
    fn component_name(&self) -> &str {
        &self.name
    }

    fn render(&self, props: &Value) -> Value {
        serde_json::json!({
            "component": self.name,
            "template": self.template,
            "props": props,
        })
    }
}
