//! Shared fixtures for plugin system integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use billhub_core::error::AppError;
use billhub_core::result::AppResult;
use billhub_database::memory::{MemoryAuditLog, MemoryConfigStore, MemoryErrorLog, MemoryPluginStore};
use billhub_database::store::PluginStore;
use billhub_entity::plugin::PluginRecord;
use billhub_plugin::prelude::*;
use billhub_plugin::{BroadcastEmitter, PluginManager, PluginRegistry, PluginServices, RegistrySettings};

/// A registry wired to in-memory stores the test can inspect.
pub struct TestHarness {
    pub registry: Arc<PluginRegistry>,
    pub manager: PluginManager,
    pub plugins: MemoryPluginStore,
    pub configs: MemoryConfigStore,
    pub errors: MemoryErrorLog,
    pub audit: MemoryAuditLog,
    pub events: BroadcastEmitter,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_settings(RegistrySettings::default())
    }

    pub fn with_settings(settings: RegistrySettings) -> Self {
        Self::build(MemoryPluginStore::new(), MemoryConfigStore::new(), None, settings)
    }

    /// Harness whose plugin store fails writes while `switch` is set.
    pub fn with_failing_store(switch: Arc<AtomicBool>) -> Self {
        Self::build(
            MemoryPluginStore::new(),
            MemoryConfigStore::new(),
            Some(switch),
            RegistrySettings::default(),
        )
    }

    /// Fresh registry over existing stores, as after a process restart.
    pub fn restarted(&self) -> Self {
        Self::build(
            self.plugins.clone(),
            self.configs.clone(),
            None,
            RegistrySettings::default(),
        )
    }

    fn build(
        plugins: MemoryPluginStore,
        configs: MemoryConfigStore,
        fail_writes: Option<Arc<AtomicBool>>,
        settings: RegistrySettings,
    ) -> Self {
        let errors = MemoryErrorLog::new();
        let audit = MemoryAuditLog::new();
        let events = BroadcastEmitter::new(64);

        let store: Arc<dyn PluginStore> = match fail_writes {
            Some(switch) => Arc::new(FlakyPluginStore {
                inner: plugins.clone(),
                fail_writes: switch,
            }),
            None => Arc::new(plugins.clone()),
        };
        let services = PluginServices::new(
            store,
            Arc::new(configs.clone()),
            Arc::new(errors.clone()),
            Arc::new(audit.clone()),
            Arc::new(events.clone()),
        );
        let registry = Arc::new(PluginRegistry::new(services, settings));
        Self {
            manager: PluginManager::new(registry.clone()),
            registry,
            plugins,
            configs,
            errors,
            audit,
            events,
        }
    }

    /// Wait for every queued hook event to be dispatched.
    pub async fn flush(&self) {
        self.registry.dispatcher().flush().await;
    }

    pub async fn status(&self, name: &str) -> Option<PluginStatus> {
        self.registry.get_plugin_info(name).await.map(|i| i.status)
    }
}

/// Plugin store that can be told to reject writes.
#[derive(Debug)]
pub struct FlakyPluginStore {
    inner: MemoryPluginStore,
    fail_writes: Arc<AtomicBool>,
}

#[async_trait]
impl PluginStore for FlakyPluginStore {
    async fn list_installed(&self) -> AppResult<Vec<PluginRecord>> {
        self.inner.list_installed().await
    }

    async fn upsert(&self, record: &PluginRecord) -> AppResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::persistence("plugin store unavailable"));
        }
        self.inner.upsert(record).await
    }

    async fn delete(&self, name: &str) -> AppResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::persistence("plugin store unavailable"));
        }
        self.inner.delete(name).await
    }
}

/// Ordered record of callback and handler invocations across plugins.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    entries: Arc<Mutex<Vec<String>>>,
    payloads: Arc<Mutex<Vec<(String, Value)>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.entries.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.entries.lock().unwrap().iter().filter(|e| *e == entry).count()
    }

    fn record_payload(&self, key: String, data: Value) {
        self.payloads.lock().unwrap().push((key, data));
    }

    /// Payloads received by `plugin` for `hook`.
    pub fn payloads(&self, plugin: &str, hook: &str) -> Vec<Value> {
        let key = format!("{plugin}:{hook}");
        self.payloads
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| *k == key)
            .map(|(_, v)| v.clone())
            .collect()
    }
}

/// What a test hook handler does when invoked.
#[derive(Debug, Clone)]
pub enum HookBehavior {
    /// Log `plugin:hook` and the payload.
    Record,
    /// Log `plugin:hook:start`, sleep, then log `plugin:hook:end`.
    Sleep(Duration),
    /// Return an error.
    Fail,
    /// Never complete.
    Hang,
    /// Panic.
    Panic,
}

struct TestHookHandler {
    plugin: String,
    hook: String,
    behavior: HookBehavior,
    log: CallLog,
}

#[async_trait]
impl HookHandler for TestHookHandler {
    async fn handle(&self, _ctx: &PluginContext, payload: &HookPayload) -> AppResult<()> {
        let key = format!("{}:{}", self.plugin, self.hook);
        match &self.behavior {
            HookBehavior::Record => {
                self.log.push(key.clone());
                self.log.record_payload(key, payload.data.clone());
                Ok(())
            }
            HookBehavior::Sleep(d) => {
                self.log.push(format!("{key}:start"));
                tokio::time::sleep(*d).await;
                self.log.push(format!("{key}:end"));
                Ok(())
            }
            HookBehavior::Fail => {
                self.log.push(key);
                Err(AppError::plugin_runtime("handler exploded"))
            }
            HookBehavior::Hang => {
                self.log.push(key);
                std::future::pending::<()>().await;
                Ok(())
            }
            HookBehavior::Panic => {
                self.log.push(key);
                panic!("handler panicked on purpose");
            }
        }
    }
}

/// Scriptable plugin that logs every callback as `name:callback`.
#[derive(Debug)]
pub struct TestPlugin {
    meta: PluginMetadata,
    log: CallLog,
    fail: Vec<&'static str>,
    hang: Vec<&'static str>,
    hooks: Vec<(String, HookBehavior)>,
    routes: Vec<String>,
    components: Vec<(String, String)>,
    schema: Option<ConfigSchema>,
    install_settings: Option<Value>,
}

impl TestPlugin {
    pub fn new(name: &str, log: &CallLog) -> Self {
        Self {
            meta: PluginMetadata::new(name, "1.0.0"),
            log: log.clone(),
            fail: Vec::new(),
            hang: Vec::new(),
            hooks: Vec::new(),
            routes: Vec::new(),
            components: Vec::new(),
            schema: None,
            install_settings: None,
        }
    }

    pub fn version(mut self, version: &str) -> Self {
        self.meta.version = version.to_string();
        self
    }

    pub fn describe(mut self, description: &str, keywords: &[&str]) -> Self {
        self.meta.description = description.to_string();
        for k in keywords {
            self.meta.keywords.insert(k.to_string());
        }
        self
    }

    pub fn depends_on(mut self, name: &str, range: &str) -> Self {
        self.meta.dependencies.insert(name.to_string(), range.to_string());
        self
    }

    /// Make the named callback (`on_install`, `on_enable`, ...) fail.
    pub fn failing(mut self, callback: &'static str) -> Self {
        self.fail.push(callback);
        self
    }

    /// Make the named callback never complete.
    pub fn hanging(mut self, callback: &'static str) -> Self {
        self.hang.push(callback);
        self
    }

    pub fn on_hook(mut self, hook: &str, behavior: HookBehavior) -> Self {
        self.hooks.push((hook.to_string(), behavior));
        self
    }

    pub fn with_route(mut self, path: &str) -> Self {
        self.routes.push(path.to_string());
        self
    }

    pub fn with_component(mut self, slot: &str, component: &str) -> Self {
        self.components.push((slot.to_string(), component.to_string()));
        self
    }

    pub fn with_schema(mut self, schema: ConfigSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Call `create_settings` with these defaults from `on_install`.
    pub fn installing_settings(mut self, defaults: Value) -> Self {
        self.install_settings = Some(defaults);
        self
    }

    pub fn arc(self) -> Arc<dyn Plugin> {
        Arc::new(self)
    }

    async fn callback(&self, name: &'static str) -> AppResult<()> {
        self.log.push(format!("{}:{}", self.meta.name, name));
        if self.hang.contains(&name) {
            std::future::pending::<()>().await;
        }
        if self.fail.contains(&name) {
            return Err(AppError::plugin_runtime(format!("{name} refused")));
        }
        Ok(())
    }
}

#[async_trait]
impl Plugin for TestPlugin {
    fn metadata(&self) -> PluginMetadata {
        self.meta.clone()
    }

    fn config_schema(&self) -> Option<ConfigSchema> {
        self.schema.clone()
    }

    fn hooks(&self) -> HashMap<String, Arc<dyn HookHandler>> {
        self.hooks
            .iter()
            .map(|(hook, behavior)| {
                let handler: Arc<dyn HookHandler> = Arc::new(TestHookHandler {
                    plugin: self.meta.name.clone(),
                    hook: hook.clone(),
                    behavior: behavior.clone(),
                    log: self.log.clone(),
                });
                (hook.clone(), handler)
            })
            .collect()
    }

    fn routes(&self) -> HashMap<String, Arc<dyn RouteHandler>> {
        self.routes
            .iter()
            .map(|path| {
                let route = ClosureRoute::wrap(|ctx: PluginContext, request: Value| async move {
                    Ok::<_, AppError>(json!({ "plugin": ctx.plugin_id(), "echo": request }))
                });
                (path.clone(), route)
            })
            .collect()
    }

    fn components(&self) -> HashMap<String, Arc<dyn ComponentFactory>> {
        self.components
            .iter()
            .map(|(slot, name)| {
                let component: Arc<dyn ComponentFactory> =
                    Arc::new(StaticComponent::new(name.clone(), json!({ "kind": "panel" })));
                (slot.clone(), component)
            })
            .collect()
    }

    async fn on_install(&self, ctx: &PluginContext) -> AppResult<()> {
        self.callback("on_install").await?;
        if let Some(Value::Object(defaults)) = &self.install_settings {
            ctx.create_settings(defaults.clone()).await?;
        }
        Ok(())
    }

    async fn on_enable(&self, _ctx: &PluginContext) -> AppResult<()> {
        self.callback("on_enable").await
    }

    async fn on_disable(&self, _ctx: &PluginContext) -> AppResult<()> {
        self.callback("on_disable").await
    }

    async fn on_uninstall(&self, _ctx: &PluginContext) -> AppResult<()> {
        self.callback("on_uninstall").await
    }
}

/// Unwrap a JSON object literal into a map.
pub fn obj(value: Value) -> serde_json::Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}
