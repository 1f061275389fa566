//! Plugin registry: owns plugin lifecycle and the authoritative plugin table.
//!
//! Every transition is persisted before it becomes visible in memory, so
//! the in-memory status and the stored record never disagree once an
//! operation returns. Operations on the same plugin name are serialized;
//! operations on different names run concurrently.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use serde_json::{Map, Value, json};
use tracing::{debug, error, info, warn};

use billhub_core::config::plugin::PluginSystemConfig;
use billhub_core::error::{AppError, ErrorKind};
use billhub_core::result::AppResult;
use billhub_entity::audit::PluginAction;
use billhub_entity::plugin::{PluginRecord, PluginStatus};

use crate::api::context::PluginContext;
use crate::api::services::PluginServices;
use crate::dependency::{check_dependencies, dependency_order};
use crate::hooks::definitions::names;
use crate::hooks::dispatcher::{DEFAULT_HOOK_TIMEOUT, HookDispatcher, HookTicket};
use crate::locks::NameLocks;
use crate::metadata::{PluginInfo, PluginMetadata};
use crate::table::{PluginTable, RegisteredPlugin, TableEntry};
use crate::traits::{Plugin, RouteHandler};
use crate::validator::validate_plugin;

/// Default execution window for one lifecycle callback.
pub const DEFAULT_LIFECYCLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Timing knobs for the registry.
#[derive(Debug, Clone, Copy)]
pub struct RegistrySettings {
    /// Execution window for one hook handler invocation.
    pub hook_timeout: Duration,
    /// Execution window for one lifecycle callback.
    pub lifecycle_timeout: Duration,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            hook_timeout: DEFAULT_HOOK_TIMEOUT,
            lifecycle_timeout: DEFAULT_LIFECYCLE_TIMEOUT,
        }
    }
}

impl From<&PluginSystemConfig> for RegistrySettings {
    fn from(config: &PluginSystemConfig) -> Self {
        Self {
            hook_timeout: Duration::from_secs(config.hook_timeout_seconds),
            lifecycle_timeout: Duration::from_secs(config.lifecycle_timeout_seconds),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum LifecyclePhase {
    Install,
    Enable,
    Disable,
    Uninstall,
}

impl LifecyclePhase {
    fn callback(&self) -> &'static str {
        match self {
            Self::Install => "on_install",
            Self::Enable => "on_enable",
            Self::Disable => "on_disable",
            Self::Uninstall => "on_uninstall",
        }
    }

    fn operation(&self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Enable => "enable",
            Self::Disable => "disable",
            Self::Uninstall => "uninstall",
        }
    }
}

/// Outcome of [`PluginRegistry::restore`].
#[derive(Debug, Clone, Default)]
pub struct RestoreReport {
    /// Plugins with no stored record, installed fresh.
    pub installed: Vec<String>,
    /// Plugins re-registered from their stored record.
    pub restored: Vec<String>,
    /// Restored plugins re-enabled because their record said enabled.
    pub enabled: Vec<String>,
    /// Plugins that could not be restored, installed, or re-enabled.
    pub failed: Vec<(String, String)>,
    /// Stored records with no matching loaded plugin.
    pub orphaned: Vec<String>,
}

/// Registry of all installed plugins.
#[derive(Debug)]
pub struct PluginRegistry {
    table: Arc<PluginTable>,
    services: PluginServices,
    dispatcher: HookDispatcher,
    locks: NameLocks,
    settings: RegistrySettings,
}

impl PluginRegistry {
    /// Creates an empty registry on top of `services`.
    pub fn new(services: PluginServices, settings: RegistrySettings) -> Self {
        let table = Arc::new(PluginTable::new());
        let dispatcher = HookDispatcher::new(table.clone(), services.clone(), settings.hook_timeout);
        Self {
            table,
            services,
            dispatcher,
            locks: NameLocks::new(),
            settings,
        }
    }

    /// The hook dispatcher bound to this registry.
    pub fn dispatcher(&self) -> &HookDispatcher {
        &self.dispatcher
    }

    /// The services this registry persists and reports through.
    pub fn services(&self) -> &PluginServices {
        &self.services
    }

    /// The registry's timing knobs.
    pub fn settings(&self) -> RegistrySettings {
        self.settings
    }

    /// Registers and installs a plugin.
    ///
    /// A failing `on_install` leaves the plugin registered in the `error`
    /// status; it must be unregistered and registered again before it can
    /// be enabled.
    pub async fn register(&self, plugin: Arc<dyn Plugin>) -> AppResult<PluginInfo> {
        self.register_captured(RegisteredPlugin::capture(plugin)).await
    }

    async fn register_captured(&self, registered: RegisteredPlugin) -> AppResult<PluginInfo> {
        validate_plugin(&registered.shape())?;
        let name = registered.name().to_string();

        let _guard = self.locks.lock(&name).await;
        if self.table.contains(&name).await {
            return Err(AppError::validation(format!(
                "Plugin '{name}' is already registered"
            )));
        }
        check_dependencies(&registered.metadata, &self.table.installed().await)?;

        let installed = PluginInfo::installed(&registered.metadata, Utc::now());
        self.services
            .store
            .upsert(&installed.to_record(&registered.metadata)?)
            .await?;
        self.table.insert(registered.clone(), installed.clone()).await;

        info!(
            plugin_id = %name,
            version = %registered.metadata.version,
            hooks = registered.hooks.len(),
            "Plugin registered"
        );

        let ctx = self.context(&registered);
        let outcome = self
            .run_lifecycle(&name, LifecyclePhase::Install, registered.plugin.on_install(&ctx))
            .await;
        let info = match outcome {
            Ok(()) => installed,
            Err(e) => self.mark_install_failed(&registered, installed, e).await?,
        };

        self.services
            .audit(
                PluginAction::Install,
                &name,
                Some(json!({ "version": info.version, "status": info.status })),
            )
            .await;
        self.dispatcher
            .execute_hook(
                names::PLUGIN_INSTALLED,
                json!({ "plugin": name, "version": info.version, "status": info.status }),
            )
            .await;

        Ok(info)
    }

    async fn mark_install_failed(
        &self,
        registered: &RegisteredPlugin,
        installed: PluginInfo,
        cause: AppError,
    ) -> AppResult<PluginInfo> {
        let name = registered.name();
        warn!(plugin_id = %name, error = %cause, "Plugin install callback failed");
        self.services
            .record_error(name, LifecyclePhase::Install.operation(), &cause)
            .await;

        let failed = PluginInfo {
            status: PluginStatus::Error,
            error: Some(cause.message.clone()),
            ..installed
        };
        if let Err(e) = self
            .services
            .store
            .upsert(&failed.to_record(&registered.metadata)?)
            .await
        {
            error!(plugin_id = %name, error = %e, "Failed to persist plugin error status");
            return Err(e);
        }
        self.table.set_info(failed.clone()).await;
        Ok(failed)
    }

    /// Disables (if enabled), uninstalls, and removes a plugin along with
    /// its configuration.
    ///
    /// The stored record is deleted before anything else is removed; if
    /// that write fails the plugin stays registered with its configuration.
    /// A failure to delete the configuration afterwards is recorded and
    /// does not fail the call.
    pub async fn unregister(&self, name: &str) -> AppResult<()> {
        let result = {
            let _guard = self.locks.lock(name).await;
            self.unregister_locked(name).await
        };
        self.locks.evict(name);
        result
    }

    async fn unregister_locked(&self, name: &str) -> AppResult<()> {
        let mut entry = self.entry(name).await?;

        if entry.info.status == PluginStatus::Enabled {
            entry.info = self.disable_locked(&entry).await?;
        }

        let ctx = self.context(&entry.registered);
        if let Err(e) = self
            .run_lifecycle(name, LifecyclePhase::Uninstall, entry.registered.plugin.on_uninstall(&ctx))
            .await
        {
            warn!(plugin_id = %name, error = %e, "Plugin uninstall callback failed, removing anyway");
            self.services
                .record_error(name, LifecyclePhase::Uninstall.operation(), &e)
                .await;
        }

        self.services.store.delete(name).await?;
        self.table.remove(name).await;
        if let Err(e) = self.services.config().delete_settings(name).await {
            warn!(plugin_id = %name, error = %e, "Failed to delete configuration of removed plugin");
            self.services
                .record_error(name, LifecyclePhase::Uninstall.operation(), &e)
                .await;
        }

        info!(plugin_id = %name, "Plugin unregistered");
        self.services.audit(PluginAction::Uninstall, name, None).await;
        self.dispatcher
            .execute_hook(
                names::PLUGIN_UNINSTALLED,
                json!({ "plugin": name, "version": entry.info.version }),
            )
            .await;

        Ok(())
    }

    /// Enables a plugin. Enabling an enabled plugin is a no-op.
    ///
    /// `on_enable` runs before the transition is committed; if it fails
    /// the plugin keeps its previous status and the failure is recorded.
    pub async fn enable(&self, name: &str) -> AppResult<PluginInfo> {
        let _guard = self.locks.lock(name).await;
        let entry = self.entry(name).await?;

        match entry.info.status {
            PluginStatus::Enabled => {
                debug!(plugin_id = %name, "Plugin already enabled");
                return Ok(entry.info);
            }
            PluginStatus::Error => {
                return Err(AppError::conflict(format!(
                    "Plugin '{}' failed to install and must be re-registered: {}",
                    name,
                    entry.info.error.as_deref().unwrap_or("unknown error")
                )));
            }
            PluginStatus::Installed | PluginStatus::Disabled => {}
        }

        check_dependencies(&entry.registered.metadata, &self.table.installed().await)?;

        let ctx = self.context(&entry.registered);
        let plugin = &entry.registered.plugin;
        if let Err(e) = self
            .run_lifecycle(name, LifecyclePhase::Enable, plugin.on_enable(&ctx))
            .await
        {
            warn!(plugin_id = %name, error = %e, "Plugin enable callback failed");
            self.services
                .record_error(name, LifecyclePhase::Enable.operation(), &e)
                .await;
            self.table
                .set_info(PluginInfo {
                    error: Some(e.message.clone()),
                    ..entry.info.clone()
                })
                .await;
            return Err(e);
        }

        let mut enabled = entry.info.transition(PluginStatus::Enabled, Utc::now());
        enabled.error = None;
        let persisted = match enabled.to_record(&entry.registered.metadata) {
            Ok(record) => self.services.store.upsert(&record).await,
            Err(e) => Err(e),
        };
        if let Err(e) = persisted {
            error!(plugin_id = %name, error = %e, "Failed to persist enabled status, rolling back");
            if let Err(rollback) = self
                .run_lifecycle(name, LifecyclePhase::Disable, plugin.on_disable(&ctx))
                .await
            {
                warn!(plugin_id = %name, error = %rollback, "Rollback disable callback failed");
            }
            return Err(e);
        }
        self.table.set_info(enabled.clone()).await;

        info!(plugin_id = %name, version = %enabled.version, "Plugin enabled");
        self.services.audit(PluginAction::Enable, name, None).await;
        self.dispatcher
            .execute_hook(
                names::PLUGIN_ENABLED,
                json!({ "plugin": name, "version": enabled.version }),
            )
            .await;

        Ok(enabled)
    }

    /// Disables a plugin. Disabling a plugin that is not enabled is a no-op.
    ///
    /// Enabled dependents are left running; a warning names them.
    pub async fn disable(&self, name: &str) -> AppResult<PluginInfo> {
        let _guard = self.locks.lock(name).await;
        let entry = self.entry(name).await?;

        if entry.info.status != PluginStatus::Enabled {
            debug!(plugin_id = %name, status = %entry.info.status, "Plugin not enabled, nothing to disable");
            return Ok(entry.info);
        }

        self.disable_locked(&entry).await
    }

    /// Disable transition; the caller holds the name lock.
    ///
    /// If the `disabled` record cannot be persisted, `on_enable` runs again
    /// so the plugin is live while it is still enabled in memory.
    async fn disable_locked(&self, entry: &TableEntry) -> AppResult<PluginInfo> {
        let name = entry.info.name.as_str();

        let dependents = self.table.enabled_dependents(name).await;
        if !dependents.is_empty() {
            warn!(
                plugin_id = %name,
                dependents = ?dependents,
                "Disabling a plugin that enabled plugins depend on"
            );
        }

        let mut disabled = entry.info.transition(PluginStatus::Disabled, Utc::now());
        disabled.error = None;

        let ctx = self.context(&entry.registered);
        if let Err(e) = self
            .run_lifecycle(name, LifecyclePhase::Disable, entry.registered.plugin.on_disable(&ctx))
            .await
        {
            warn!(plugin_id = %name, error = %e, "Plugin disable callback failed, disabling anyway");
            self.services
                .record_error(name, LifecyclePhase::Disable.operation(), &e)
                .await;
            disabled.error = Some(e.message);
        }

        let persisted = match disabled.to_record(&entry.registered.metadata) {
            Ok(record) => self.services.store.upsert(&record).await,
            Err(e) => Err(e),
        };
        if let Err(e) = persisted {
            error!(plugin_id = %name, error = %e, "Failed to persist disabled status, re-enabling");
            if let Err(restart) = self
                .run_lifecycle(name, LifecyclePhase::Enable, entry.registered.plugin.on_enable(&ctx))
                .await
            {
                warn!(plugin_id = %name, error = %restart, "Re-enable callback failed");
                self.services
                    .record_error(name, LifecyclePhase::Enable.operation(), &restart)
                    .await;
            }
            return Err(e);
        }
        self.table.set_info(disabled.clone()).await;

        info!(plugin_id = %name, "Plugin disabled");
        self.services.audit(PluginAction::Disable, name, None).await;
        self.dispatcher
            .execute_hook(
                names::PLUGIN_DISABLED,
                json!({ "plugin": name, "version": disabled.version }),
            )
            .await;

        Ok(disabled)
    }

    /// Re-registers loaded plugins against their stored records.
    ///
    /// Plugins with a record are restored without re-running `on_install`;
    /// those whose record said enabled are enabled again in dependency
    /// order. Plugins without a record are installed fresh. Records with
    /// no loaded plugin are reported and left untouched.
    pub async fn restore(&self, plugins: Vec<Arc<dyn Plugin>>) -> AppResult<RestoreReport> {
        let records: HashMap<String, PluginRecord> = self
            .services
            .store
            .list_installed()
            .await?
            .into_iter()
            .map(|r| (r.name.clone(), r))
            .collect();

        let mut report = RestoreReport::default();
        let mut loaded = HashSet::new();
        let mut fresh = Vec::new();
        let mut to_enable = Vec::new();

        for plugin in plugins {
            let registered = RegisteredPlugin::capture(plugin);
            let name = registered.name().to_string();
            loaded.insert(name.clone());

            let Some(record) = records.get(&name) else {
                fresh.push(registered);
                continue;
            };

            let metadata = registered.metadata.clone();
            match self.restore_one(registered, record).await {
                Ok(()) => {
                    if record.status == PluginStatus::Enabled {
                        to_enable.push(metadata);
                    }
                    report.restored.push(name);
                }
                Err(e) => {
                    warn!(plugin_id = %name, error = %e, "Failed to restore plugin");
                    report.failed.push((name, e.message));
                }
            }
        }

        self.reenable(dependency_order(&to_enable), &mut report).await;

        for registered in fresh {
            let name = registered.name().to_string();
            match self.register_captured(registered).await {
                Ok(_) => report.installed.push(name),
                Err(e) => {
                    warn!(plugin_id = %name, error = %e, "Failed to install plugin");
                    report.failed.push((name, e.message));
                }
            }
        }

        let mut orphaned: Vec<String> = records
            .into_keys()
            .filter(|name| !loaded.contains(name))
            .collect();
        orphaned.sort();
        for name in &orphaned {
            warn!(plugin_id = %name, "Stored plugin record has no loaded plugin");
        }
        report.orphaned = orphaned;

        info!(
            restored = report.restored.len(),
            enabled = report.enabled.len(),
            installed = report.installed.len(),
            failed = report.failed.len(),
            "Plugin restore complete"
        );
        Ok(report)
    }

    async fn restore_one(&self, registered: RegisteredPlugin, record: &PluginRecord) -> AppResult<()> {
        validate_plugin(&registered.shape())?;
        let name = registered.name().to_string();
        let _guard = self.locks.lock(&name).await;
        if self.table.contains(&name).await {
            return Err(AppError::validation(format!(
                "Plugin '{name}' is already registered"
            )));
        }

        let mut info = PluginInfo::from_record(record);
        info.version = registered.metadata.version.clone();
        if info.status == PluginStatus::Enabled {
            // Re-enabled below once dependencies are back.
            info = info.transition(PluginStatus::Disabled, Utc::now());
        }

        self.services
            .store
            .upsert(&info.to_record(&registered.metadata)?)
            .await?;
        self.table.insert(registered, info).await;
        debug!(plugin_id = %name, "Plugin restored from stored record");
        Ok(())
    }

    async fn reenable(&self, mut pending: Vec<String>, report: &mut RestoreReport) {
        loop {
            let mut progressed = false;
            let mut blocked = Vec::new();
            for name in pending {
                match self.enable(&name).await {
                    Ok(_) => {
                        progressed = true;
                        report.enabled.push(name);
                    }
                    Err(e) if e.kind == ErrorKind::Dependency => blocked.push((name, e)),
                    Err(e) => report.failed.push((name, e.message)),
                }
            }
            if blocked.is_empty() || !progressed {
                for (name, e) in blocked {
                    warn!(plugin_id = %name, error = %e, "Plugin left disabled after restore");
                    report.failed.push((name, e.message));
                }
                return;
            }
            pending = blocked.into_iter().map(|(name, _)| name).collect();
        }
    }

    /// Returns a plugin instance by name.
    pub async fn get(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.table.get(name).await.map(|e| e.registered.plugin)
    }

    /// All registered plugin instances, ordered by name.
    pub async fn get_all(&self) -> Vec<Arc<dyn Plugin>> {
        self.table
            .entries()
            .await
            .into_iter()
            .map(|e| e.registered.plugin)
            .collect()
    }

    /// Enabled plugin instances, ordered by name.
    pub async fn get_enabled(&self) -> Vec<Arc<dyn Plugin>> {
        self.table
            .entries()
            .await
            .into_iter()
            .filter(|e| e.info.is_enabled())
            .map(|e| e.registered.plugin)
            .collect()
    }

    /// Whether the plugin exists and is enabled.
    pub async fn is_enabled(&self, name: &str) -> bool {
        self.table
            .get(name)
            .await
            .is_some_and(|e| e.info.is_enabled())
    }

    /// Lifecycle info for one plugin.
    pub async fn get_plugin_info(&self, name: &str) -> Option<PluginInfo> {
        self.table.get(name).await.map(|e| e.info)
    }

    /// Lifecycle info for every plugin, ordered by name.
    pub async fn get_all_plugin_info(&self) -> Vec<PluginInfo> {
        self.table
            .entries()
            .await
            .into_iter()
            .map(|e| e.info)
            .collect()
    }

    /// Declared metadata for one plugin.
    pub async fn metadata(&self, name: &str) -> Option<PluginMetadata> {
        self.table.get(name).await.map(|e| e.registered.metadata)
    }

    /// Enabled plugins that declare `name` as a dependency.
    pub async fn dependents_of(&self, name: &str) -> Vec<String> {
        self.table.enabled_dependents(name).await
    }

    /// A context bound to the named plugin.
    pub async fn context_for(&self, name: &str) -> AppResult<PluginContext> {
        let entry = self.entry(name).await?;
        Ok(self.context(&entry.registered))
    }

    /// Merge `partial` into a plugin's configuration.
    ///
    /// Holds the plugin's lifecycle lock, so an update cannot write
    /// configuration for a plugin that is concurrently being removed.
    pub async fn update_plugin_config(
        &self,
        name: &str,
        partial: Map<String, Value>,
    ) -> AppResult<Map<String, Value>> {
        let _guard = self.locks.lock(name).await;
        let entry = self.entry(name).await?;
        self.context(&entry.registered)
            .set_plugin_config(partial)
            .await
    }

    /// Enqueue a hook event for every enabled subscriber.
    pub async fn execute_hook(&self, hook: &str, data: Value) -> HookTicket {
        self.dispatcher.execute_hook(hook, data).await
    }

    /// Metadata and info for every plugin, ordered by name.
    pub(crate) async fn listings(&self) -> Vec<(PluginMetadata, PluginInfo)> {
        self.table
            .entries()
            .await
            .into_iter()
            .map(|e| (e.registered.metadata, e.info))
            .collect()
    }

    /// Snapshot of every entry, ordered by name.
    pub(crate) async fn entries(&self) -> Vec<TableEntry> {
        self.table.entries().await
    }

    /// Route handler and context for an enabled plugin's route.
    pub(crate) async fn route(
        &self,
        name: &str,
        path: &str,
    ) -> AppResult<(Arc<dyn RouteHandler>, PluginContext)> {
        let entry = self.entry(name).await?;
        let handler = entry.registered.routes.get(path).cloned().ok_or_else(|| {
            AppError::not_found(format!("Plugin '{name}' has no route '{path}'"))
        })?;
        if !entry.info.is_enabled() {
            return Err(AppError::validation(format!(
                "Plugin '{name}' is not enabled"
            )));
        }
        Ok((handler, self.context(&entry.registered)))
    }

    async fn entry(&self, name: &str) -> AppResult<TableEntry> {
        self.table
            .get(name)
            .await
            .ok_or_else(|| AppError::not_found(format!("Plugin '{name}' not found")))
    }

    fn context(&self, registered: &RegisteredPlugin) -> PluginContext {
        self.services
            .context_for(registered.name(), registered.schema.clone())
    }

    /// Run one lifecycle callback inside the lifecycle window, converting
    /// errors, panics, and overruns into plugin failures.
    async fn run_lifecycle<F>(&self, name: &str, phase: LifecyclePhase, callback: F) -> AppResult<()>
    where
        F: Future<Output = AppResult<()>>,
    {
        let window = self.settings.lifecycle_timeout;
        match tokio::time::timeout(window, AssertUnwindSafe(callback).catch_unwind()).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(e))) => {
                let kind = if e.kind == ErrorKind::Timeout {
                    ErrorKind::Timeout
                } else {
                    ErrorKind::PluginRuntime
                };
                let message = format!("Plugin '{}' {} failed: {}", name, phase.callback(), e.message);
                Err(AppError::with_source(kind, message, e))
            }
            Ok(Err(_)) => Err(AppError::plugin_runtime(format!(
                "Plugin '{}' {} panicked",
                name,
                phase.callback()
            ))),
            Err(_) => Err(AppError::timeout(format!(
                "Plugin '{}' {} timed out after {:?}",
                name,
                phase.callback(),
                window
            ))),
        }
    }
}
