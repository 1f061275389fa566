//! BillHub plugin host.
//!
//! Wires the plugin stores, restores the compiled-in (and, with the
//! `dynamic` feature, shared-library) plugins against their stored state,
//! and runs until interrupted.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use billhub_core::config::{AppConfig, LogFormat, PluginStoreKind};
use billhub_database::DatabasePool;
use billhub_database::memory::{MemoryAuditLog, MemoryConfigStore, MemoryErrorLog, MemoryPluginStore};
use billhub_database::repositories::{
    AuditLogRepository, PluginConfigRepository, PluginErrorRepository, PluginRepository,
};
use billhub_plugin::{
    BroadcastEmitter, PluginManager, PluginRegistry, PluginServices, RegistrySettings,
    StaticPluginLoader, names,
};
use plugin_billing_extras::BillingExtrasPlugin;
use plugin_billing_extras::plugin::PLUGIN_NAME as BILLING_EXTRAS;

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "billhub-plugind", version, about = "BillHub plugin host")]
struct Args {
    /// Directory containing `default.toml` and environment overlays.
    #[arg(long, env = "BILLHUB_CONFIG_DIR", default_value = "config")]
    config_dir: String,

    /// Environment overlay to apply on top of the defaults.
    #[arg(long, env = "BILLHUB_ENV", default_value = "development")]
    env: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match AppConfig::load(&args.config_dir, &args.env) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        error!("Plugin host failed: {e:#}");
        std::process::exit(1);
    }
}

/// Initialize tracing; `RUST_LOG` overrides the configured level.
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        LogFormat::Pretty => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

async fn run(config: AppConfig) -> anyhow::Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        store = ?config.plugins.store,
        "Starting BillHub plugin host"
    );

    // ── Stores ───────────────────────────────────────────────────
    let events = BroadcastEmitter::new(config.plugins.event_buffer_size);
    let (services, pool) = build_services(&config, &events).await?;

    // ── Registry ─────────────────────────────────────────────────
    let registry = Arc::new(PluginRegistry::new(
        services,
        RegistrySettings::from(&config.plugins),
    ));
    let manager = PluginManager::new(registry.clone());

    // ── Plugins ──────────────────────────────────────────────────
    let mut builtin = StaticPluginLoader::new().with_factory(BILLING_EXTRAS, BillingExtrasPlugin::create);
    #[allow(unused_mut)]
    let mut plugins = builtin.load_all().context("Failed to load built-in plugins")?;

    // Keeps dynamic libraries mapped until the host exits.
    #[cfg(feature = "dynamic")]
    let _libraries = load_dynamic(&config.plugins.directory, &mut plugins)?;

    let report = registry
        .restore(plugins)
        .await
        .context("Failed to restore plugins")?;
    for (name, reason) in &report.failed {
        warn!(plugin_id = %name, reason = %reason, "Plugin unavailable after restore");
    }

    for (name, reason) in manager.enable_all(&config.plugins.auto_enable).await {
        warn!(plugin_id = %name, reason = %reason, "Auto-enable failed");
    }

    spawn_event_log(&events);

    registry
        .execute_hook(
            names::SYSTEM_STARTED,
            json!({ "version": env!("CARGO_PKG_VERSION") }),
        )
        .await;

    info!(
        installed = registry.get_all().await.len(),
        enabled = registry.get_enabled().await.len(),
        "Plugin host ready"
    );

    // ── Shutdown ─────────────────────────────────────────────────
    shutdown_signal().await;
    info!("Shutdown signal received");

    manager.shutdown().await;
    if let Some(pool) = pool {
        pool.close().await;
    }

    info!("BillHub plugin host stopped");
    Ok(())
}

/// Build the store collaborators for the configured backend.
async fn build_services(
    config: &AppConfig,
    events: &BroadcastEmitter,
) -> anyhow::Result<(PluginServices, Option<DatabasePool>)> {
    let emitter = Arc::new(events.clone());

    match config.plugins.store {
        PluginStoreKind::Memory => {
            warn!("Using in-memory plugin store; plugin state is lost on restart");
            let services = PluginServices::new(
                Arc::new(MemoryPluginStore::new()),
                Arc::new(MemoryConfigStore::new()),
                Arc::new(MemoryErrorLog::new()),
                Arc::new(MemoryAuditLog::new()),
                emitter,
            );
            Ok((services, None))
        }
        PluginStoreKind::Postgres => {
            let database = config
                .database
                .as_ref()
                .context("plugins.store = \"postgres\" requires a [database] section")?;
            let pool = DatabasePool::connect(database).await?;

            let pg = pool.pool().clone();
            let services = PluginServices::new(
                Arc::new(PluginRepository::new(pg.clone())),
                Arc::new(PluginConfigRepository::new(pg.clone())),
                Arc::new(PluginErrorRepository::new(pg.clone())),
                Arc::new(AuditLogRepository::new(pg)),
                emitter,
            );
            Ok((services, Some(pool)))
        }
    }
}

/// Load every shared-library plugin in `directory`, skipping ones that fail.
#[cfg(feature = "dynamic")]
fn load_dynamic(
    directory: &str,
    plugins: &mut Vec<Arc<dyn billhub_plugin::Plugin>>,
) -> anyhow::Result<billhub_plugin::loader::DynamicPluginLoader> {
    use billhub_plugin::PluginLoader;

    let mut loader = billhub_plugin::loader::DynamicPluginLoader::new(directory);
    for descriptor in loader.discover()? {
        match loader.load(&descriptor) {
            Ok(plugin) => plugins.push(plugin),
            Err(e) => warn!(plugin_id = %descriptor.name, error = %e, "Skipping plugin library"),
        }
    }
    Ok(loader)
}

/// Log outward plugin events at debug level.
fn spawn_event_log(events: &BroadcastEmitter) {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => debug!(
                    source = %event.source,
                    event = %event.name,
                    data = %event.data,
                    "Plugin event"
                ),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Plugin event log fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
