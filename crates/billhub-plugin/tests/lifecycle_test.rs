//! Integration tests for plugin registration and lifecycle transitions.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use billhub_core::error::ErrorKind;
use billhub_entity::audit::PluginAction;
use billhub_entity::plugin::PluginStatus;
use billhub_plugin::RegistrySettings;

use common::{CallLog, TestHarness, TestPlugin};

#[tokio::test]
async fn test_register_installs_and_persists() {
    let h = TestHarness::new();
    let log = CallLog::new();

    let info = h
        .registry
        .register(TestPlugin::new("billing-extras", &log).arc())
        .await
        .unwrap();

    assert_eq!(info.status, PluginStatus::Installed);
    assert!(info.enabled_at.is_none());
    assert_eq!(log.entries(), vec!["billing-extras:on_install"]);

    let record = h.plugins.get("billing-extras").unwrap();
    assert_eq!(record.status, PluginStatus::Installed);
    assert!(!record.enabled);
    assert_eq!(h.audit.count(PluginAction::Install, "billing-extras").await, 1);
}

#[tokio::test]
async fn test_duplicate_registration_fails() {
    let h = TestHarness::new();
    let log = CallLog::new();
    h.registry
        .register(TestPlugin::new("ledger", &log).arc())
        .await
        .unwrap();

    let err = h
        .registry
        .register(TestPlugin::new("ledger", &log).version("2.0.0").arc())
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Validation);
    assert_eq!(log.count("ledger:on_install"), 1);
    assert_eq!(h.plugins.get("ledger").unwrap().version, "1.0.0");
}

#[tokio::test]
async fn test_read_accessors_reflect_lifecycle_state() {
    let h = TestHarness::new();
    let log = CallLog::new();
    h.registry
        .register(TestPlugin::new("reports", &log).arc())
        .await
        .unwrap();
    h.registry
        .register(TestPlugin::new("ledger", &log).arc())
        .await
        .unwrap();
    h.registry.enable("ledger").await.unwrap();

    let infos = h.registry.get_all_plugin_info().await;
    let summary: Vec<_> = infos.iter().map(|i| (i.name.as_str(), i.status)).collect();
    assert_eq!(
        summary,
        vec![
            ("ledger", PluginStatus::Enabled),
            ("reports", PluginStatus::Installed),
        ]
    );

    assert_eq!(h.registry.get_all().await.len(), 2);
    assert_eq!(h.registry.get_enabled().await.len(), 1);
    assert!(h.registry.is_enabled("ledger").await);
    assert!(!h.registry.is_enabled("reports").await);
    assert!(h.registry.get("reports").await.is_some());
    assert!(h.registry.get("ghost").await.is_none());
    assert!(h.registry.get_plugin_info("ghost").await.is_none());
}

#[tokio::test]
async fn test_invalid_metadata_rejected_without_side_effects() {
    let h = TestHarness::new();
    let log = CallLog::new();

    let err = h
        .registry
        .register(TestPlugin::new("ledger", &log).version("latest").arc())
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Validation);
    assert!(err.message.contains("'version'"));
    assert!(log.entries().is_empty());
    assert!(h.plugins.is_empty());
}

#[tokio::test]
async fn test_enable_requires_installed_and_enabled_dependency() {
    let h = TestHarness::new();
    let log = CallLog::new();

    let reports = TestPlugin::new("reports", &log).depends_on("ledger", "*");
    let err = h.registry.register(reports.arc()).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Dependency);
    assert!(err.message.contains("ledger not installed"));

    h.registry
        .register(TestPlugin::new("ledger", &log).arc())
        .await
        .unwrap();
    let err = h
        .registry
        .register(TestPlugin::new("reports", &log).depends_on("ledger", "*").arc())
        .await
        .unwrap_err();
    assert!(err.message.contains("ledger not enabled"));

    h.registry.enable("ledger").await.unwrap();
    h.registry
        .register(TestPlugin::new("reports", &log).depends_on("ledger", "*").arc())
        .await
        .unwrap();

    // Dependency disabled after install: enabling the dependent is gated again.
    h.registry.disable("ledger").await.unwrap();
    let err = h.registry.enable("reports").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Dependency);
    assert_eq!(h.status("reports").await, Some(PluginStatus::Installed));

    h.registry.enable("ledger").await.unwrap();
    let info = h.registry.enable("reports").await.unwrap();
    assert_eq!(info.status, PluginStatus::Enabled);
}

#[tokio::test]
async fn test_dependency_version_range_enforced() {
    let h = TestHarness::new();
    let log = CallLog::new();
    h.registry
        .register(TestPlugin::new("ledger", &log).version("1.4.0").arc())
        .await
        .unwrap();
    h.registry.enable("ledger").await.unwrap();

    let err = h
        .registry
        .register(TestPlugin::new("reports", &log).depends_on("ledger", "^2.0").arc())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Dependency);
    assert!(err.message.contains("ledger 1.4.0 does not satisfy ^2.0"));

    h.registry
        .register(TestPlugin::new("reports", &log).depends_on("ledger", ">=1.2, <2").arc())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_enable_and_disable_are_idempotent() {
    let h = TestHarness::new();
    let log = CallLog::new();
    h.registry
        .register(TestPlugin::new("ledger", &log).arc())
        .await
        .unwrap();

    let first = h.registry.enable("ledger").await.unwrap();
    let second = h.registry.enable("ledger").await.unwrap();
    assert_eq!(first.enabled_at, second.enabled_at);
    assert_eq!(log.count("ledger:on_enable"), 1);
    assert_eq!(h.audit.count(PluginAction::Enable, "ledger").await, 1);

    h.registry.disable("ledger").await.unwrap();
    let again = h.registry.disable("ledger").await.unwrap();
    assert_eq!(again.status, PluginStatus::Disabled);
    assert_eq!(log.count("ledger:on_disable"), 1);
    assert_eq!(h.audit.count(PluginAction::Disable, "ledger").await, 1);
}

#[tokio::test]
async fn test_unknown_plugin_is_not_found() {
    let h = TestHarness::new();
    for result in [
        h.registry.enable("ghost").await.map(|_| ()),
        h.registry.disable("ghost").await.map(|_| ()),
        h.registry.unregister("ghost").await,
    ] {
        assert_eq!(result.unwrap_err().kind, ErrorKind::NotFound);
    }
}

#[tokio::test]
async fn test_unregister_enabled_disables_first() {
    let h = TestHarness::new();
    let log = CallLog::new();
    h.registry
        .register(TestPlugin::new("ledger", &log).arc())
        .await
        .unwrap();
    h.registry.enable("ledger").await.unwrap();
    h.manager
        .update_plugin_config("ledger", common::obj(serde_json::json!({ "currency": "EUR" })))
        .await
        .unwrap();

    h.registry.unregister("ledger").await.unwrap();

    assert_eq!(
        log.entries(),
        vec![
            "ledger:on_install",
            "ledger:on_enable",
            "ledger:on_disable",
            "ledger:on_uninstall",
        ]
    );
    assert!(h.registry.get("ledger").await.is_none());
    assert!(h.plugins.get("ledger").is_none());
    assert!(!h.configs.contains("ledger"));
    assert_eq!(h.audit.count(PluginAction::Disable, "ledger").await, 1);
    assert_eq!(h.audit.count(PluginAction::Uninstall, "ledger").await, 1);
}

#[tokio::test]
async fn test_install_failure_leaves_plugin_in_error() {
    let h = TestHarness::new();
    let log = CallLog::new();

    let info = h
        .registry
        .register(TestPlugin::new("ledger", &log).failing("on_install").arc())
        .await
        .unwrap();
    assert_eq!(info.status, PluginStatus::Error);
    assert!(info.error.as_deref().unwrap().contains("on_install refused"));
    assert_eq!(h.plugins.get("ledger").unwrap().status, PluginStatus::Error);

    let errors = h.errors.records_for("ledger").await;
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].operation, "install");

    let err = h.registry.enable("ledger").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Conflict);
    assert_eq!(log.count("ledger:on_enable"), 0);

    // Re-registration is the way out of the error state.
    h.registry.unregister("ledger").await.unwrap();
    h.registry
        .register(TestPlugin::new("ledger", &log).arc())
        .await
        .unwrap();
    h.registry.enable("ledger").await.unwrap();
}

#[tokio::test]
async fn test_enable_failure_keeps_prior_status() {
    let h = TestHarness::new();
    let log = CallLog::new();
    h.registry
        .register(TestPlugin::new("ledger", &log).failing("on_enable").arc())
        .await
        .unwrap();

    let err = h.registry.enable("ledger").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::PluginRuntime);

    let info = h.registry.get_plugin_info("ledger").await.unwrap();
    assert_eq!(info.status, PluginStatus::Installed);
    assert!(info.enabled_at.is_none());
    assert!(info.error.is_some());
    assert_eq!(h.plugins.get("ledger").unwrap().status, PluginStatus::Installed);
    assert_eq!(h.audit.count(PluginAction::Enable, "ledger").await, 0);

    let errors = h.errors.records_for("ledger").await;
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].operation, "enable");
}

#[tokio::test]
async fn test_disable_callback_failure_still_disables() {
    let h = TestHarness::new();
    let log = CallLog::new();
    h.registry
        .register(TestPlugin::new("ledger", &log).failing("on_disable").arc())
        .await
        .unwrap();
    h.registry.enable("ledger").await.unwrap();

    let info = h.registry.disable("ledger").await.unwrap();
    assert_eq!(info.status, PluginStatus::Disabled);
    assert!(info.error.is_some());
    assert_eq!(h.errors.records_for("ledger").await[0].operation, "disable");
}

#[tokio::test]
async fn test_persistence_failure_leaves_memory_unchanged() {
    let failing = Arc::new(AtomicBool::new(false));
    let h = TestHarness::with_failing_store(failing.clone());
    let log = CallLog::new();
    h.registry
        .register(TestPlugin::new("ledger", &log).arc())
        .await
        .unwrap();

    failing.store(true, Ordering::SeqCst);
    let err = h.registry.enable("ledger").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Persistence);
    assert_eq!(h.status("ledger").await, Some(PluginStatus::Installed));
    assert!(!h.registry.is_enabled("ledger").await);
    // on_enable ran, so the registry rolled it back.
    assert_eq!(
        log.entries(),
        vec!["ledger:on_install", "ledger:on_enable", "ledger:on_disable"]
    );

    let err = h
        .registry
        .register(TestPlugin::new("reports", &log).arc())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Persistence);
    assert!(h.registry.get("reports").await.is_none());

    failing.store(false, Ordering::SeqCst);
    h.registry.enable("ledger").await.unwrap();

    failing.store(true, Ordering::SeqCst);
    let err = h.registry.disable("ledger").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Persistence);
    assert!(h.registry.is_enabled("ledger").await);
}

#[tokio::test]
async fn test_failed_unregister_keeps_plugin_and_config() {
    let failing = Arc::new(AtomicBool::new(false));
    let h = TestHarness::with_failing_store(failing.clone());
    let log = CallLog::new();
    h.registry
        .register(TestPlugin::new("ledger", &log).arc())
        .await
        .unwrap();
    h.manager
        .update_plugin_config("ledger", common::obj(serde_json::json!({ "currency": "EUR" })))
        .await
        .unwrap();

    failing.store(true, Ordering::SeqCst);
    let err = h.registry.unregister("ledger").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Persistence);
    assert!(h.registry.get("ledger").await.is_some());
    assert!(h.plugins.get("ledger").is_some());
    assert!(h.configs.contains("ledger"));
    assert_eq!(
        h.manager.get_plugin_config("ledger").await.unwrap()["currency"],
        "EUR"
    );
    assert_eq!(h.audit.count(PluginAction::Uninstall, "ledger").await, 0);

    failing.store(false, Ordering::SeqCst);
    h.registry.unregister("ledger").await.unwrap();
    assert!(h.registry.get("ledger").await.is_none());
    assert!(!h.configs.contains("ledger"));
}

#[tokio::test]
async fn test_failed_disable_restarts_plugin() {
    let failing = Arc::new(AtomicBool::new(false));
    let h = TestHarness::with_failing_store(failing.clone());
    let log = CallLog::new();
    h.registry
        .register(TestPlugin::new("ledger", &log).arc())
        .await
        .unwrap();
    h.registry.enable("ledger").await.unwrap();

    failing.store(true, Ordering::SeqCst);
    let err = h.registry.disable("ledger").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Persistence);
    assert!(h.registry.is_enabled("ledger").await);
    assert_eq!(
        log.entries(),
        vec![
            "ledger:on_install",
            "ledger:on_enable",
            "ledger:on_disable",
            "ledger:on_enable",
        ]
    );
    assert!(h.plugins.get("ledger").unwrap().enabled);
    assert_eq!(h.audit.count(PluginAction::Disable, "ledger").await, 0);
}

#[tokio::test]
async fn test_disable_does_not_cascade_to_dependents() {
    let h = TestHarness::new();
    let log = CallLog::new();
    h.registry
        .register(TestPlugin::new("ledger", &log).arc())
        .await
        .unwrap();
    h.registry.enable("ledger").await.unwrap();
    h.registry
        .register(TestPlugin::new("reports", &log).depends_on("ledger", "*").arc())
        .await
        .unwrap();
    h.registry.enable("reports").await.unwrap();

    assert_eq!(h.registry.dependents_of("ledger").await, vec!["reports"]);
    h.registry.disable("ledger").await.unwrap();

    assert!(h.registry.is_enabled("reports").await);
    assert!(h.registry.dependents_of("ledger").await.contains(&"reports".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_hanging_lifecycle_callback_times_out() {
    let h = TestHarness::with_settings(RegistrySettings {
        hook_timeout: Duration::from_secs(5),
        lifecycle_timeout: Duration::from_secs(10),
    });
    let log = CallLog::new();
    h.registry
        .register(TestPlugin::new("ledger", &log).hanging("on_enable").arc())
        .await
        .unwrap();

    let err = h.registry.enable("ledger").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Timeout);
    assert_eq!(h.status("ledger").await, Some(PluginStatus::Installed));
}

#[tokio::test]
async fn test_concurrent_operations_on_one_name_serialize() {
    let h = TestHarness::new();
    let log = CallLog::new();
    h.registry
        .register(TestPlugin::new("ledger", &log).arc())
        .await
        .unwrap();

    let (a, b) = tokio::join!(h.registry.enable("ledger"), h.registry.enable("ledger"));
    assert!(a.is_ok() && b.is_ok());
    assert_eq!(log.count("ledger:on_enable"), 1);
    assert_eq!(h.audit.count(PluginAction::Enable, "ledger").await, 1);
}
