//! Integration tests for the management surface: listing, routes, slots,
//! bulk enable, restore, and shutdown.

mod common;

use std::sync::Arc;

use serde_json::json;

use billhub_core::error::ErrorKind;
use billhub_entity::plugin::PluginStatus;
use billhub_plugin::{PluginDescriptor, SlotRegistry, StaticPluginLoader, names};

use common::{CallLog, HookBehavior, TestHarness, TestPlugin};

async fn seed_catalog(h: &TestHarness, log: &CallLog) {
    let plugins = [
        TestPlugin::new("billing-extras", log).describe("Proration helpers", &["proration"]),
        TestPlugin::new("ledger", log).describe("General ledger export", &["accounting"]),
        TestPlugin::new("reports", log).describe("Revenue reports", &["Accounting", "charts"]),
    ];
    for plugin in plugins {
        h.manager.install(plugin.arc()).await.unwrap();
    }
    h.manager.enable("ledger").await.unwrap();
}

#[tokio::test]
async fn test_list_and_search_plugins() {
    let h = TestHarness::new();
    let log = CallLog::new();
    seed_catalog(&h, &log).await;

    let names: Vec<String> = h
        .manager
        .list_plugins()
        .await
        .into_iter()
        .map(|l| l.metadata.name)
        .collect();
    assert_eq!(names, vec!["billing-extras", "ledger", "reports"]);

    let hits: Vec<String> = h
        .manager
        .search_plugins("ACCOUNTING")
        .await
        .into_iter()
        .map(|l| l.metadata.name)
        .collect();
    assert_eq!(hits, vec!["ledger", "reports"]);

    assert_eq!(h.manager.search_plugins("prorat").await.len(), 1);
    assert_eq!(h.manager.search_plugins("  ").await.len(), 3);
    assert!(h.manager.search_plugins("payroll").await.is_empty());
}

#[tokio::test]
async fn test_plugins_by_status() {
    let h = TestHarness::new();
    let log = CallLog::new();
    seed_catalog(&h, &log).await;

    let enabled = h.manager.get_plugins_by_status(PluginStatus::Enabled).await;
    assert_eq!(enabled.len(), 1);
    assert_eq!(enabled[0].info.name, "ledger");
    assert_eq!(
        h.manager.get_plugins_by_status(PluginStatus::Installed).await.len(),
        2
    );
    assert!(h.manager.get_plugins_by_status(PluginStatus::Error).await.is_empty());
}

#[tokio::test]
async fn test_listing_serializes_for_admin_views() {
    let h = TestHarness::new();
    let log = CallLog::new();
    seed_catalog(&h, &log).await;

    let listing = h.manager.search_plugins("ledger").await.remove(0);
    let value = serde_json::to_value(&listing).unwrap();
    assert_eq!(value["metadata"]["name"], "ledger");
    assert_eq!(value["info"]["status"], "enabled");
}

#[tokio::test]
async fn test_invoke_route() {
    let h = TestHarness::new();
    let log = CallLog::new();
    h.manager
        .install(TestPlugin::new("billing-extras", &log).with_route("/preview").arc())
        .await
        .unwrap();

    let err = h
        .manager
        .invoke_route("billing-extras", "/preview", json!({}))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);

    h.manager.enable("billing-extras").await.unwrap();
    let response = h
        .manager
        .invoke_route("billing-extras", "/preview", json!({ "plan": "pro" }))
        .await
        .unwrap();
    assert_eq!(
        response,
        json!({ "plugin": "billing-extras", "echo": { "plan": "pro" } })
    );

    let err = h
        .manager
        .invoke_route("billing-extras", "/missing", json!({}))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
    let err = h
        .manager
        .invoke_route("ghost", "/preview", json!({}))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[tokio::test]
async fn test_slots_aggregate_enabled_plugins_by_name() {
    let h = TestHarness::new();
    let log = CallLog::new();
    for (name, enable) in [("beta", true), ("alpha", true), ("gamma", false)] {
        h.manager
            .install(
                TestPlugin::new(name, &log)
                    .with_component("invoice.sidebar", &format!("{name}-panel"))
                    .arc(),
            )
            .await
            .unwrap();
        if enable {
            h.manager.enable(name).await.unwrap();
        }
    }

    let slots = SlotRegistry::new(h.registry.clone());
    slots.refresh_slots().await;

    let owners: Vec<String> = slots
        .get_slot_components("invoice.sidebar")
        .await
        .into_iter()
        .map(|c| c.plugin_id)
        .collect();
    assert_eq!(owners, vec!["alpha", "beta"]);
    assert_eq!(slots.slot_ids().await, vec!["invoice.sidebar"]);
    assert!(slots.get_slot_components("dashboard.main").await.is_empty());

    let rendered = slots
        .render_slot("invoice.sidebar", &json!({ "invoice_id": "inv_3" }))
        .await;
    assert_eq!(rendered[0]["component"], "alpha-panel");
    assert_eq!(rendered[0]["props"]["invoice_id"], "inv_3");

    h.manager.disable("alpha").await.unwrap();
    slots.refresh_slots().await;
    assert_eq!(slots.get_slot_components("invoice.sidebar").await.len(), 1);
}

#[tokio::test]
async fn test_enable_all_follows_dependency_order() {
    let h = TestHarness::new();
    let log = CallLog::new();
    h.manager
        .install(TestPlugin::new("ledger", &log).arc())
        .await
        .unwrap();
    h.manager.enable("ledger").await.unwrap();
    h.manager
        .install(TestPlugin::new("reports", &log).depends_on("ledger", "^1").arc())
        .await
        .unwrap();
    h.manager.disable("ledger").await.unwrap();

    let failures = h
        .manager
        .enable_all(&["reports".to_string(), "ledger".to_string(), "ghost".to_string()])
        .await;

    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, "ghost");
    assert!(h.registry.is_enabled("ledger").await);
    assert!(h.registry.is_enabled("reports").await);
}

#[tokio::test]
async fn test_load_and_install_from_static_loader() {
    let h = TestHarness::new();
    let log = CallLog::new();
    let factory_log = log.clone();
    let mut loader = StaticPluginLoader::new()
        .with_factory("notes", move || TestPlugin::new("notes", &factory_log).arc());

    let info = h
        .manager
        .load_and_install(&mut loader, &PluginDescriptor::named("notes"))
        .await
        .unwrap();
    assert_eq!(info.status, PluginStatus::Installed);
    assert_eq!(log.entries(), vec!["notes:on_install"]);

    let err = h
        .manager
        .load_and_install(&mut loader, &PluginDescriptor::named("ghost"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[tokio::test]
async fn test_shutdown_disables_dependents_first() {
    let h = TestHarness::new();
    let log = CallLog::new();
    h.manager
        .install(
            TestPlugin::new("ledger", &log)
                .on_hook(names::SYSTEM_SHUTDOWN, HookBehavior::Record)
                .arc(),
        )
        .await
        .unwrap();
    h.manager.enable("ledger").await.unwrap();
    h.manager
        .install(TestPlugin::new("reports", &log).depends_on("ledger", "*").arc())
        .await
        .unwrap();
    h.manager.enable("reports").await.unwrap();

    h.manager.shutdown().await;

    let tail: Vec<String> = log
        .entries()
        .into_iter()
        .skip_while(|e| e != "ledger:system.shutdown")
        .collect();
    assert_eq!(
        tail,
        vec!["ledger:system.shutdown", "reports:on_disable", "ledger:on_disable"]
    );
    assert_eq!(h.plugins.get("ledger").unwrap().status, PluginStatus::Disabled);
    assert_eq!(h.plugins.get("reports").unwrap().status, PluginStatus::Disabled);
}

#[tokio::test]
async fn test_restore_after_restart() {
    let h = TestHarness::new();
    let log = CallLog::new();
    h.manager.install(TestPlugin::new("ledger", &log).arc()).await.unwrap();
    h.manager.enable("ledger").await.unwrap();
    h.manager
        .install(TestPlugin::new("reports", &log).depends_on("ledger", "*").arc())
        .await
        .unwrap();
    h.manager.enable("reports").await.unwrap();
    h.manager.install(TestPlugin::new("notes", &log).arc()).await.unwrap();
    h.manager.install(TestPlugin::new("legacy", &log).arc()).await.unwrap();
    let ledger_installed_at = h.plugins.get("ledger").unwrap().installed_at;

    let restarted = h.restarted();
    let log = CallLog::new();
    let loaded = vec![
        TestPlugin::new("reports", &log).depends_on("ledger", "*").arc(),
        TestPlugin::new("ledger", &log).arc(),
        TestPlugin::new("notes", &log).arc(),
        TestPlugin::new("newcomer", &log).arc(),
    ];

    let report = restarted.registry.restore(loaded).await.unwrap();

    assert_eq!(report.restored, vec!["reports", "ledger", "notes"]);
    assert_eq!(report.enabled, vec!["ledger", "reports"]);
    assert_eq!(report.installed, vec!["newcomer"]);
    assert_eq!(report.orphaned, vec!["legacy"]);
    assert!(report.failed.is_empty());

    assert_eq!(log.count("ledger:on_install"), 0);
    assert_eq!(log.count("newcomer:on_install"), 1);
    assert_eq!(log.count("reports:on_enable"), 1);
    assert_eq!(restarted.status("notes").await, Some(PluginStatus::Installed));
    assert_eq!(restarted.status("reports").await, Some(PluginStatus::Enabled));
    assert_eq!(
        restarted.registry.get_plugin_info("ledger").await.unwrap().installed_at,
        ledger_installed_at
    );
    assert!(restarted.registry.get("legacy").await.is_none());
    assert!(restarted.plugins.get("legacy").is_some());
}

#[tokio::test]
async fn test_restore_reports_failures_without_aborting() {
    let h = TestHarness::new();
    let log = CallLog::new();
    h.manager.install(TestPlugin::new("ledger", &log).arc()).await.unwrap();
    h.manager.enable("ledger").await.unwrap();

    let restarted = h.restarted();
    let log = CallLog::new();
    let report = restarted
        .registry
        .restore(vec![
            TestPlugin::new("ledger", &log).failing("on_enable").arc(),
            TestPlugin::new("orphan-dep", &log).depends_on("missing", "*").arc(),
        ])
        .await
        .unwrap();

    assert_eq!(report.restored, vec!["ledger"]);
    assert!(report.enabled.is_empty());
    let failed: Vec<&str> = report.failed.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(failed, vec!["ledger", "orphan-dep"]);
    assert_eq!(restarted.status("ledger").await, Some(PluginStatus::Disabled));
}

#[tokio::test]
async fn test_manager_is_shareable_across_tasks() {
    let h = TestHarness::new();
    let log = CallLog::new();
    let manager = Arc::new(h.manager.clone());

    let mut handles = Vec::new();
    for name in ["a-one", "a-two", "a-three"] {
        let manager = manager.clone();
        let plugin = TestPlugin::new(name, &log).arc();
        handles.push(tokio::spawn(async move {
            manager.install(plugin).await.unwrap();
            manager.enable(name).await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(h.manager.get_plugins_by_status(PluginStatus::Enabled).await.len(), 3);
}
