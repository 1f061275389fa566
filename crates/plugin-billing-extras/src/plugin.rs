//! The billing extras plugin: prorates plan changes on hook and on demand.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::debug;

use billhub_plugin::prelude::*;

use crate::proration::{ProrationCalculator, ProrationRequest, ProrationResult};

/// Plugin name used for registration and configuration.
pub const PLUGIN_NAME: &str = "billing-extras";

/// Outward event emitted after a plan change is prorated.
pub const PRORATION_CALCULATED: &str = "proration.calculated";

/// Route returning a proration without emitting anything.
pub const PREVIEW_ROUTE: &str = "/proration/preview";

/// UI slot the preview component is contributed to.
pub const PLAN_CHANGE_SLOT: &str = "subscription.plan_change";

/// `subscription.plan_changed` payload.
#[derive(Debug, Deserialize)]
struct PlanChange {
    subscription_id: String,
    #[serde(flatten)]
    request: ProrationRequest,
}

/// Prorates plan changes for subscriptions.
#[derive(Debug, Default)]
pub struct BillingExtrasPlugin;

impl BillingExtrasPlugin {
    /// Create the plugin.
    pub fn new() -> Self {
        Self
    }

    /// Factory for compiled-in plugin loaders.
    pub fn create() -> Arc<dyn Plugin> {
        Arc::new(Self::new())
    }
}

async fn calculate(ctx: &PluginContext, request: &ProrationRequest) -> AppResult<ProrationResult> {
    let config = ctx.get_plugin_config().await?;
    Ok(ProrationCalculator::from_config(&config).calculate(request)?)
}

struct PlanChangedHandler;

#[async_trait]
impl HookHandler for PlanChangedHandler {
    async fn handle(&self, ctx: &PluginContext, payload: &HookPayload) -> AppResult<()> {
        let change: PlanChange = payload.parse()?;
        let result = calculate(ctx, &change.request).await?;

        ctx.logger().info(&format!(
            "Prorated plan change for subscription {}: net {} cents",
            change.subscription_id, result.net_cents
        ));

        let mut data = serde_json::to_value(&result)?;
        data["subscription_id"] = Value::String(change.subscription_id);
        data["hook_event_id"] = Value::String(payload.id.to_string());
        ctx.emit(PRORATION_CALCULATED, data);
        Ok(())
    }
}

#[async_trait]
impl Plugin for BillingExtrasPlugin {
    fn metadata(&self) -> PluginMetadata {
        plugin_metadata!(
            name: PLUGIN_NAME,
            version: env!("CARGO_PKG_VERSION"),
            description: "Proration of mid-period subscription plan changes",
            author: "BillHub Team",
            keywords: ["billing", "proration", "subscription"]
        )
    }

    fn config_schema(&self) -> Option<ConfigSchema> {
        Some(
            ConfigSchema::new()
                .field(
                    "rounding",
                    ConfigFieldSchema::new(ConfigFieldType::String)
                        .describe("How fractional cents are rounded")
                        .with_default(json!("half_up"))
                        .with_rules(ValidationRules {
                            allowed_values: Some(vec![json!("half_up"), json!("down"), json!("up")]),
                            ..Default::default()
                        }),
                )
                .field(
                    "min_charge_cents",
                    ConfigFieldSchema::new(ConfigFieldType::Integer)
                        .describe("Prorated charges below this amount are waived")
                        .with_default(json!(0))
                        .with_rules(ValidationRules {
                            min: Some(0.0),
                            ..Default::default()
                        }),
                ),
        )
    }

    fn hooks(&self) -> HashMap<String, Arc<dyn HookHandler>> {
        let mut hooks: HashMap<String, Arc<dyn HookHandler>> = HashMap::new();
        hooks.insert(
            names::SUBSCRIPTION_PLAN_CHANGED.to_string(),
            Arc::new(PlanChangedHandler),
        );
        hooks.insert(
            names::INVOICE_CREATED.to_string(),
            ClosureHandler::wrap(|ctx: PluginContext, payload: HookPayload| async move {
                match payload.get_str("id") {
                    Some(id) => ctx.logger().debug(&format!("Invoice {id} created")),
                    None => ctx.logger().warn("invoice.created payload without an id"),
                }
                Ok::<_, AppError>(())
            }),
        );
        hooks
    }

    fn routes(&self) -> HashMap<String, Arc<dyn RouteHandler>> {
        let preview = ClosureRoute::wrap(|ctx: PluginContext, request: Value| async move {
            let request: ProrationRequest = serde_json::from_value(request)?;
            let result = calculate(&ctx, &request).await?;
            Ok::<_, AppError>(serde_json::to_value(result)?)
        });
        HashMap::from([(PREVIEW_ROUTE.to_string(), preview)])
    }

    fn components(&self) -> HashMap<String, Arc<dyn ComponentFactory>> {
        let preview: Arc<dyn ComponentFactory> = Arc::new(StaticComponent::new(
            "proration-preview",
            json!({ "route": PREVIEW_ROUTE, "plugin": PLUGIN_NAME }),
        ));
        HashMap::from([(PLAN_CHANGE_SLOT.to_string(), preview)])
    }

    async fn on_install(&self, ctx: &PluginContext) -> AppResult<()> {
        let settings = ctx.create_settings(Map::new()).await?;
        debug!(plugin_id = PLUGIN_NAME, ?settings, "Billing extras settings initialized");
        Ok(())
    }

    async fn on_enable(&self, ctx: &PluginContext) -> AppResult<()> {
        ctx.logger().info("Billing extras enabled");
        Ok(())
    }

    async fn on_disable(&self, ctx: &PluginContext) -> AppResult<()> {
        ctx.logger().info("Billing extras disabled");
        Ok(())
    }
}
