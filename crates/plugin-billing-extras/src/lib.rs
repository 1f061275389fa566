//! Billing extras plugin for BillHub.
//!
//! Prorates subscription plan changes inside a billing period and
//! broadcasts the result when a `subscription.plan_changed` hook fires.
//! The calculator is usable on its own.

pub mod plugin;
pub mod proration;

pub use plugin::BillingExtrasPlugin;
pub use proration::{ProrationCalculator, ProrationError, ProrationRequest, ProrationResult, RoundingMode};
