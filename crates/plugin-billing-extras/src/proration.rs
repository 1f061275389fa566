//! Mid-period plan change proration.
//!
//! Amounts are integer minor currency units. The period end is exclusive
//! and the change day itself is billed on the new plan.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use billhub_core::error::AppError;

/// Rejected proration inputs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProrationError {
    /// The billing period is empty or reversed.
    #[error("billing period end {end} must be after start {start}")]
    EmptyPeriod { start: NaiveDate, end: NaiveDate },

    /// The change date lies outside `[start, end)`.
    #[error("change date {change} is outside the billing period {start}..{end}")]
    ChangeOutsidePeriod {
        change: NaiveDate,
        start: NaiveDate,
        end: NaiveDate,
    },

    /// A plan price is negative.
    #[error("{field} must not be negative, got {value}")]
    NegativePrice { field: &'static str, value: i64 },

    /// The result does not fit in `i64` cents.
    #[error("prorated amount overflows")]
    Overflow,
}

impl From<ProrationError> for AppError {
    fn from(e: ProrationError) -> Self {
        AppError::validation(format!("Invalid proration request: {e}"))
    }
}

/// How fractional cents are resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundingMode {
    /// Nearest cent, halves rounded up.
    #[default]
    HalfUp,
    /// Toward zero.
    Down,
    /// Away from zero.
    Up,
}

impl RoundingMode {
    /// Parse a configuration value.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "half_up" => Some(Self::HalfUp),
            "down" => Some(Self::Down),
            "up" => Some(Self::Up),
            _ => None,
        }
    }

    /// `numerator / denominator` for non-negative inputs, rounded.
    fn divide(&self, numerator: i128, denominator: i128) -> i128 {
        match self {
            Self::HalfUp => (2 * numerator + denominator) / (2 * denominator),
            Self::Down => numerator / denominator,
            Self::Up => (numerator + denominator - 1) / denominator,
        }
    }
}

/// A plan change inside one billing period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProrationRequest {
    /// Price of the current plan for the full period.
    pub old_price_cents: i64,
    /// Price of the new plan for the full period.
    pub new_price_cents: i64,
    /// First day of the billing period.
    pub period_start: NaiveDate,
    /// Day after the last day of the billing period.
    pub period_end: NaiveDate,
    /// First day billed on the new plan.
    pub change_date: NaiveDate,
}

/// Prorated amounts for a plan change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProrationResult {
    /// Unused portion of the old plan returned to the customer.
    pub credit_cents: i64,
    /// Remaining portion of the new plan charged to the customer.
    pub charge_cents: i64,
    /// `charge_cents - credit_cents`; negative means credit is owed.
    pub net_cents: i64,
    /// Days in the billing period.
    pub total_days: i64,
    /// Days from the change date to the period end.
    pub remaining_days: i64,
    /// `remaining_days / total_days`, for display only.
    pub ratio: f64,
    /// Whether a charge below the minimum was waived.
    pub charge_waived: bool,
}

/// Computes prorated credits and charges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProrationCalculator {
    rounding: RoundingMode,
    min_charge_cents: i64,
}

impl ProrationCalculator {
    /// Calculator with the given rounding and no minimum charge.
    pub fn new(rounding: RoundingMode) -> Self {
        Self {
            rounding,
            min_charge_cents: 0,
        }
    }

    /// Waive charges strictly below `cents`.
    pub fn with_min_charge(mut self, cents: i64) -> Self {
        self.min_charge_cents = cents.max(0);
        self
    }

    /// Calculator configured from the plugin's `rounding` and
    /// `min_charge_cents` settings. Missing or unrecognised values fall
    /// back to the defaults.
    pub fn from_config(config: &Map<String, Value>) -> Self {
        let rounding = config
            .get("rounding")
            .and_then(Value::as_str)
            .and_then(RoundingMode::parse)
            .unwrap_or_default();
        let min_charge = config
            .get("min_charge_cents")
            .and_then(Value::as_i64)
            .unwrap_or(0);
        Self::new(rounding).with_min_charge(min_charge)
    }

    /// The configured rounding mode.
    pub fn rounding(&self) -> RoundingMode {
        self.rounding
    }

    /// Prorate `request`.
    pub fn calculate(&self, request: &ProrationRequest) -> Result<ProrationResult, ProrationError> {
        let ProrationRequest {
            old_price_cents,
            new_price_cents,
            period_start,
            period_end,
            change_date,
        } = *request;

        if period_end <= period_start {
            return Err(ProrationError::EmptyPeriod {
                start: period_start,
                end: period_end,
            });
        }
        if change_date < period_start || change_date >= period_end {
            return Err(ProrationError::ChangeOutsidePeriod {
                change: change_date,
                start: period_start,
                end: period_end,
            });
        }
        if old_price_cents < 0 {
            return Err(ProrationError::NegativePrice {
                field: "old_price_cents",
                value: old_price_cents,
            });
        }
        if new_price_cents < 0 {
            return Err(ProrationError::NegativePrice {
                field: "new_price_cents",
                value: new_price_cents,
            });
        }

        let total_days = (period_end - period_start).num_days();
        let remaining_days = (period_end - change_date).num_days();

        let credit_cents = self.prorate(old_price_cents, remaining_days, total_days)?;
        let mut charge_cents = self.prorate(new_price_cents, remaining_days, total_days)?;
        let charge_waived = charge_cents > 0 && charge_cents < self.min_charge_cents;
        if charge_waived {
            charge_cents = 0;
        }

        Ok(ProrationResult {
            credit_cents,
            charge_cents,
            net_cents: charge_cents - credit_cents,
            total_days,
            remaining_days,
            ratio: remaining_days as f64 / total_days as f64,
            charge_waived,
        })
    }

    fn prorate(&self, price: i64, remaining: i64, total: i64) -> Result<i64, ProrationError> {
        let scaled = self
            .rounding
            .divide(i128::from(price) * i128::from(remaining), i128::from(total));
        i64::try_from(scaled).map_err(|_| ProrationError::Overflow)
    }
}
