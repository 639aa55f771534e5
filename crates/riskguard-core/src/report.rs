//! Risk report output types.

use rust_decimal::Decimal;
use serde::Serialize;

/// Risk analysis for a single position.
///
/// `locked_profit` is the P/L realized if the stop triggers at its current
/// price (`stopPrice − avgPrice` per share for longs). `at_risk_profit` is
/// the distance between current price and stop: positive for unrealized gain
/// a tighter stop could capture, negative for loss exposure still open before
/// the stop triggers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionRisk {
    pub account_id: String,
    pub ticker: String,
    /// Signed position size.
    pub position_size: Decimal,
    pub avg_price: Decimal,
    pub current_price: Decimal,
    /// Actual stop price for protected positions, assumed for unprotected.
    pub stop_price: Decimal,
    /// Sum of stop-order quantities for protected positions (may exceed the
    /// position when the broker split the stop), `|quantity|` otherwise.
    pub order_quantity: Decimal,
    pub locked_profit: Decimal,
    pub at_risk_profit: Decimal,
    pub position_value: Decimal,
    pub currency: Option<String>,
    pub locked_profit_base: Decimal,
    pub at_risk_profit_base: Decimal,
    pub position_value_base: Decimal,
    pub base_currency: String,
    /// True iff derived from an actual active stop order.
    pub has_stop_loss: bool,
    pub in_profit: bool,
    /// Share of total portfolio value, 0–100.
    pub portfolio_percentage: Decimal,
}

/// Portfolio-wide risk report, all totals in the base currency.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskReport {
    pub total_position_value: Decimal,
    /// Sum of locked profit across all rows.
    pub worst_case_profit: Decimal,
    pub worst_case_profit_with_stop_loss: Decimal,
    pub worst_case_profit_without_stop_loss: Decimal,
    pub total_at_risk_profit: Decimal,
    pub currency: String,
    pub unprotected_loss_percentage_used: Decimal,
    /// Sorted by `locked_profit` descending.
    pub position_risks: Vec<PositionRisk>,
}
