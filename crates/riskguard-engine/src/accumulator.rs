//! Accumulates per-position risk rows into a report.

use riskguard_core::decimal::{round_currency, round_rate};
use riskguard_core::{Position, PositionRisk, RiskReport};
use riskguard_fx::FxCache;
use rust_decimal::Decimal;

pub(crate) struct RiskAccumulator<'a> {
    fx: &'a FxCache,
    worst_case_with_stop_base: Decimal,
    worst_case_without_stop_base: Decimal,
    rows: Vec<PositionRisk>,
}

impl<'a> RiskAccumulator<'a> {
    pub(crate) fn new(fx: &'a FxCache) -> Self {
        Self {
            fx,
            worst_case_with_stop_base: Decimal::ZERO,
            worst_case_without_stop_base: Decimal::ZERO,
            rows: Vec::new(),
        }
    }

    /// Add one risk row.
    ///
    /// `order_quantity` is always positive: the summed stop quantity for
    /// protected positions, `|quantity|` for unprotected ones.
    pub(crate) fn add_position_risk(
        &mut self,
        position: &Position,
        stop_price: Decimal,
        order_quantity: Decimal,
        ticker: String,
        has_stop_loss: bool,
    ) {
        let (locked_per_share, at_risk_per_share) = per_share_profits(position, stop_price);

        let locked_profit = round_currency(locked_per_share * order_quantity);
        let at_risk_profit = round_currency(at_risk_per_share * order_quantity);
        let position_value = round_currency(position.quantity.abs() * position.market_price);

        let currency = position.currency.as_deref();
        let locked_profit_base = self.fx.convert_to_base(locked_profit, currency);
        let at_risk_profit_base = self.fx.convert_to_base(at_risk_profit, currency);
        let position_value_base = self.fx.convert_to_base(position_value, currency);

        if has_stop_loss {
            self.worst_case_with_stop_base += locked_profit_base;
        } else {
            self.worst_case_without_stop_base += locked_profit_base;
        }

        self.rows.push(PositionRisk {
            account_id: position.account_id.clone(),
            ticker,
            position_size: position.quantity,
            avg_price: position.avg_price,
            current_price: position.market_price,
            stop_price,
            order_quantity,
            locked_profit,
            at_risk_profit,
            position_value,
            currency: position.currency.clone(),
            locked_profit_base,
            at_risk_profit_base,
            position_value_base,
            base_currency: self.fx.base_currency().to_string(),
            has_stop_loss,
            in_profit: in_profit(position),
            portfolio_percentage: Decimal::ZERO,
        });
    }

    pub(crate) fn finalize(self, unprotected_loss_percentage: Decimal) -> RiskReport {
        let mut rows = self.rows;

        let total_position_value =
            round_currency(rows.iter().map(|r| r.position_value_base).sum::<Decimal>());
        let total_at_risk_profit =
            round_currency(rows.iter().map(|r| r.at_risk_profit_base).sum::<Decimal>());

        for row in &mut rows {
            row.portfolio_percentage = if total_position_value > Decimal::ZERO {
                let share = round_rate(row.position_value_base / total_position_value);
                round_currency(share * Decimal::ONE_HUNDRED)
            } else {
                Decimal::ZERO
            };
        }

        // Stable sort: ties keep input order.
        rows.sort_by(|a, b| b.locked_profit.cmp(&a.locked_profit));

        let with_stop = round_currency(self.worst_case_with_stop_base);
        let without_stop = round_currency(self.worst_case_without_stop_base);

        RiskReport {
            total_position_value,
            worst_case_profit: round_currency(with_stop + without_stop),
            worst_case_profit_with_stop_loss: with_stop,
            worst_case_profit_without_stop_loss: without_stop,
            total_at_risk_profit,
            currency: self.fx.base_currency().to_string(),
            unprotected_loss_percentage_used: unprotected_loss_percentage,
            position_risks: rows,
        }
    }
}

/// Per-share locked and at-risk profit, signed by the position direction.
///
/// The at-risk branch flips sign when the position is underwater: the value
/// then measures remaining loss exposure before the stop triggers.
fn per_share_profits(position: &Position, stop_price: Decimal) -> (Decimal, Decimal) {
    if position.is_long() {
        let locked = stop_price - position.avg_price;
        let distance = position.market_price - stop_price;
        let at_risk = if position.market_price > position.avg_price {
            distance
        } else {
            -distance
        };
        (locked, at_risk)
    } else {
        let locked = position.avg_price - stop_price;
        let distance = stop_price - position.market_price;
        let at_risk = if position.market_price < position.avg_price {
            distance
        } else {
            -distance
        };
        (locked, at_risk)
    }
}

fn in_profit(position: &Position) -> bool {
    if position.is_long() {
        position.market_price > position.avg_price
    } else {
        position.market_price < position.avg_price
    }
}
