//! Worst-case scenario calculation.
//!
//! Answers: if every protective stop triggered right now, what profit/loss
//! is already locked in, and how much still rides on the market?

use crate::accumulator::RiskAccumulator;
use crate::stops::assumed_stop_price;
use riskguard_core::decimal::round_currency;
use riskguard_core::{effective_stop_price, Order, Position, RiskReport};
use riskguard_fx::FxCache;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Composite key for position uniqueness across accounts.
type PositionKey = (i64, String);

/// Compute the portfolio risk report from position and stop-order snapshots.
///
/// Positions duplicated on `(conid, accountId)` are merged first-wins in
/// input order. Stop orders protecting the same position are aggregated by
/// quantity-weighted average stop price; positions without any priced stop
/// get an assumed stop at `avgPrice × (1 ± loss%)`.
#[must_use]
pub fn calculate_worst_case(
    positions: &[Position],
    stop_orders: &[Order],
    fx: &FxCache,
    unprotected_loss_percentage: Decimal,
) -> RiskReport {
    let (unique_positions, index) = build_position_index(positions);

    let mut accumulator = RiskAccumulator::new(fx);
    let protected = process_protected_positions(stop_orders, &index, &mut accumulator);
    process_unprotected_positions(
        &unique_positions,
        &protected,
        unprotected_loss_percentage,
        &mut accumulator,
    );

    accumulator.finalize(unprotected_loss_percentage)
}

/// Deduplicate positions first-wins, preserving input order.
fn build_position_index(
    positions: &[Position],
) -> (Vec<&Position>, HashMap<PositionKey, &Position>) {
    let mut ordered = Vec::with_capacity(positions.len());
    let mut index = HashMap::with_capacity(positions.len());

    for position in positions {
        let key = (position.conid, position.account_id.clone());
        if index.contains_key(&key) {
            debug!(
                conid = position.conid,
                account = %position.account_id,
                "duplicate position row merged first-wins"
            );
            continue;
        }
        index.insert(key, position);
        ordered.push(position);
    }
    (ordered, index)
}

/// Emit one row per stop-order group that protects a known position.
///
/// Returns the set of protected position keys. Orders without an effective
/// stop price contribute neither quantity nor weight; a group whose priced
/// quantity sums to zero is not counted as protected.
fn process_protected_positions(
    stop_orders: &[Order],
    index: &HashMap<PositionKey, &Position>,
    accumulator: &mut RiskAccumulator<'_>,
) -> HashSet<PositionKey> {
    let mut protected = HashSet::new();

    for (key, group) in group_stop_orders(stop_orders) {
        let priced: Vec<(&Order, Decimal)> = group
            .iter()
            .filter_map(|order| effective_stop_price(order).map(|price| (*order, price)))
            .collect();
        if priced.is_empty() {
            continue;
        }

        let total_quantity: Decimal = priced.iter().map(|(order, _)| stop_quantity(order)).sum();
        if total_quantity.is_zero() {
            debug!(conid = key.0, account = %key.1, "stop group has zero quantity, skipping");
            continue;
        }

        let Some(position) = index.get(&key) else {
            warn!(conid = key.0, account = %key.1, "stop order without matching position");
            continue;
        };

        let weighted: Decimal = priced
            .iter()
            .map(|(order, price)| *price * stop_quantity(order))
            .sum();
        let avg_stop_price = round_currency(weighted / total_quantity);

        let ticker = group[0]
            .ticker
            .clone()
            .unwrap_or_else(|| position.ticker.clone());

        accumulator.add_position_risk(position, avg_stop_price, total_quantity, ticker, true);
        protected.insert(key);
    }
    protected
}

fn process_unprotected_positions(
    positions: &[&Position],
    protected: &HashSet<PositionKey>,
    unprotected_loss_percentage: Decimal,
    accumulator: &mut RiskAccumulator<'_>,
) {
    for position in positions {
        let key = (position.conid, position.account_id.clone());
        if protected.contains(&key) || position.is_zero() {
            continue;
        }

        let stop_price = assumed_stop_price(position, unprotected_loss_percentage);
        accumulator.add_position_risk(
            position,
            stop_price,
            position.quantity.abs(),
            position.ticker.clone(),
            false,
        );
    }
}

/// Group stop orders by `(conid, accountId)` in first-seen order.
fn group_stop_orders(stop_orders: &[Order]) -> Vec<(PositionKey, Vec<&Order>)> {
    let mut order_of_keys: Vec<PositionKey> = Vec::new();
    let mut groups: HashMap<PositionKey, Vec<&Order>> = HashMap::new();

    for order in stop_orders {
        let Some(conid) = order.conid else {
            continue;
        };
        let key = (conid, order.account_id.clone());
        groups
            .entry(key.clone())
            .or_insert_with(|| {
                order_of_keys.push(key.clone());
                Vec::new()
            })
            .push(order);
    }

    order_of_keys
        .into_iter()
        .map(|key| {
            let group = groups.remove(&key).unwrap_or_default();
            (key, group)
        })
        .collect()
}

/// Absolute quantity a stop order contributes: remaining, else total, else 0.
fn stop_quantity(order: &Order) -> Decimal {
    order
        .remaining_quantity
        .or(order.quantity)
        .unwrap_or(Decimal::ZERO)
        .abs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashMap as StdHashMap;

    fn fx() -> FxCache {
        FxCache::with_rates(
            "EUR",
            StdHashMap::from([("USD".to_string(), dec!(0.9))]),
        )
        .unwrap()
    }

    fn position(
        account: &str,
        conid: i64,
        quantity: Decimal,
        avg: Decimal,
        market: Decimal,
    ) -> Position {
        Position {
            account_id: account.to_string(),
            conid,
            ticker: format!("T{conid}"),
            quantity,
            avg_price: avg,
            market_price: market,
            currency: Some("USD".to_string()),
        }
    }

    fn stop_order(
        id: &str,
        account: &str,
        conid: i64,
        stop_price: Decimal,
        remaining: Decimal,
    ) -> Order {
        Order {
            order_id: Some(id.to_string()),
            account_id: account.to_string(),
            conid: Some(conid),
            ticker: None,
            order_type: Some("STP".to_string()),
            side: Some("SELL".to_string()),
            price: None,
            stop_price: Some(stop_price),
            quantity: Some(remaining),
            remaining_quantity: Some(remaining),
            status: Some("Submitted".to_string()),
            description: None,
        }
    }

    #[test]
    fn test_protected_long_in_profit() {
        // S1: locked 2000 USD = 1800 EUR, at-risk 3000 USD = 2700 EUR.
        let positions = vec![position("A", 1, dec!(100), dec!(100.00), dec!(150.00))];
        let stops = vec![stop_order("o1", "A", 1, dec!(120.00), dec!(100))];

        let report = calculate_worst_case(&positions, &stops, &fx(), dec!(20));
        assert_eq!(report.position_risks.len(), 1);

        let row = &report.position_risks[0];
        assert!(row.has_stop_loss);
        assert!(row.in_profit);
        assert_eq!(row.locked_profit, dec!(2000.00));
        assert_eq!(row.locked_profit_base, dec!(1800.00));
        assert_eq!(row.at_risk_profit, dec!(3000.00));
        assert_eq!(row.at_risk_profit_base, dec!(2700.00));
        assert_eq!(row.position_value, dec!(15000.00));
        assert_eq!(report.worst_case_profit, dec!(1800.00));
        assert_eq!(report.worst_case_profit_with_stop_loss, dec!(1800.00));
        assert_eq!(report.worst_case_profit_without_stop_loss, dec!(0.00));
    }

    #[test]
    fn test_protected_long_stop_below_entry() {
        // S2: the stop locks a loss but the position is in profit overall.
        let positions = vec![position("A", 1, dec!(100), dec!(100), dec!(150))];
        let stops = vec![stop_order("o1", "A", 1, dec!(90), dec!(100))];

        let report = calculate_worst_case(&positions, &stops, &fx(), dec!(20));
        let row = &report.position_risks[0];
        assert_eq!(row.locked_profit, dec!(-1000.00));
        assert_eq!(row.at_risk_profit, dec!(6000.00));
    }

    #[test]
    fn test_underwater_long_without_stop() {
        // S3: assumed stop at 80, at-risk is remaining loss exposure.
        let positions = vec![position("A", 1, dec!(100), dec!(100), dec!(90))];

        let report = calculate_worst_case(&positions, &[], &fx(), dec!(20));
        let row = &report.position_risks[0];
        assert!(!row.has_stop_loss);
        assert!(!row.in_profit);
        assert_eq!(row.stop_price, dec!(80.0000));
        assert_eq!(row.locked_profit, dec!(-2000.00));
        assert_eq!(row.at_risk_profit, dec!(-1000.00));
        assert_eq!(row.order_quantity, dec!(100));
        assert_eq!(report.worst_case_profit_without_stop_loss, dec!(-1800.00));
    }

    #[test]
    fn test_weighted_average_stop() {
        // S4: (110×50 + 120×150) / 200 = 117.50.
        let positions = vec![position("A", 1, dec!(200), dec!(100), dec!(150))];
        let stops = vec![
            stop_order("o1", "A", 1, dec!(110), dec!(50)),
            stop_order("o2", "A", 1, dec!(120), dec!(150)),
        ];

        let report = calculate_worst_case(&positions, &stops, &fx(), dec!(20));
        assert_eq!(report.position_risks.len(), 1);

        let row = &report.position_risks[0];
        assert_eq!(row.stop_price, dec!(117.50));
        assert_eq!(row.order_quantity, dec!(200));
        assert!(row.has_stop_loss);
    }

    #[test]
    fn test_protected_short_position() {
        // S5: short in profit, locked -1000, at-risk +2000.
        let positions = vec![position("A", 1, dec!(-50), dec!(200), dec!(180))];
        let mut stop = stop_order("o1", "A", 1, dec!(220), dec!(50));
        stop.side = Some("BUY".to_string());

        let report = calculate_worst_case(&positions, &[stop], &fx(), dec!(20));
        let row = &report.position_risks[0];
        assert_eq!(row.locked_profit, dec!(-1000.00));
        assert_eq!(row.at_risk_profit, dec!(2000.00));
        assert!(row.in_profit);
    }

    #[test]
    fn test_empty_portfolio() {
        // S6: all totals zero, no rows.
        let report = calculate_worst_case(&[], &[], &fx(), dec!(20));
        assert!(report.position_risks.is_empty());
        assert_eq!(report.total_position_value, dec!(0.00));
        assert_eq!(report.worst_case_profit, dec!(0.00));
        assert_eq!(report.total_at_risk_profit, dec!(0.00));
        assert_eq!(report.currency, "EUR");
    }

    #[test]
    fn test_rows_sorted_by_locked_profit_descending() {
        let positions = vec![
            position("A", 1, dec!(100), dec!(100), dec!(150)),
            position("A", 2, dec!(100), dec!(100), dec!(150)),
            position("A", 3, dec!(100), dec!(100), dec!(150)),
        ];
        let stops = vec![
            stop_order("o1", "A", 1, dec!(90), dec!(100)),
            stop_order("o2", "A", 2, dec!(140), dec!(100)),
            stop_order("o3", "A", 3, dec!(120), dec!(100)),
        ];

        let report = calculate_worst_case(&positions, &stops, &fx(), dec!(20));
        let locked: Vec<Decimal> = report
            .position_risks
            .iter()
            .map(|r| r.locked_profit)
            .collect();
        assert_eq!(locked, vec![dec!(4000.00), dec!(2000.00), dec!(-1000.00)]);
    }

    #[test]
    fn test_worst_case_sum_invariant() {
        let positions = vec![
            position("A", 1, dec!(100), dec!(100), dec!(150)),
            position("A", 2, dec!(100), dec!(100), dec!(90)),
        ];
        let stops = vec![stop_order("o1", "A", 1, dec!(120), dec!(100))];

        let report = calculate_worst_case(&positions, &stops, &fx(), dec!(50));
        assert_eq!(
            report.worst_case_profit,
            report.worst_case_profit_with_stop_loss + report.worst_case_profit_without_stop_loss
        );
    }

    #[test]
    fn test_portfolio_percentages_sum_to_hundred() {
        let positions = vec![
            position("A", 1, dec!(100), dec!(100), dec!(150)),
            position("A", 2, dec!(30), dec!(50), dec!(70)),
            position("B", 3, dec!(-20), dec!(200), dec!(210)),
        ];

        let report = calculate_worst_case(&positions, &[], &fx(), dec!(20));
        let sum: Decimal = report
            .position_risks
            .iter()
            .map(|r| r.portfolio_percentage)
            .sum();
        assert!(sum >= dec!(99.99) && sum <= dec!(100.01), "sum was {sum}");
    }

    #[test]
    fn test_duplicate_positions_merge_first_wins() {
        let positions = vec![
            position("A", 1, dec!(100), dec!(100), dec!(150)),
            position("A", 1, dec!(999), dec!(1), dec!(2)),
        ];

        let report = calculate_worst_case(&positions, &[], &fx(), dec!(20));
        assert_eq!(report.position_risks.len(), 1);
        assert_eq!(report.position_risks[0].position_size, dec!(100));
    }

    #[test]
    fn test_same_conid_different_accounts_are_distinct() {
        let positions = vec![
            position("A", 1, dec!(100), dec!(100), dec!(150)),
            position("B", 1, dec!(50), dec!(100), dec!(150)),
        ];
        let stops = vec![stop_order("o1", "A", 1, dec!(120), dec!(100))];

        let report = calculate_worst_case(&positions, &stops, &fx(), dec!(20));
        assert_eq!(report.position_risks.len(), 2);
        let protected: Vec<bool> = report
            .position_risks
            .iter()
            .map(|r| r.has_stop_loss)
            .collect();
        assert!(protected.contains(&true) && protected.contains(&false));
    }

    #[test]
    fn test_stop_without_matching_position_is_ignored() {
        let positions = vec![position("A", 1, dec!(100), dec!(100), dec!(150))];
        let stops = vec![stop_order("o1", "A", 99, dec!(120), dec!(100))];

        let report = calculate_worst_case(&positions, &stops, &fx(), dec!(20));
        assert_eq!(report.position_risks.len(), 1);
        assert!(!report.position_risks[0].has_stop_loss);
    }

    #[test]
    fn test_unpriced_orders_do_not_weigh_into_average() {
        let positions = vec![position("A", 1, dec!(100), dec!(100), dec!(150))];
        let mut unpriced = stop_order("o1", "A", 1, dec!(0), dec!(40));
        unpriced.stop_price = None;
        let stops = vec![unpriced, stop_order("o2", "A", 1, dec!(120), dec!(60))];

        let report = calculate_worst_case(&positions, &stops, &fx(), dec!(20));
        let row = &report.position_risks[0];
        assert_eq!(row.stop_price, dec!(120.00));
        assert_eq!(row.order_quantity, dec!(60));
    }

    #[test]
    fn test_stop_price_falls_back_to_description() {
        let positions = vec![position("A", 1, dec!(100), dec!(100), dec!(150))];
        let mut order = stop_order("o1", "A", 1, dec!(0), dec!(100));
        order.stop_price = None;
        order.description = Some("SELL 100 Stop 1,250.00".to_string());

        let report = calculate_worst_case(&positions, &[order], &fx(), dec!(20));
        let row = &report.position_risks[0];
        assert!(row.has_stop_loss);
        assert_eq!(row.stop_price, dec!(1250.00));
    }

    #[test]
    fn test_zero_quantity_position_skipped_when_unprotected() {
        let positions = vec![position("A", 1, Decimal::ZERO, dec!(100), dec!(150))];
        let report = calculate_worst_case(&positions, &[], &fx(), dec!(20));
        assert!(report.position_risks.is_empty());
    }

    #[test]
    fn test_locked_profit_base_matches_conversion() {
        let positions = vec![position("A", 1, dec!(7), dec!(10.01), dec!(12.49))];
        let report = calculate_worst_case(&positions, &[], &fx(), dec!(33));
        let row = &report.position_risks[0];
        assert_eq!(
            row.locked_profit_base,
            fx().convert_to_base(row.locked_profit, Some("USD"))
        );
    }
}
