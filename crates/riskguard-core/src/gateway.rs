//! The broker gateway abstraction.
//!
//! Both backends (Client Portal REST and the TWS socket) implement this trait
//! so the risk engine and the application façade stay ignorant of which one
//! is active.

use crate::error::BrokerResult;
use crate::types::{ConnectionStatus, Order, OrderResult, Position, StopLossOrderRequest};
use async_trait::async_trait;
use std::collections::HashSet;

/// Unified broker operations.
///
/// Guarantees:
/// - `connection_status` never fails; problems are reported via its fields.
/// - `positions` excludes zero-quantity rows and populates `market_price`.
/// - `orders` includes all statuses; callers filter.
/// - `stop_orders` returns stop-typed, active orders only, and
///   `all_stop_orders` deduplicates by order id.
/// - `place_stop_loss_order` returns `success = false` for business
///   rejections and errors only on transport or connection loss.
#[async_trait]
pub trait BrokerGateway: Send + Sync {
    async fn connection_status(&self) -> ConnectionStatus;

    /// Returns true iff a liveness probe succeeded within the call.
    async fn keep_alive(&self) -> bool;

    fn configured_accounts(&self) -> &[String];

    /// Select the current account on backends that track one. Idempotent;
    /// a no-op on backends that scope every request by account.
    async fn switch_account(&self, account_id: &str) -> BrokerResult<()>;

    async fn positions(&self, account_id: &str) -> BrokerResult<Vec<Position>>;

    async fn all_positions(&self) -> BrokerResult<Vec<Position>>;

    async fn orders(&self, account_id: &str) -> BrokerResult<Vec<Order>>;

    async fn all_orders(&self) -> BrokerResult<Vec<Order>>;

    async fn stop_orders(&self, account_id: &str) -> BrokerResult<Vec<Order>>;

    async fn all_stop_orders(&self) -> BrokerResult<Vec<Order>>;

    async fn stop_orders_for_conid(
        &self,
        account_id: &str,
        conid: i64,
    ) -> BrokerResult<Vec<Order>>;

    async fn place_stop_loss_order(
        &self,
        request: &StopLossOrderRequest,
    ) -> BrokerResult<OrderResult>;
}

/// Drop orders whose id was already seen, keeping the first occurrence.
///
/// Orders without an id cannot be deduplicated and are dropped; every row a
/// broker returns for a working order carries one.
#[must_use]
pub fn dedup_by_order_id(orders: Vec<Order>) -> Vec<Order> {
    let mut seen = HashSet::new();
    orders
        .into_iter()
        .filter(|order| match &order.order_id {
            Some(id) => seen.insert(id.clone()),
            None => false,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(id: Option<&str>) -> Order {
        Order {
            order_id: id.map(str::to_string),
            account_id: "U1".to_string(),
            conid: Some(1),
            ticker: None,
            order_type: Some("STP".to_string()),
            side: None,
            price: None,
            stop_price: None,
            quantity: None,
            remaining_quantity: None,
            status: None,
            description: None,
        }
    }

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let deduped = dedup_by_order_id(vec![order(Some("a")), order(Some("b")), order(Some("a"))]);
        let ids: Vec<_> = deduped.iter().filter_map(|o| o.order_id.clone()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_dedup_drops_orders_without_id() {
        let deduped = dedup_by_order_id(vec![order(None), order(Some("a"))]);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].order_id.as_deref(), Some("a"));
    }
}
