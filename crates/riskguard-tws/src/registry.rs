//! Callback registry: the synchronous bridge over the async socket.
//!
//! In-flight requests are futures registered here; the dispatcher resolves
//! them as callbacks arrive. Positions and orders use single-slot fields
//! because at most one fetch of each kind may be outstanding, while market
//! data and order status correlate naturally by id and use maps.

use crate::api::{
    TwsEvent, ERROR_CANNOT_CONNECT, ERROR_DELAYED_DATA_NOTICE, ERROR_NOT_CONNECTED,
    ERROR_UNKNOWN_CONTRACT, LAST_PRICE_TICK_FIELDS,
};
use dashmap::DashMap;
use parking_lot::Mutex;
use riskguard_core::{BrokerError, BrokerResult, Order, OrderResult, Position};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Monotonic request/order id allocator, reseeded by `nextValidId`.
#[derive(Debug)]
pub struct RequestIds {
    counter: AtomicI64,
}

impl RequestIds {
    #[must_use]
    pub fn new() -> Self {
        Self {
            counter: AtomicI64::new(1000),
        }
    }

    /// Allocate the next id.
    pub fn next(&self) -> i64 {
        self.counter.fetch_add(1, Ordering::AcqRel)
    }

    /// Reseed the counter from the broker's `nextValidId`.
    pub fn reset(&self, value: i64) {
        self.counter.store(value, Ordering::Release);
    }
}

impl Default for RequestIds {
    fn default() -> Self {
        Self::new()
    }
}

type PositionsReply = BrokerResult<Vec<Position>>;
type OrdersReply = BrokerResult<Vec<Order>>;

struct PositionsSlot {
    rows: Vec<Position>,
    tx: oneshot::Sender<PositionsReply>,
}

struct OrdersSlot {
    /// Shared with the caller so a timed-out fetch can salvage partial data.
    rows: Arc<Mutex<Vec<Order>>>,
    tx: oneshot::Sender<OrdersReply>,
}

struct MarketDataSlot {
    conid: i64,
    tx: oneshot::Sender<Decimal>,
}

/// Registry of outstanding socket requests.
pub struct CallbackRegistry {
    positions: Mutex<Option<PositionsSlot>>,
    orders: Mutex<Option<OrdersSlot>>,
    market_data: DashMap<i64, MarketDataSlot>,
    order_status: DashMap<i64, oneshot::Sender<OrderResult>>,
    ids: Arc<RequestIds>,
}

impl CallbackRegistry {
    #[must_use]
    pub fn new(ids: Arc<RequestIds>) -> Self {
        Self {
            positions: Mutex::new(None),
            orders: Mutex::new(None),
            market_data: DashMap::new(),
            order_status: DashMap::new(),
            ids,
        }
    }

    /// Register the single outstanding positions fetch.
    pub fn register_positions(&self) -> BrokerResult<oneshot::Receiver<PositionsReply>> {
        let mut slot = self.positions.lock();
        if slot.is_some() {
            return Err(BrokerError::Protocol(
                "a positions fetch is already in flight".to_string(),
            ));
        }
        let (tx, rx) = oneshot::channel();
        *slot = Some(PositionsSlot {
            rows: Vec::new(),
            tx,
        });
        Ok(rx)
    }

    /// Drop the positions registration (timeout path).
    pub fn clear_positions(&self) {
        *self.positions.lock() = None;
    }

    /// Register the single outstanding orders fetch. The returned row buffer
    /// is live: on timeout it holds whatever arrived before the deadline.
    pub fn register_orders(
        &self,
    ) -> BrokerResult<(oneshot::Receiver<OrdersReply>, Arc<Mutex<Vec<Order>>>)> {
        let mut slot = self.orders.lock();
        if slot.is_some() {
            return Err(BrokerError::Protocol(
                "an orders fetch is already in flight".to_string(),
            ));
        }
        let (tx, rx) = oneshot::channel();
        let rows = Arc::new(Mutex::new(Vec::new()));
        *slot = Some(OrdersSlot {
            rows: rows.clone(),
            tx,
        });
        Ok((rx, rows))
    }

    /// Drop the orders registration (timeout path).
    pub fn clear_orders(&self) {
        *self.orders.lock() = None;
    }

    /// Register a market-data price future for a request id.
    pub fn register_market_data(&self, req_id: i64, conid: i64) -> oneshot::Receiver<Decimal> {
        let (tx, rx) = oneshot::channel();
        self.market_data.insert(req_id, MarketDataSlot { conid, tx });
        rx
    }

    pub fn discard_market_data(&self, req_id: i64) {
        self.market_data.remove(&req_id);
    }

    /// Register an order-status future for a caller-assigned order id.
    pub fn register_order_status(&self, order_id: i64) -> oneshot::Receiver<OrderResult> {
        let (tx, rx) = oneshot::channel();
        self.order_status.insert(order_id, tx);
        rx
    }

    pub fn discard_order_status(&self, order_id: i64) {
        self.order_status.remove(&order_id);
    }

    /// Resolve futures from one inbound callback.
    pub fn dispatch(&self, event: TwsEvent) {
        match event {
            TwsEvent::NextValidId { order_id } => {
                info!(order_id, "request-id counter seeded from nextValidId");
                self.ids.reset(order_id);
            }
            TwsEvent::ManagedAccounts { accounts } => {
                debug!(%accounts, "managed accounts reported");
            }
            TwsEvent::Position {
                account,
                conid,
                ticker,
                currency,
                quantity,
                avg_cost,
            } => {
                if let Some(slot) = self.positions.lock().as_mut() {
                    slot.rows.push(Position {
                        account_id: account,
                        conid,
                        ticker,
                        quantity,
                        avg_price: avg_cost,
                        // Enriched via snapshot market data after positionEnd.
                        market_price: Decimal::ZERO,
                        currency,
                    });
                }
            }
            TwsEvent::PositionEnd => {
                if let Some(slot) = self.positions.lock().take() {
                    let _ = slot.tx.send(Ok(slot.rows));
                }
            }
            TwsEvent::OpenOrder {
                order_id,
                account,
                conid,
                ticker,
                order_type,
                side,
                limit_price,
                aux_price,
                total_quantity,
                filled_quantity,
                status,
            } => {
                if let Some(slot) = self.orders.lock().as_mut() {
                    slot.rows.lock().push(Order {
                        order_id: Some(order_id.to_string()),
                        account_id: account.unwrap_or_default(),
                        conid,
                        ticker,
                        order_type,
                        side,
                        price: limit_price,
                        stop_price: aux_price,
                        quantity: Some(total_quantity),
                        remaining_quantity: Some(total_quantity - filled_quantity),
                        status,
                        description: None,
                    });
                }
            }
            TwsEvent::OpenOrderEnd => {
                if let Some(slot) = self.orders.lock().take() {
                    let rows = slot.rows.lock().clone();
                    let _ = slot.tx.send(Ok(rows));
                }
            }
            TwsEvent::OrderStatus { order_id, status } => {
                if let Some((_, tx)) = self.order_status.remove(&order_id) {
                    let success = !status.eq_ignore_ascii_case("Cancelled")
                        && !status.eq_ignore_ascii_case("ApiCancelled");
                    let _ = tx.send(OrderResult {
                        success,
                        order_id: Some(order_id.to_string()),
                        message: format!("Order status: {status}"),
                    });
                }
            }
            TwsEvent::TickPrice {
                req_id,
                field,
                price,
            } => {
                let usable = price > Decimal::ZERO && LAST_PRICE_TICK_FIELDS.contains(&field);
                if !usable {
                    return;
                }
                if let Some((_, slot)) = self.market_data.remove(&req_id) {
                    debug!(req_id, conid = slot.conid, field, %price, "tick price received");
                    let _ = slot.tx.send(price);
                }
            }
            TwsEvent::TickSnapshotEnd { req_id } => {
                // The snapshot ended without a usable price.
                if let Some((_, slot)) = self.market_data.remove(&req_id) {
                    warn!(req_id, conid = slot.conid, "snapshot ended without a price");
                    let _ = slot.tx.send(Decimal::ZERO);
                }
            }
            TwsEvent::Error {
                req_id,
                code,
                message,
            } => self.dispatch_error(req_id, code, &message),
            TwsEvent::ConnectionClosed => {
                warn!("socket connection closed, failing outstanding requests");
                self.fail_fetches("connection closed");
                self.market_data.clear();
                self.order_status.clear();
            }
            TwsEvent::ConnectAck => {}
        }
    }

    fn dispatch_error(&self, req_id: i64, code: i32, message: &str) {
        if code == ERROR_DELAYED_DATA_NOTICE || code == ERROR_UNKNOWN_CONTRACT {
            debug!(req_id, code, message, "benign socket notice");
            return;
        }

        warn!(req_id, code, message, "socket error");

        if code == ERROR_CANNOT_CONNECT || code == ERROR_NOT_CONNECTED {
            self.fail_fetches(&format!("connection error: {message}"));
        }

        // An error tied to a pending market-data request yields price 0.
        if let Some((_, slot)) = self.market_data.remove(&req_id) {
            let _ = slot.tx.send(Decimal::ZERO);
        }

        // An error tied to a pending placement is a business rejection.
        if let Some((_, tx)) = self.order_status.remove(&req_id) {
            let _ = tx.send(OrderResult {
                success: false,
                order_id: None,
                message: format!("Error {code}: {message}"),
            });
        }
    }

    fn fail_fetches(&self, reason: &str) {
        if let Some(slot) = self.positions.lock().take() {
            let _ = slot.tx.send(Err(BrokerError::NotConnected(reason.to_string())));
        }
        if let Some(slot) = self.orders.lock().take() {
            let _ = slot.tx.send(Err(BrokerError::NotConnected(reason.to_string())));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn registry() -> CallbackRegistry {
        CallbackRegistry::new(Arc::new(RequestIds::new()))
    }

    fn position_event(account: &str, conid: i64, quantity: Decimal) -> TwsEvent {
        TwsEvent::Position {
            account: account.to_string(),
            conid,
            ticker: "AAPL".to_string(),
            currency: Some("USD".to_string()),
            quantity,
            avg_cost: dec!(100),
        }
    }

    #[test]
    fn test_request_ids_reseed() {
        let ids = RequestIds::new();
        assert_eq!(ids.next(), 1000);
        assert_eq!(ids.next(), 1001);
        ids.reset(5);
        assert_eq!(ids.next(), 5);
        assert_eq!(ids.next(), 6);
    }

    #[tokio::test]
    async fn test_positions_complete_on_end_marker() {
        let registry = registry();
        let rx = registry.register_positions().unwrap();

        registry.dispatch(position_event("U1", 1, dec!(100)));
        registry.dispatch(position_event("U1", 2, dec!(-5)));
        registry.dispatch(TwsEvent::PositionEnd);

        let rows = rx.await.unwrap().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].conid, 1);
        assert_eq!(rows[0].market_price, Decimal::ZERO);

        // The slot is cleared; a new fetch can register.
        assert!(registry.register_positions().is_ok());
    }

    #[test]
    fn test_second_positions_fetch_is_rejected() {
        let registry = registry();
        let _rx = registry.register_positions().unwrap();
        assert!(matches!(
            registry.register_positions(),
            Err(BrokerError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_tick_price_ignores_non_last_fields_and_zero() {
        let registry = registry();
        let rx = registry.register_market_data(9001, 1);

        // Field 1 (bid) and non-positive prices must not complete the future.
        registry.dispatch(TwsEvent::TickPrice {
            req_id: 9001,
            field: 1,
            price: dec!(10),
        });
        registry.dispatch(TwsEvent::TickPrice {
            req_id: 9001,
            field: 68,
            price: dec!(-1),
        });
        registry.dispatch(TwsEvent::TickPrice {
            req_id: 9001,
            field: 68,
            price: dec!(150.25),
        });

        assert_eq!(rx.await.unwrap(), dec!(150.25));
    }

    #[tokio::test]
    async fn test_snapshot_end_yields_zero() {
        let registry = registry();
        let rx = registry.register_market_data(9001, 1);
        registry.dispatch(TwsEvent::TickSnapshotEnd { req_id: 9001 });
        assert_eq!(rx.await.unwrap(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_order_status_maps_cancellations_to_failure() {
        let registry = registry();

        let rx = registry.register_order_status(7);
        registry.dispatch(TwsEvent::OrderStatus {
            order_id: 7,
            status: "Submitted".to_string(),
        });
        let result = rx.await.unwrap();
        assert!(result.success);
        assert_eq!(result.order_id.as_deref(), Some("7"));

        let rx = registry.register_order_status(8);
        registry.dispatch(TwsEvent::OrderStatus {
            order_id: 8,
            status: "ApiCancelled".to_string(),
        });
        assert!(!rx.await.unwrap().success);
    }

    #[tokio::test]
    async fn test_benign_errors_leave_futures_pending() {
        let registry = registry();
        let mut rx = registry.register_market_data(9001, 1);

        registry.dispatch(TwsEvent::Error {
            req_id: 9001,
            code: ERROR_DELAYED_DATA_NOTICE,
            message: "delayed data in use".to_string(),
        });
        assert!(rx.try_recv().is_err());

        registry.dispatch(TwsEvent::Error {
            req_id: 9001,
            code: 999,
            message: "something else".to_string(),
        });
        assert_eq!(rx.await.unwrap(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_connectivity_error_fails_fetches() {
        let registry = registry();
        let positions_rx = registry.register_positions().unwrap();
        let (orders_rx, _rows) = registry.register_orders().unwrap();

        registry.dispatch(TwsEvent::Error {
            req_id: -1,
            code: ERROR_NOT_CONNECTED,
            message: "Not connected".to_string(),
        });

        assert!(matches!(
            positions_rx.await.unwrap(),
            Err(BrokerError::NotConnected(_))
        ));
        assert!(matches!(
            orders_rx.await.unwrap(),
            Err(BrokerError::NotConnected(_))
        ));
    }

    #[tokio::test]
    async fn test_connection_closed_fails_everything() {
        let registry = registry();
        let positions_rx = registry.register_positions().unwrap();
        let status_rx = registry.register_order_status(7);
        let price_rx = registry.register_market_data(9001, 1);

        registry.dispatch(TwsEvent::ConnectionClosed);

        assert!(matches!(
            positions_rx.await.unwrap(),
            Err(BrokerError::NotConnected(_))
        ));
        // Dropped senders: the awaiting side observes channel closure.
        assert!(status_rx.await.is_err());
        assert!(price_rx.await.is_err());
    }

    #[tokio::test]
    async fn test_open_order_remaining_quantity() {
        let registry = registry();
        let (rx, _rows) = registry.register_orders().unwrap();

        registry.dispatch(TwsEvent::OpenOrder {
            order_id: 11,
            account: Some("U1".to_string()),
            conid: Some(1),
            ticker: Some("AAPL".to_string()),
            order_type: Some("STP".to_string()),
            side: Some("SELL".to_string()),
            limit_price: None,
            aux_price: Some(dec!(120)),
            total_quantity: dec!(100),
            filled_quantity: dec!(40),
            status: Some("Submitted".to_string()),
        });
        registry.dispatch(TwsEvent::OpenOrderEnd);

        let orders = rx.await.unwrap().unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].remaining_quantity, Some(dec!(60)));
        assert_eq!(orders[0].stop_price, Some(dec!(120)));
        assert!(orders[0].is_stop());
    }
}
