//! The risk service façade.
//!
//! Exposes the engine operations to the external API layer: overall risk,
//! the unprotected-only view, and the stop-loss creation paths. All broker
//! access goes through the configured [`BrokerGateway`].

use riskguard_core::decimal::round_currency;
use riskguard_core::{
    effective_stop_price, BrokerGateway, Position, RiskReport, StopLossOrderRequest,
    StopLossResult,
};
use riskguard_engine::{calculate_worst_case, new_stop_price};
use riskguard_fx::FxCache;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::error::AppResult;
use riskguard_tws::{SocketConfig, SocketGateway, TwsEvent, TwsTransport};
use tokio::sync::mpsc;

/// Build a service over an embedded TWS socket transport.
///
/// The shipped binary wires the REST backend; deployments that bind a socket
/// codec construct the gateway here and reuse the same façade.
pub fn socket_service(
    transport: Arc<dyn TwsTransport>,
    events: mpsc::Receiver<TwsEvent>,
    config: &AppConfig,
    fx: Arc<FxCache>,
) -> RiskService {
    let gateway = SocketGateway::start(
        transport,
        events,
        config.risk.accounts.clone(),
        SocketConfig::default(),
    );
    RiskService::new(gateway, fx, config.risk.unprotected_loss_percentage)
}

/// Application façade over the gateway and the risk engine.
pub struct RiskService {
    gateway: Arc<dyn BrokerGateway>,
    fx: Arc<FxCache>,
    unprotected_loss_percentage: Decimal,
}

impl RiskService {
    pub fn new(
        gateway: Arc<dyn BrokerGateway>,
        fx: Arc<FxCache>,
        unprotected_loss_percentage: Decimal,
    ) -> Self {
        Self {
            gateway,
            fx,
            unprotected_loss_percentage,
        }
    }

    #[must_use]
    pub fn gateway(&self) -> &Arc<dyn BrokerGateway> {
        &self.gateway
    }

    /// Worst-case report across every configured account.
    pub async fn worst_case_report(&self) -> AppResult<RiskReport> {
        let accounts = self.gateway.configured_accounts().to_vec();
        self.worst_case_for_accounts(&accounts).await
    }

    /// Worst-case report for a specific set of accounts.
    pub async fn worst_case_for_accounts(&self, account_ids: &[String]) -> AppResult<RiskReport> {
        self.fx.refresh_if_stale().await;

        let mut positions = Vec::new();
        for account_id in account_ids {
            positions.extend(self.gateway.positions(account_id).await?);
        }
        let stop_orders = self.gateway.all_stop_orders().await?;

        info!(
            positions = positions.len(),
            stop_orders = stop_orders.len(),
            "calculating worst-case scenario"
        );
        Ok(calculate_worst_case(
            &positions,
            &stop_orders,
            &self.fx,
            self.unprotected_loss_percentage,
        ))
    }

    /// Restrict a report to positions without an actual stop, recomputing the
    /// totals over the remaining rows.
    #[must_use]
    pub fn unprotected_only(report: RiskReport) -> RiskReport {
        let rows: Vec<_> = report
            .position_risks
            .into_iter()
            .filter(|r| !r.has_stop_loss)
            .collect();

        let total_at_risk =
            round_currency(rows.iter().map(|r| r.at_risk_profit_base).sum::<Decimal>());
        let total_value =
            round_currency(rows.iter().map(|r| r.position_value_base).sum::<Decimal>());

        RiskReport {
            total_position_value: total_value,
            worst_case_profit: report.worst_case_profit_without_stop_loss,
            worst_case_profit_with_stop_loss: Decimal::ZERO,
            worst_case_profit_without_stop_loss: report.worst_case_profit_without_stop_loss,
            total_at_risk_profit: total_at_risk,
            currency: report.currency,
            unprotected_loss_percentage_used: report.unprotected_loss_percentage_used,
            position_risks: rows,
        }
    }

    /// Place a protective stop for every unprotected non-zero position of an
    /// account.
    pub async fn create_missing_stop_losses(
        &self,
        account_id: &str,
        loss_percentage: Decimal,
    ) -> AppResult<Vec<StopLossResult>> {
        let positions = self.gateway.positions(account_id).await?;
        let stop_orders = self.gateway.stop_orders(account_id).await?;

        let protected_conids: HashSet<i64> =
            stop_orders.iter().filter_map(|o| o.conid).collect();

        let mut results = Vec::new();
        for position in positions {
            if protected_conids.contains(&position.conid) || position.is_zero() {
                continue;
            }
            results.push(
                self.create_stop_loss_order(account_id, &position, loss_percentage)
                    .await,
            );
        }
        Ok(results)
    }

    /// Place a protective stop for one position identified by conid.
    pub async fn create_stop_loss_for_position(
        &self,
        account_id: &str,
        conid: i64,
        loss_percentage: Decimal,
    ) -> AppResult<StopLossResult> {
        let positions = self.gateway.positions(account_id).await?;
        match positions.into_iter().find(|p| p.conid == conid) {
            Some(position) => Ok(self
                .create_stop_loss_order(account_id, &position, loss_percentage)
                .await),
            None => Ok(StopLossResult {
                account_id: Some(account_id.to_string()),
                ticker: None,
                conid: Some(conid),
                stop_price: None,
                quantity: None,
                success: false,
                message: format!("Position not found for conid: {conid}"),
            }),
        }
    }

    /// Place a protective stop for one position identified by ticker.
    pub async fn create_stop_loss_for_position_by_ticker(
        &self,
        account_id: &str,
        ticker: &str,
        loss_percentage: Decimal,
    ) -> AppResult<StopLossResult> {
        let positions = self.gateway.positions(account_id).await?;
        match positions
            .into_iter()
            .find(|p| p.ticker.eq_ignore_ascii_case(ticker))
        {
            Some(position) => Ok(self
                .create_stop_loss_order(account_id, &position, loss_percentage)
                .await),
            None => Ok(StopLossResult {
                account_id: Some(account_id.to_string()),
                ticker: Some(ticker.to_string()),
                conid: None,
                stop_price: None,
                quantity: None,
                success: false,
                message: format!("Position not found for ticker: {ticker}"),
            }),
        }
    }

    /// Protect a conid in every configured account that holds it.
    pub async fn protect_conid_across_accounts(
        &self,
        conid: i64,
        loss_percentage: Decimal,
    ) -> AppResult<Vec<StopLossResult>> {
        let mut results = Vec::new();
        for account_id in self.gateway.configured_accounts() {
            let positions = self.gateway.positions(account_id).await?;
            if positions.iter().any(|p| p.conid == conid) {
                results.push(
                    self.create_stop_loss_for_position(account_id, conid, loss_percentage)
                        .await?,
                );
            }
        }
        if results.is_empty() {
            results.push(StopLossResult {
                account_id: None,
                ticker: None,
                conid: Some(conid),
                stop_price: None,
                quantity: None,
                success: false,
                message: format!(
                    "Position not found for conid: {conid} in any configured account"
                ),
            });
        }
        Ok(results)
    }

    /// Protect a ticker in every configured account that holds it.
    pub async fn protect_ticker_across_accounts(
        &self,
        ticker: &str,
        loss_percentage: Decimal,
    ) -> AppResult<Vec<StopLossResult>> {
        let mut results = Vec::new();
        for account_id in self.gateway.configured_accounts() {
            let positions = self.gateway.positions(account_id).await?;
            if positions.iter().any(|p| p.ticker.eq_ignore_ascii_case(ticker)) {
                results.push(
                    self.create_stop_loss_for_position_by_ticker(
                        account_id,
                        ticker,
                        loss_percentage,
                    )
                    .await?,
                );
            }
        }
        if results.is_empty() {
            results.push(StopLossResult {
                account_id: None,
                ticker: Some(ticker.to_string()),
                conid: None,
                stop_price: None,
                quantity: None,
                success: false,
                message: format!(
                    "Position not found for ticker: {ticker} in any configured account"
                ),
            });
        }
        Ok(results)
    }

    async fn create_stop_loss_order(
        &self,
        account_id: &str,
        position: &Position,
        loss_percentage: Decimal,
    ) -> StopLossResult {
        if position.is_zero() {
            return StopLossResult {
                account_id: Some(account_id.to_string()),
                ticker: Some(position.ticker.clone()),
                conid: Some(position.conid),
                stop_price: None,
                quantity: Some(Decimal::ZERO),
                success: false,
                message: "Position size is zero".to_string(),
            };
        }

        if let Some(existing) = self.find_existing_stop_loss(account_id, position).await {
            return existing;
        }

        self.place_new_stop_loss(account_id, position, loss_percentage)
            .await
    }

    /// A broken read path must not block placement, so lookup failures only
    /// log.
    async fn find_existing_stop_loss(
        &self,
        account_id: &str,
        position: &Position,
    ) -> Option<StopLossResult> {
        match self
            .gateway
            .stop_orders_for_conid(account_id, position.conid)
            .await
        {
            Ok(existing) => existing.into_iter().next().map(|order| {
                let price = effective_stop_price(&order);
                let price_text = price
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                StopLossResult {
                    account_id: Some(account_id.to_string()),
                    ticker: Some(position.ticker.clone()),
                    conid: Some(position.conid),
                    stop_price: price,
                    quantity: order.remaining_quantity.or(Some(Decimal::ZERO)),
                    success: false,
                    message: format!("Stop loss already exists at price {price_text}"),
                }
            }),
            Err(e) => {
                warn!(error = %e, conid = position.conid, "could not check for existing stop orders");
                None
            }
        }
    }

    async fn place_new_stop_loss(
        &self,
        account_id: &str,
        position: &Position,
        loss_percentage: Decimal,
    ) -> StopLossResult {
        let stop_price = new_stop_price(position, loss_percentage);
        let quantity = position.quantity.abs();

        let request = StopLossOrderRequest {
            account_id: account_id.to_string(),
            conid: position.conid,
            stop_price,
            quantity,
            is_long: position.is_long(),
        };

        match self.gateway.place_stop_loss_order(&request).await {
            Ok(result) => StopLossResult {
                account_id: Some(account_id.to_string()),
                ticker: Some(position.ticker.clone()),
                conid: Some(position.conid),
                stop_price: Some(stop_price),
                quantity: Some(quantity),
                success: result.success,
                message: result.message,
            },
            Err(e) => StopLossResult {
                account_id: Some(account_id.to_string()),
                ticker: Some(position.ticker.clone()),
                conid: Some(position.conid),
                stop_price: None,
                quantity: Some(quantity),
                success: false,
                message: format!("Failed: {e}"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use riskguard_core::{
        BrokerResult, ConnectionStatus, Order, OrderResult, StopLossOrderRequest,
    };
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    struct FakeGateway {
        accounts: Vec<String>,
        positions: Vec<Position>,
        stop_orders: Vec<Order>,
        placed: Mutex<Vec<StopLossOrderRequest>>,
    }

    impl FakeGateway {
        fn new(positions: Vec<Position>, stop_orders: Vec<Order>) -> Self {
            Self {
                accounts: vec!["U1".to_string()],
                positions,
                stop_orders,
                placed: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl BrokerGateway for FakeGateway {
        async fn connection_status(&self) -> ConnectionStatus {
            ConnectionStatus {
                reachable: true,
                authenticated: true,
                connected: true,
                competing: false,
                message: "ok".to_string(),
            }
        }

        async fn keep_alive(&self) -> bool {
            true
        }

        fn configured_accounts(&self) -> &[String] {
            &self.accounts
        }

        async fn switch_account(&self, _account_id: &str) -> BrokerResult<()> {
            Ok(())
        }

        async fn positions(&self, account_id: &str) -> BrokerResult<Vec<Position>> {
            Ok(self
                .positions
                .iter()
                .filter(|p| p.account_id == account_id)
                .cloned()
                .collect())
        }

        async fn all_positions(&self) -> BrokerResult<Vec<Position>> {
            Ok(self.positions.clone())
        }

        async fn orders(&self, _account_id: &str) -> BrokerResult<Vec<Order>> {
            Ok(self.stop_orders.clone())
        }

        async fn all_orders(&self) -> BrokerResult<Vec<Order>> {
            Ok(self.stop_orders.clone())
        }

        async fn stop_orders(&self, _account_id: &str) -> BrokerResult<Vec<Order>> {
            Ok(self.stop_orders.clone())
        }

        async fn all_stop_orders(&self) -> BrokerResult<Vec<Order>> {
            Ok(self.stop_orders.clone())
        }

        async fn stop_orders_for_conid(
            &self,
            _account_id: &str,
            conid: i64,
        ) -> BrokerResult<Vec<Order>> {
            Ok(self
                .stop_orders
                .iter()
                .filter(|o| o.conid == Some(conid))
                .cloned()
                .collect())
        }

        async fn place_stop_loss_order(
            &self,
            request: &StopLossOrderRequest,
        ) -> BrokerResult<OrderResult> {
            self.placed.lock().push(request.clone());
            Ok(OrderResult {
                success: true,
                order_id: Some("reply-1".to_string()),
                message: "Order placed successfully".to_string(),
            })
        }
    }

    fn fx() -> Arc<FxCache> {
        Arc::new(
            FxCache::with_rates("EUR", HashMap::from([("USD".to_string(), dec!(0.9))])).unwrap(),
        )
    }

    fn position(account: &str, conid: i64, quantity: Decimal) -> Position {
        Position {
            account_id: account.to_string(),
            conid,
            ticker: format!("T{conid}"),
            quantity,
            avg_price: dec!(100),
            market_price: dec!(150),
            currency: Some("USD".to_string()),
        }
    }

    fn stop_order(id: &str, conid: i64, stop_price: Decimal) -> Order {
        Order {
            order_id: Some(id.to_string()),
            account_id: "U1".to_string(),
            conid: Some(conid),
            ticker: Some(format!("T{conid}")),
            order_type: Some("STP".to_string()),
            side: Some("SELL".to_string()),
            price: None,
            stop_price: Some(stop_price),
            quantity: Some(dec!(100)),
            remaining_quantity: Some(dec!(100)),
            status: Some("Submitted".to_string()),
            description: None,
        }
    }

    fn service(gateway: FakeGateway) -> (RiskService, Arc<FakeGateway>) {
        let gateway = Arc::new(gateway);
        (
            RiskService::new(gateway.clone(), fx(), dec!(50)),
            gateway,
        )
    }

    #[tokio::test]
    async fn test_worst_case_report_joins_positions_and_stops() {
        let (service, _gateway) = service(FakeGateway::new(
            vec![position("U1", 1, dec!(100)), position("U1", 2, dec!(10))],
            vec![stop_order("o1", 1, dec!(120))],
        ));

        let report = service.worst_case_report().await.unwrap();
        assert_eq!(report.position_risks.len(), 2);
        assert_eq!(report.currency, "EUR");
        assert_eq!(report.unprotected_loss_percentage_used, dec!(50));
        let protected = report.position_risks.iter().find(|r| r.has_stop_loss);
        assert!(protected.is_some());
    }

    #[tokio::test]
    async fn test_unprotected_only_view_recomputes_totals() {
        let (service, _gateway) = service(FakeGateway::new(
            vec![position("U1", 1, dec!(100)), position("U1", 2, dec!(10))],
            vec![stop_order("o1", 1, dec!(120))],
        ));

        let report = service.worst_case_report().await.unwrap();
        let filtered = RiskService::unprotected_only(report.clone());

        assert_eq!(filtered.position_risks.len(), 1);
        assert!(!filtered.position_risks[0].has_stop_loss);
        assert_eq!(filtered.worst_case_profit_with_stop_loss, Decimal::ZERO);
        assert_eq!(
            filtered.worst_case_profit,
            report.worst_case_profit_without_stop_loss
        );
        assert_eq!(
            filtered.total_position_value,
            filtered.position_risks[0].position_value_base
        );
    }

    #[tokio::test]
    async fn test_create_missing_skips_protected_and_zero() {
        let (service, gateway) = service(FakeGateway::new(
            vec![
                position("U1", 1, dec!(100)),
                position("U1", 2, dec!(10)),
                position("U1", 3, Decimal::ZERO),
            ],
            vec![stop_order("o1", 1, dec!(120))],
        ));

        let results = service
            .create_missing_stop_losses("U1", dec!(10))
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert!(results[0].success);
        assert_eq!(results[0].conid, Some(2));
        // 150 * 0.9 = 135.00, rounded down for a long.
        assert_eq!(results[0].stop_price, Some(dec!(135.00)));

        let placed = gateway.placed.lock();
        assert_eq!(placed.len(), 1);
        assert_eq!(placed[0].conid, 2);
        assert!(placed[0].is_long);
    }

    #[tokio::test]
    async fn test_existing_stop_blocks_placement() {
        let (service, gateway) = service(FakeGateway::new(
            vec![position("U1", 1, dec!(100))],
            vec![stop_order("o1", 1, dec!(120))],
        ));

        let result = service
            .create_stop_loss_for_position("U1", 1, dec!(10))
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(
            result.message,
            "Stop loss already exists at price 120"
        );
        assert!(gateway.placed.lock().is_empty());
    }

    #[tokio::test]
    async fn test_position_not_found_results() {
        let (service, _gateway) = service(FakeGateway::new(vec![], vec![]));

        let by_conid = service
            .create_stop_loss_for_position("U1", 99, dec!(10))
            .await
            .unwrap();
        assert!(!by_conid.success);
        assert_eq!(by_conid.message, "Position not found for conid: 99");

        let by_ticker = service
            .create_stop_loss_for_position_by_ticker("U1", "ZZZ", dec!(10))
            .await
            .unwrap();
        assert!(!by_ticker.success);
        assert_eq!(by_ticker.message, "Position not found for ticker: ZZZ");
    }

    #[tokio::test]
    async fn test_zero_position_result() {
        let (service, gateway) = service(FakeGateway::new(
            vec![position("U1", 1, Decimal::ZERO)],
            vec![],
        ));

        let result = service
            .create_stop_loss_for_position("U1", 1, dec!(10))
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.message, "Position size is zero");
        assert!(gateway.placed.lock().is_empty());
    }

    #[tokio::test]
    async fn test_protect_by_ticker_short_position_sides() {
        let (service, gateway) = service(FakeGateway::new(
            vec![position("U1", 1, dec!(-50))],
            vec![],
        ));

        let results = service
            .protect_ticker_across_accounts("t1", dec!(10))
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert!(results[0].success);
        // 150 * 1.1 = 165.00, rounded up for a short.
        assert_eq!(results[0].stop_price, Some(dec!(165.00)));

        let placed = gateway.placed.lock();
        assert_eq!(placed[0].side(), "BUY");
        assert_eq!(placed[0].quantity, dec!(50));
    }

    #[tokio::test]
    async fn test_socket_service_end_to_end() {
        use riskguard_tws::api::RequestKind;
        use riskguard_tws::MockTransport;

        let (transport, events) = MockTransport::new();
        transport.script(
            RequestKind::Positions,
            vec![
                TwsEvent::Position {
                    account: "U1".to_string(),
                    conid: 1,
                    ticker: "AAPL".to_string(),
                    currency: Some("USD".to_string()),
                    quantity: dec!(100),
                    avg_cost: dec!(100),
                },
                TwsEvent::PositionEnd,
            ],
        );
        transport.script(
            RequestKind::MarketData,
            vec![TwsEvent::TickPrice {
                req_id: 0,
                field: 68,
                price: dec!(150),
            }],
        );
        transport.script(
            RequestKind::OpenOrders,
            vec![
                TwsEvent::OpenOrder {
                    order_id: 11,
                    account: Some("U1".to_string()),
                    conid: Some(1),
                    ticker: Some("AAPL".to_string()),
                    order_type: Some("STP".to_string()),
                    side: Some("SELL".to_string()),
                    limit_price: None,
                    aux_price: Some(dec!(120)),
                    total_quantity: dec!(100),
                    filled_quantity: Decimal::ZERO,
                    status: Some("Submitted".to_string()),
                },
                TwsEvent::OpenOrderEnd,
            ],
        );

        let mut config = AppConfig::default();
        config.risk.accounts = vec!["U1".to_string()];
        config.risk.unprotected_loss_percentage = dec!(50);

        let service = socket_service(transport, events, &config, fx());
        let report = service.worst_case_report().await.unwrap();

        assert_eq!(report.position_risks.len(), 1);
        let row = &report.position_risks[0];
        assert!(row.has_stop_loss);
        assert_eq!(row.current_price, dec!(150));
        assert_eq!(row.locked_profit, dec!(2000.00));
        assert_eq!(row.locked_profit_base, dec!(1800.00));
    }

    #[tokio::test]
    async fn test_protect_across_accounts_not_found() {
        let (service, _gateway) = service(FakeGateway::new(vec![], vec![]));

        let results = service
            .protect_conid_across_accounts(42, dec!(10))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert!(!results[0].success);
        assert!(results[0].message.contains("in any configured account"));
    }
}
