//! `BrokerGateway` implementation over the Client Portal REST API.

use crate::client::PortalClient;
use crate::dto::{OrderRow, PlaceOrderBody, PlaceOrderTicket, PositionRow};
use async_trait::async_trait;
use riskguard_core::{
    dedup_by_order_id, BrokerGateway, BrokerResult, ConnectionStatus, Order, OrderResult,
    Position, StopLossOrderRequest,
};
use rust_decimal::Decimal;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Default pause after an account switch before the switch is visible.
pub const DEFAULT_SWITCH_DELAY: Duration = Duration::from_millis(200);

/// Default pause between the refresh-triggering orders call and the read.
pub const DEFAULT_REFRESH_DELAY: Duration = Duration::from_millis(300);

/// REST-backed broker gateway.
///
/// Reads follow the portal's stateful protocol: switch account, wait, trigger
/// a server-side orders refresh, wait again, then read. The waits are part of
/// the contract; the server refresh is asynchronous and unobservable, and
/// shorter pauses have produced stale reads.
pub struct RestGateway {
    client: PortalClient,
    accounts: Vec<String>,
    switch_delay: Duration,
    refresh_delay: Duration,
}

impl RestGateway {
    pub fn new(client: PortalClient, accounts: Vec<String>) -> Self {
        Self::with_delays(client, accounts, DEFAULT_SWITCH_DELAY, DEFAULT_REFRESH_DELAY)
    }

    pub fn with_delays(
        client: PortalClient,
        accounts: Vec<String>,
        switch_delay: Duration,
        refresh_delay: Duration,
    ) -> Self {
        Self {
            client,
            accounts,
            switch_delay,
            refresh_delay,
        }
    }
}

#[async_trait]
impl BrokerGateway for RestGateway {
    async fn connection_status(&self) -> ConnectionStatus {
        match self.client.auth_status().await {
            Ok(status) => {
                let authenticated = status.authenticated.unwrap_or(false);
                let message = if authenticated {
                    "Session is authenticated and ready".to_string()
                } else {
                    status
                        .fail
                        .or(status.message)
                        .unwrap_or_else(|| "Not authenticated".to_string())
                };
                ConnectionStatus {
                    reachable: true,
                    authenticated,
                    connected: status.connected.unwrap_or(false),
                    competing: status.competing.unwrap_or(false),
                    message,
                }
            }
            Err(e) => ConnectionStatus {
                reachable: false,
                authenticated: false,
                connected: false,
                competing: false,
                message: format!("Cannot reach gateway: {e}"),
            },
        }
    }

    async fn keep_alive(&self) -> bool {
        match self.client.tickle().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "failed to keep session alive");
                false
            }
        }
    }

    fn configured_accounts(&self) -> &[String] {
        &self.accounts
    }

    async fn switch_account(&self, account_id: &str) -> BrokerResult<()> {
        let response = self.client.switch_account(account_id).await?;
        debug!(account = account_id, set = ?response.set, "switched account");
        sleep(self.switch_delay).await;
        Ok(())
    }

    async fn positions(&self, account_id: &str) -> BrokerResult<Vec<Position>> {
        let rows = self.client.positions(account_id).await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| map_position(row, account_id))
            .filter(|p| !p.is_zero())
            .collect())
    }

    async fn all_positions(&self) -> BrokerResult<Vec<Position>> {
        let mut positions = Vec::new();
        for account_id in &self.accounts {
            positions.extend(self.positions(account_id).await?);
        }
        Ok(positions)
    }

    async fn orders(&self, account_id: &str) -> BrokerResult<Vec<Order>> {
        self.switch_account(account_id).await?;
        self.client.orders(true).await?;
        sleep(self.refresh_delay).await;

        let rows = self.client.orders(false).await?;
        Ok(rows
            .into_iter()
            .map(|row| map_order(row, account_id))
            .collect())
    }

    async fn all_orders(&self) -> BrokerResult<Vec<Order>> {
        let mut orders = Vec::new();
        for account_id in &self.accounts {
            orders.extend(self.orders(account_id).await?);
        }
        Ok(orders)
    }

    async fn stop_orders(&self, account_id: &str) -> BrokerResult<Vec<Order>> {
        Ok(self
            .orders(account_id)
            .await?
            .into_iter()
            .filter(|o| o.is_stop() && o.is_active())
            .collect())
    }

    async fn all_stop_orders(&self) -> BrokerResult<Vec<Order>> {
        let mut stop_orders = Vec::new();
        for account_id in &self.accounts {
            stop_orders.extend(self.stop_orders(account_id).await?);
        }
        let unique = dedup_by_order_id(stop_orders);
        debug!(count = unique.len(), "unique stop orders");
        Ok(unique)
    }

    async fn stop_orders_for_conid(
        &self,
        account_id: &str,
        conid: i64,
    ) -> BrokerResult<Vec<Order>> {
        Ok(self
            .stop_orders(account_id)
            .await?
            .into_iter()
            .filter(|o| o.conid == Some(conid))
            .collect())
    }

    async fn place_stop_loss_order(
        &self,
        request: &StopLossOrderRequest,
    ) -> BrokerResult<OrderResult> {
        let body = PlaceOrderBody {
            orders: vec![PlaceOrderTicket::stop_loss(request)],
        };
        let responses = self.client.place_order(&request.account_id, &body).await?;

        let Some(first) = responses.into_iter().next() else {
            return Ok(OrderResult {
                success: false,
                order_id: None,
                message: "No response from broker".to_string(),
            });
        };

        if let Some(error) = first.error.as_deref().filter(|e| !e.is_empty()) {
            return Ok(OrderResult {
                success: false,
                order_id: first.order_id,
                message: error.to_string(),
            });
        }

        // A reply id plus messages means the broker wants a risk warning
        // confirmed; exactly one confirmation round exists.
        if first.needs_confirmation() {
            let reply_id = first.id.clone().unwrap_or_default();
            info!(
                reply_id = %reply_id,
                messages = ?first.message,
                "confirming broker risk warning"
            );
            self.client.confirm_order(&reply_id).await?;
        }

        // The initial response's id is the reply id; the broker-assigned
        // order id only exists after confirmation.
        Ok(OrderResult {
            success: true,
            order_id: first.id.or(first.order_id),
            message: "Order placed successfully".to_string(),
        })
    }
}

fn map_position(row: PositionRow, account_id: &str) -> Option<Position> {
    let Some(conid) = row.conid else {
        warn!(account = account_id, "position row without conid, skipping");
        return None;
    };
    Some(Position {
        account_id: row.acct_id.unwrap_or_else(|| account_id.to_string()),
        conid,
        ticker: row.contract_desc.unwrap_or_default(),
        quantity: row.position.unwrap_or(Decimal::ZERO),
        avg_price: row.avg_price.or(row.avg_cost).unwrap_or(Decimal::ZERO),
        market_price: row.mkt_price.unwrap_or(Decimal::ZERO),
        currency: row.currency,
    })
}

fn map_order(row: OrderRow, account_id: &str) -> Order {
    let stop_price = row.effective_stop_price();
    let order_type = row.effective_order_type().map(str::to_string);
    let status = row.effective_status().map(str::to_string);
    let account = row
        .effective_account()
        .map_or_else(|| account_id.to_string(), str::to_string);

    Order {
        order_id: row.order_id.map(|id| id.to_string()),
        account_id: account,
        conid: row.conid,
        ticker: row.ticker,
        order_type,
        side: row.side,
        price: row.price,
        stop_price,
        quantity: row.total_size,
        remaining_quantity: row.remaining_quantity,
        status,
        description: row.order_desc,
    }
}
