//! `BrokerGateway` implementation over the TWS socket.

use crate::api::{StopOrderTicket, TwsEvent, TwsRequest, DELAYED_MARKET_DATA_TYPE};
use crate::registry::{CallbackRegistry, RequestIds};
use crate::transport::TwsTransport;
use async_trait::async_trait;
use futures_util::future::join_all;
use riskguard_core::{
    dedup_by_order_id, BrokerError, BrokerGateway, BrokerResult, ConnectionStatus, Order,
    OrderResult, Position, StopLossOrderRequest,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex as TokioMutex};
use tokio::time::timeout;
use tracing::{info, warn};

/// Timeouts for the socket request kinds.
#[derive(Debug, Clone)]
pub struct SocketConfig {
    pub positions_timeout: Duration,
    /// Orders time out soft: the partial list collected so far is returned,
    /// because the end marker is not guaranteed for empty sets.
    pub orders_timeout: Duration,
    pub place_order_timeout: Duration,
    /// Per-position snapshot price timeout; expiry yields price 0.
    pub market_data_timeout: Duration,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            positions_timeout: Duration::from_secs(30),
            orders_timeout: Duration::from_secs(10),
            place_order_timeout: Duration::from_secs(30),
            market_data_timeout: Duration::from_secs(5),
        }
    }
}

/// Socket-backed broker gateway.
///
/// A background dispatcher consumes decoded callbacks and resolves the
/// futures registered in the [`CallbackRegistry`]. Positions and orders
/// fetches are serialized per kind around the full send-register-await
/// cycle; reconnection is opportunistic on the next call.
pub struct SocketGateway {
    transport: Arc<dyn TwsTransport>,
    registry: Arc<CallbackRegistry>,
    ids: Arc<RequestIds>,
    accounts: Vec<String>,
    config: SocketConfig,
    positions_fetch: TokioMutex<()>,
    orders_fetch: TokioMutex<()>,
}

impl SocketGateway {
    /// Wire the gateway to a transport and its decoded event stream, and
    /// spawn the dispatcher.
    pub fn start(
        transport: Arc<dyn TwsTransport>,
        events: mpsc::Receiver<TwsEvent>,
        accounts: Vec<String>,
        config: SocketConfig,
    ) -> Arc<Self> {
        let ids = Arc::new(RequestIds::new());
        let registry = Arc::new(CallbackRegistry::new(ids.clone()));
        Self::spawn_dispatcher(transport.clone(), registry.clone(), events);

        Arc::new(Self {
            transport,
            registry,
            ids,
            accounts,
            config,
            positions_fetch: TokioMutex::new(()),
            orders_fetch: TokioMutex::new(()),
        })
    }

    fn spawn_dispatcher(
        transport: Arc<dyn TwsTransport>,
        registry: Arc<CallbackRegistry>,
        mut events: mpsc::Receiver<TwsEvent>,
    ) {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if event == TwsEvent::ConnectAck {
                    info!("connect acknowledged");
                    if transport.is_async_connect() {
                        if let Err(e) = transport.send(TwsRequest::StartApi).await {
                            warn!(error = %e, "failed to start API after connect ack");
                        }
                    }
                    continue;
                }
                registry.dispatch(event);
            }
        });
    }

    /// Lazily (re)connect; the handshake reseeds the id counter.
    async fn ensure_connected(&self) -> BrokerResult<()> {
        if self.transport.is_connected() {
            return Ok(());
        }
        self.transport.connect().await?;
        if self.transport.is_connected() {
            Ok(())
        } else {
            Err(BrokerError::NotConnected("not connected to TWS".to_string()))
        }
    }

    async fn fetch_positions(&self, account_filter: Option<&str>) -> BrokerResult<Vec<Position>> {
        self.ensure_connected().await?;
        let _serialize = self.positions_fetch.lock().await;

        let rx = self.registry.register_positions()?;
        if let Err(e) = self.transport.send(TwsRequest::ReqPositions).await {
            self.registry.clear_positions();
            return Err(e);
        }

        let rows = match timeout(self.config.positions_timeout, rx).await {
            Ok(Ok(reply)) => reply?,
            Ok(Err(_closed)) => {
                return Err(BrokerError::NotConnected(
                    "connection lost while awaiting positions".to_string(),
                ))
            }
            Err(_elapsed) => {
                self.registry.clear_positions();
                return Err(BrokerError::Timeout(
                    "timed out waiting for positions".to_string(),
                ));
            }
        };

        let mut positions: Vec<Position> = rows
            .into_iter()
            .filter(|p| !p.is_zero())
            .filter(|p| account_filter.is_none_or(|account| p.account_id == account))
            .collect();

        self.enrich_market_prices(&mut positions).await?;
        Ok(positions)
    }

    /// Fill in market prices via one-shot snapshot requests, one per
    /// position. Snapshots the broker never answers resolve to price 0.
    async fn enrich_market_prices(&self, positions: &mut [Position]) -> BrokerResult<()> {
        if positions.is_empty() {
            return Ok(());
        }

        self.transport
            .send(TwsRequest::ReqMarketDataType {
                data_type: DELAYED_MARKET_DATA_TYPE,
            })
            .await?;

        let mut pending = Vec::with_capacity(positions.len());
        for (index, position) in positions.iter().enumerate() {
            let req_id = self.ids.next();
            let rx = self.registry.register_market_data(req_id, position.conid);
            self.transport
                .send(TwsRequest::market_data_snapshot(req_id, position.conid))
                .await?;
            pending.push((index, position.conid, req_id, rx));
        }

        let prices = join_all(pending.into_iter().map(|(index, conid, req_id, rx)| {
            let registry = &self.registry;
            let deadline = self.config.market_data_timeout;
            async move {
                let price = match timeout(deadline, rx).await {
                    Ok(Ok(price)) => price,
                    Ok(Err(_closed)) => {
                        warn!(conid, "connection lost while awaiting market data");
                        Decimal::ZERO
                    }
                    Err(_elapsed) => {
                        registry.discard_market_data(req_id);
                        warn!(conid, "market data snapshot timed out");
                        Decimal::ZERO
                    }
                };
                (index, price)
            }
        }))
        .await;

        for (index, price) in prices {
            positions[index].market_price = price;
        }
        Ok(())
    }

    async fn fetch_all_orders(&self) -> BrokerResult<Vec<Order>> {
        self.ensure_connected().await?;
        let _serialize = self.orders_fetch.lock().await;

        let (rx, rows) = self.registry.register_orders()?;
        if let Err(e) = self.transport.send(TwsRequest::ReqAllOpenOrders).await {
            self.registry.clear_orders();
            return Err(e);
        }

        match timeout(self.config.orders_timeout, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_closed)) => Err(BrokerError::NotConnected(
                "connection lost while awaiting orders".to_string(),
            )),
            Err(_elapsed) => {
                // The end marker never came; keep reporting available with
                // whatever arrived before the deadline.
                self.registry.clear_orders();
                let partial = rows.lock().clone();
                warn!(
                    collected = partial.len(),
                    "timed out waiting for openOrderEnd, returning partial orders"
                );
                Ok(partial)
            }
        }
    }
}

#[async_trait]
impl BrokerGateway for SocketGateway {
    async fn connection_status(&self) -> ConnectionStatus {
        let connected = self.transport.is_connected();
        ConnectionStatus {
            reachable: connected,
            // A TWS session is authenticated by virtue of being connected.
            authenticated: connected,
            connected,
            competing: false,
            message: if connected {
                "Connected to TWS".to_string()
            } else {
                "Not connected to TWS".to_string()
            },
        }
    }

    async fn keep_alive(&self) -> bool {
        // The socket is a persistent session; no probe exists.
        self.transport.is_connected()
    }

    fn configured_accounts(&self) -> &[String] {
        &self.accounts
    }

    async fn switch_account(&self, _account_id: &str) -> BrokerResult<()> {
        // Requests are account-scoped; only the connection matters.
        self.ensure_connected().await
    }

    async fn positions(&self, account_id: &str) -> BrokerResult<Vec<Position>> {
        self.fetch_positions(Some(account_id)).await
    }

    async fn all_positions(&self) -> BrokerResult<Vec<Position>> {
        self.fetch_positions(None).await
    }

    async fn orders(&self, account_id: &str) -> BrokerResult<Vec<Order>> {
        Ok(self
            .fetch_all_orders()
            .await?
            .into_iter()
            .filter(|o| o.account_id == account_id)
            .collect())
    }

    async fn all_orders(&self) -> BrokerResult<Vec<Order>> {
        self.fetch_all_orders().await
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
        let stop_orders = self
            .fetch_all_orders()
            .await?
            .into_iter()
            .filter(|o| o.is_stop() && o.is_active())
            .collect();
        Ok(dedup_by_order_id(stop_orders))
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
        self.ensure_connected().await?;

        let order_id = self.ids.next();
        let rx = self.registry.register_order_status(order_id);

        let ticket = StopOrderTicket::from_request(request);
        if let Err(e) = self
            .transport
            .send(TwsRequest::PlaceOrder {
                order_id,
                order: ticket,
            })
            .await
        {
            self.registry.discard_order_status(order_id);
            return Err(e);
        }

        match timeout(self.config.place_order_timeout, rx).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(_closed)) => Err(BrokerError::NotConnected(
                "connection lost while awaiting order status".to_string(),
            )),
            Err(_elapsed) => {
                // The broker may still have accepted the order.
                self.registry.discard_order_status(order_id);
                Ok(OrderResult {
                    success: true,
                    order_id: Some(order_id.to_string()),
                    message: "Order submitted (confirmation pending)".to_string(),
                })
            }
        }
    }
}
