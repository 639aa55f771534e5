//! Typed messages exchanged with the TWS socket client.

use riskguard_core::StopLossOrderRequest;
use rust_decimal::Decimal;

/// Delayed (free-tier) market data, 15 minutes behind.
pub const DELAYED_MARKET_DATA_TYPE: i32 = 3;

/// Tick fields carrying a usable last/close price, including the delayed
/// variants (66–75).
pub const LAST_PRICE_TICK_FIELDS: [i32; 8] = [4, 9, 68, 75, 72, 73, 66, 67];

/// Benign notice that delayed market data is in use.
pub const ERROR_DELAYED_DATA_NOTICE: i32 = 10167;

/// Benign "no security definition found" for an unknown ticker.
pub const ERROR_UNKNOWN_CONTRACT: i32 = 300;

/// Couldn't connect to TWS.
pub const ERROR_CANNOT_CONNECT: i32 = 502;

/// Not connected.
pub const ERROR_NOT_CONNECTED: i32 = 504;

/// Outbound socket requests.
#[derive(Debug, Clone, PartialEq)]
pub enum TwsRequest {
    /// Start the API stream; required after an asynchronous connect ack.
    StartApi,
    /// Request all positions across accounts; answered by a stream of
    /// `Position` events terminated by `PositionEnd`.
    ReqPositions,
    /// Request all working orders; answered by `OpenOrder` events terminated
    /// by `OpenOrderEnd` (the marker is not guaranteed for empty sets).
    ReqAllOpenOrders,
    /// Select the market data tier for subsequent `ReqMktData` calls.
    ReqMarketDataType { data_type: i32 },
    /// One-shot snapshot market data request; the broker auto-cancels the
    /// subscription, no explicit cancel is needed.
    ReqMktData {
        req_id: i64,
        conid: i64,
        exchange: String,
        snapshot: bool,
    },
    /// Place an order under a caller-assigned order id.
    PlaceOrder {
        order_id: i64,
        order: StopOrderTicket,
    },
}

impl TwsRequest {
    /// Snapshot market data routed through SMART.
    #[must_use]
    pub fn market_data_snapshot(req_id: i64, conid: i64) -> Self {
        Self::ReqMktData {
            req_id,
            conid,
            exchange: "SMART".to_string(),
            snapshot: true,
        }
    }

    #[must_use]
    pub fn kind(&self) -> RequestKind {
        match self {
            Self::StartApi => RequestKind::StartApi,
            Self::ReqPositions => RequestKind::Positions,
            Self::ReqAllOpenOrders => RequestKind::OpenOrders,
            Self::ReqMarketDataType { .. } => RequestKind::MarketDataType,
            Self::ReqMktData { .. } => RequestKind::MarketData,
            Self::PlaceOrder { .. } => RequestKind::PlaceOrder,
        }
    }
}

/// Request kind, used to key scripted transport responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    StartApi,
    Positions,
    OpenOrders,
    MarketDataType,
    MarketData,
    PlaceOrder,
}

/// A protective stop order ticket for the socket backend.
#[derive(Debug, Clone, PartialEq)]
pub struct StopOrderTicket {
    pub account_id: String,
    pub conid: i64,
    /// "SELL" closes a long, "BUY" closes a short.
    pub action: String,
    pub stop_price: Decimal,
    pub quantity: Decimal,
    pub time_in_force: String,
}

impl StopOrderTicket {
    #[must_use]
    pub fn from_request(request: &StopLossOrderRequest) -> Self {
        Self {
            account_id: request.account_id.clone(),
            conid: request.conid,
            action: request.side().to_string(),
            stop_price: request.stop_price,
            quantity: request.quantity,
            time_in_force: "GTC".to_string(),
        }
    }
}

/// Inbound socket callbacks.
#[derive(Debug, Clone, PartialEq)]
pub enum TwsEvent {
    /// Handshake acknowledged; on async transports `StartApi` must follow.
    ConnectAck,
    /// Seeds the request-id counter.
    NextValidId { order_id: i64 },
    ManagedAccounts { accounts: String },
    /// One position row. Carries the average cost but no market price; the
    /// gateway enriches prices afterwards via snapshot market data.
    Position {
        account: String,
        conid: i64,
        ticker: String,
        currency: Option<String>,
        quantity: Decimal,
        avg_cost: Decimal,
    },
    PositionEnd,
    /// One working order row.
    OpenOrder {
        order_id: i64,
        account: Option<String>,
        conid: Option<i64>,
        ticker: Option<String>,
        order_type: Option<String>,
        side: Option<String>,
        limit_price: Option<Decimal>,
        aux_price: Option<Decimal>,
        total_quantity: Decimal,
        filled_quantity: Decimal,
        status: Option<String>,
    },
    OpenOrderEnd,
    OrderStatus { order_id: i64, status: String },
    TickPrice {
        req_id: i64,
        field: i32,
        price: Decimal,
    },
    TickSnapshotEnd { req_id: i64 },
    Error {
        req_id: i64,
        code: i32,
        message: String,
    },
    ConnectionClosed,
}
