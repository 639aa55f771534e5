//! Wire types for the Client Portal REST API.
//!
//! The API spells several fields two ways depending on endpoint vintage
//! (`orderType`/`order_type`, `status`/`order_status`, `acct`/`account`,
//! `auxPrice`/`stop_price`); the effective accessors prefer the primary
//! spelling. Prices arrive as either JSON numbers or strings.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Response of `POST /iserver/auth/status`.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthStatusResponse {
    pub authenticated: Option<bool>,
    pub connected: Option<bool>,
    pub competing: Option<bool>,
    /// Failure description when the session is not authenticated.
    pub fail: Option<String>,
    pub message: Option<String>,
}

/// One row of `GET /portfolio/{accountId}/positions/{pageId}`.
#[derive(Debug, Clone, Deserialize)]
pub struct PositionRow {
    pub conid: Option<i64>,
    #[serde(rename = "acctId")]
    pub acct_id: Option<String>,
    #[serde(rename = "contractDesc")]
    pub contract_desc: Option<String>,
    pub position: Option<Decimal>,
    #[serde(rename = "mktPrice")]
    pub mkt_price: Option<Decimal>,
    #[serde(rename = "avgPrice")]
    pub avg_price: Option<Decimal>,
    #[serde(rename = "avgCost")]
    pub avg_cost: Option<Decimal>,
    pub currency: Option<String>,
}

/// Envelope of `GET /iserver/account/orders`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrdersEnvelope {
    pub orders: Option<Vec<OrderRow>>,
}

/// One order row from the orders endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderRow {
    #[serde(rename = "orderId")]
    pub order_id: Option<i64>,
    pub conid: Option<i64>,
    pub acct: Option<String>,
    pub account: Option<String>,
    pub ticker: Option<String>,
    #[serde(rename = "orderType")]
    pub order_type: Option<String>,
    #[serde(rename = "order_type")]
    pub order_type_alt: Option<String>,
    pub side: Option<String>,
    pub price: Option<Decimal>,
    #[serde(rename = "auxPrice")]
    pub aux_price: Option<Decimal>,
    #[serde(rename = "stop_price")]
    pub stop_price: Option<Decimal>,
    #[serde(rename = "orderDesc")]
    pub order_desc: Option<String>,
    #[serde(rename = "totalSize")]
    pub total_size: Option<Decimal>,
    #[serde(rename = "remainingQuantity")]
    pub remaining_quantity: Option<Decimal>,
    pub status: Option<String>,
    #[serde(rename = "order_status")]
    pub status_alt: Option<String>,
}

impl OrderRow {
    pub fn effective_order_type(&self) -> Option<&str> {
        self.order_type.as_deref().or(self.order_type_alt.as_deref())
    }

    pub fn effective_status(&self) -> Option<&str> {
        self.status.as_deref().or(self.status_alt.as_deref())
    }

    /// `acct` is the owning account in current API responses.
    pub fn effective_account(&self) -> Option<&str> {
        self.acct.as_deref().or(self.account.as_deref())
    }

    pub fn effective_stop_price(&self) -> Option<Decimal> {
        self.stop_price.or(self.aux_price)
    }
}

/// Body of `POST /iserver/account`.
#[derive(Debug, Clone, Serialize)]
pub struct SwitchAccountBody {
    #[serde(rename = "acctId")]
    pub acct_id: String,
}

/// Response of `POST /iserver/account`.
#[derive(Debug, Clone, Deserialize)]
pub struct SwitchAccountResponse {
    pub set: Option<bool>,
    #[serde(rename = "acctId")]
    pub acct_id: Option<String>,
}

/// Body of `POST /iserver/account/{accountId}/orders`.
#[derive(Debug, Clone, Serialize)]
pub struct PlaceOrderBody {
    pub orders: Vec<PlaceOrderTicket>,
}

/// A single order ticket.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderTicket {
    pub conid: i64,
    pub order_type: String,
    pub side: String,
    pub quantity: Decimal,
    pub price: Decimal,
    pub tif: String,
}

impl PlaceOrderTicket {
    /// A good-til-cancelled protective stop.
    #[must_use]
    pub fn stop_loss(request: &riskguard_core::StopLossOrderRequest) -> Self {
        Self {
            conid: request.conid,
            order_type: "STP".to_string(),
            side: request.side().to_string(),
            quantity: request.quantity,
            price: request.stop_price,
            tif: "GTC".to_string(),
        }
    }
}

/// Body of `POST /iserver/reply/{replyId}`.
#[derive(Debug, Clone, Serialize)]
pub struct ConfirmBody {
    pub confirmed: bool,
}

/// One entry of the order-place / reply-confirm response array.
///
/// A non-empty `id` together with a non-empty `message` list means the broker
/// is asking for confirmation of a risk warning; `id` is then a reply id, not
/// the final order id.
#[derive(Debug, Clone, Deserialize)]
pub struct PlaceOrderRow {
    pub id: Option<String>,
    #[serde(rename = "order_id")]
    pub order_id: Option<String>,
    #[serde(rename = "order_status")]
    pub order_status: Option<String>,
    pub message: Option<Vec<String>>,
    pub error: Option<String>,
}

impl PlaceOrderRow {
    #[must_use]
    pub fn needs_confirmation(&self) -> bool {
        let has_id = self.id.as_deref().is_some_and(|id| !id.is_empty());
        let has_messages = self.message.as_deref().is_some_and(|m| !m.is_empty());
        has_id && has_messages
    }
}
