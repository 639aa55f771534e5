//! Broker-neutral domain types.
//!
//! Positions and orders are read-only snapshots owned by the gateway for the
//! duration of one fetch; the engine consumes them and emits a fresh report.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order statuses that mark an order as no longer working.
const INACTIVE_STATUSES: [&str; 3] = ["Cancelled", "Filled", "ApiCancelled"];

/// A single portfolio position.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub account_id: String,
    /// Broker-internal contract identifier, unique per instrument.
    pub conid: i64,
    pub ticker: String,
    /// Signed quantity: positive long, negative short, zero closed.
    pub quantity: Decimal,
    pub avg_price: Decimal,
    pub market_price: Decimal,
    pub currency: Option<String>,
}

impl Position {
    #[must_use]
    pub fn is_long(&self) -> bool {
        self.quantity > Decimal::ZERO
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.quantity.is_zero()
    }
}

/// A broker order as reported by either backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    /// Opaque broker order id, stable across refreshes of the same order.
    pub order_id: Option<String>,
    pub account_id: String,
    pub conid: Option<i64>,
    pub ticker: Option<String>,
    /// Free-form order type; stop orders match "STP" or contain "stop".
    pub order_type: Option<String>,
    pub side: Option<String>,
    pub price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub quantity: Option<Decimal>,
    pub remaining_quantity: Option<Decimal>,
    pub status: Option<String>,
    /// Human-readable description, the fallback source for stop prices.
    pub description: Option<String>,
}

impl Order {
    /// Whether this is a stop-typed order.
    #[must_use]
    pub fn is_stop(&self) -> bool {
        match &self.order_type {
            Some(t) => t.eq_ignore_ascii_case("STP") || t.to_lowercase().contains("stop"),
            None => false,
        }
    }

    /// Whether the order is still working at the broker.
    #[must_use]
    pub fn is_active(&self) -> bool {
        match &self.status {
            Some(s) => !INACTIVE_STATUSES.iter().any(|i| s.eq_ignore_ascii_case(i)),
            None => true,
        }
    }
}

/// Connection health of a broker backend.
///
/// `reachable` means the transport is open; `authenticated` that the broker
/// accepted the session; `competing` that another session is active for the
/// same user (informational only).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub reachable: bool,
    pub authenticated: bool,
    pub connected: bool,
    pub competing: bool,
    pub message: String,
}

/// Request to place a protective stop order.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopLossOrderRequest {
    pub account_id: String,
    pub conid: i64,
    pub stop_price: Decimal,
    /// Always positive; the side carries the direction.
    pub quantity: Decimal,
    /// Long positions are protected by a SELL stop, shorts by a BUY stop.
    pub is_long: bool,
}

impl StopLossOrderRequest {
    /// Broker order side for this request.
    #[must_use]
    pub fn side(&self) -> &'static str {
        if self.is_long {
            "SELL"
        } else {
            "BUY"
        }
    }
}

/// Outcome of an order placement.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResult {
    pub success: bool,
    /// Broker-assigned id if known, else the reply id.
    pub order_id: Option<String>,
    pub message: String,
}

/// Outcome of one stop-loss creation attempt for one position.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopLossResult {
    pub account_id: Option<String>,
    pub ticker: Option<String>,
    pub conid: Option<i64>,
    pub stop_price: Option<Decimal>,
    pub quantity: Option<Decimal>,
    pub success: bool,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn order(order_type: Option<&str>, status: Option<&str>) -> Order {
        Order {
            order_id: Some("1".to_string()),
            account_id: "U1".to_string(),
            conid: Some(265598),
            ticker: Some("AAPL".to_string()),
            order_type: order_type.map(str::to_string),
            side: Some("SELL".to_string()),
            price: None,
            stop_price: Some(dec!(100)),
            quantity: Some(dec!(10)),
            remaining_quantity: Some(dec!(10)),
            status: status.map(str::to_string),
            description: None,
        }
    }

    #[test]
    fn test_stop_order_matching() {
        assert!(order(Some("STP"), None).is_stop());
        assert!(order(Some("stp"), None).is_stop());
        assert!(order(Some("Stop Limit"), None).is_stop());
        assert!(order(Some("TRAILING_STOP"), None).is_stop());
        assert!(!order(Some("LMT"), None).is_stop());
        assert!(!order(None, None).is_stop());
    }

    #[test]
    fn test_active_order_matching() {
        assert!(order(Some("STP"), None).is_active());
        assert!(order(Some("STP"), Some("Submitted")).is_active());
        assert!(order(Some("STP"), Some("PreSubmitted")).is_active());
        assert!(!order(Some("STP"), Some("Cancelled")).is_active());
        assert!(!order(Some("STP"), Some("cancelled")).is_active());
        assert!(!order(Some("STP"), Some("Filled")).is_active());
        assert!(!order(Some("STP"), Some("ApiCancelled")).is_active());
    }

    #[test]
    fn test_position_direction() {
        let mut p = Position {
            account_id: "U1".to_string(),
            conid: 1,
            ticker: "AAPL".to_string(),
            quantity: dec!(100),
            avg_price: dec!(10),
            market_price: dec!(12),
            currency: Some("USD".to_string()),
        };
        assert!(p.is_long());
        assert!(!p.is_zero());

        p.quantity = dec!(-5);
        assert!(!p.is_long());

        p.quantity = Decimal::ZERO;
        assert!(p.is_zero());
    }

    #[test]
    fn test_stop_loss_request_side() {
        let mut req = StopLossOrderRequest {
            account_id: "U1".to_string(),
            conid: 1,
            stop_price: dec!(90),
            quantity: dec!(10),
            is_long: true,
        };
        assert_eq!(req.side(), "SELL");
        req.is_long = false;
        assert_eq!(req.side(), "BUY");
    }
}
