//! Shared domain model for the riskguard workspace.
//!
//! Holds the broker-neutral types (positions, orders, reports), the
//! [`BrokerGateway`] trait both backends implement, exact-decimal rounding
//! helpers, and the stop-price extractor for free-text order descriptions.

pub mod decimal;
pub mod error;
pub mod gateway;
pub mod report;
pub mod stop_price;
pub mod types;

pub use error::{BrokerError, BrokerResult};
pub use gateway::{dedup_by_order_id, BrokerGateway};
pub use report::{PositionRisk, RiskReport};
pub use stop_price::effective_stop_price;
pub use types::{
    ConnectionStatus, Order, OrderResult, Position, StopLossOrderRequest, StopLossResult,
};
