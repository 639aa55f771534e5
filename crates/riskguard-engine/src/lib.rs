//! Deterministic portfolio risk reconciliation.
//!
//! Joins positions with stop orders by `(conid, accountId)`, aggregates
//! partial stops by weighted average, assumes fallback stops for unprotected
//! positions, and produces a [`riskguard_core::RiskReport`]. Pure: no I/O.

mod accumulator;
pub mod engine;
pub mod stops;

pub use engine::calculate_worst_case;
pub use stops::{assumed_stop_price, loss_multiplier, new_stop_price};
