//! Stop-price arithmetic shared by the report and the protect operations.

use riskguard_core::decimal::{quote_down, quote_up, round_rate};
use riskguard_core::Position;
use rust_decimal::Decimal;

/// Loss percentage as a scale-4 multiplier (e.g. 20 → 0.2000).
#[must_use]
pub fn loss_multiplier(loss_percentage: Decimal) -> Decimal {
    round_rate(loss_percentage / Decimal::ONE_HUNDRED)
}

/// Synthetic stop price for an unprotected position.
///
/// The position is assumed to be exited at a loss equal to the configured
/// percentage of the entry price: `avgPrice × (1 − m)` for longs,
/// `avgPrice × (1 + m)` for shorts.
#[must_use]
pub fn assumed_stop_price(position: &Position, loss_percentage: Decimal) -> Decimal {
    let m = loss_multiplier(loss_percentage);
    if position.is_long() {
        position.avg_price * (Decimal::ONE - m)
    } else {
        position.avg_price * (Decimal::ONE + m)
    }
}

/// Stop price quote for a new protective order, anchored to the market price.
///
/// Longs round down to 2 decimals, shorts round up, so the quoted stop never
/// loosens the requested loss bound.
#[must_use]
pub fn new_stop_price(position: &Position, loss_percentage: Decimal) -> Decimal {
    let m = loss_multiplier(loss_percentage);
    if position.is_long() {
        quote_down(position.market_price * (Decimal::ONE - m))
    } else {
        quote_up(position.market_price * (Decimal::ONE + m))
    }
}
