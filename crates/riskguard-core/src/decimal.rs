//! Rounding conventions for monetary math.
//!
//! All prices and quantities are exact decimals. Currency amounts round to
//! scale 2 half-up, rates and percentage multipliers to scale 4 half-up, and
//! stop-price quotes round directionally (down for longs, up for shorts) so
//! the submitted stop never loosens the requested loss bound.

use rust_decimal::{Decimal, RoundingStrategy};

/// Scale for currency amounts.
pub const CURRENCY_SCALE: u32 = 2;

/// Scale for rates and percentage multipliers.
pub const RATE_SCALE: u32 = 4;

/// Scale for FX rate inversion.
pub const FX_RATE_SCALE: u32 = 10;

/// Round a currency amount to scale 2, half-up.
#[inline]
#[must_use]
pub fn round_currency(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(CURRENCY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Round a rate or percentage multiplier to scale 4, half-up.
#[inline]
#[must_use]
pub fn round_rate(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(RATE_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Round a stop-price quote for a long position: scale 2, toward zero.
#[inline]
#[must_use]
pub fn quote_down(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(CURRENCY_SCALE, RoundingStrategy::ToZero)
}

/// Round a stop-price quote for a short position: scale 2, away from zero.
#[inline]
#[must_use]
pub fn quote_up(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(CURRENCY_SCALE, RoundingStrategy::AwayFromZero)
}
