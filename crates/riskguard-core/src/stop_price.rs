//! Stop-price extraction from heterogeneous order records.
//!
//! Brokers report a stop price in one of three places: the dedicated
//! `stopPrice` field, the generic `price` field, or only inside a free-text
//! description such as `"BUY 10 Stop 1,234.50"`.

use crate::types::Order;
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::OnceLock;
use tracing::warn;

fn stop_price_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)stop\s+([\d,]+\.?\d*)").expect("stop price pattern is valid")
    })
}

/// Extract a stop price from an order's price field or its description.
///
/// Returns `order.price` when present, otherwise the first decimal following
/// the word "stop" in the description (commas stripped). Returns `None` when
/// neither source yields a value.
#[must_use]
pub fn extract(order: &Order) -> Option<Decimal> {
    if let Some(price) = order.price {
        return Some(price);
    }
    order
        .description
        .as_deref()
        .and_then(parse_from_description)
}

/// The effective stop price of an order: `stopPrice`, else `price`, else the
/// description fallback.
#[must_use]
pub fn effective_stop_price(order: &Order) -> Option<Decimal> {
    order.stop_price.or_else(|| extract(order))
}

fn parse_from_description(description: &str) -> Option<Decimal> {
    let captures = stop_price_pattern().captures(description)?;
    let raw = captures.get(1)?.as_str().replace(',', "");
    match Decimal::from_str(&raw) {
        Ok(price) => Some(price),
        Err(_) => {
            warn!(description, "could not parse stop price from order description");
            None
        }
    }
}
