//! The exchange price ladder.
//!
//! Odds are only quotable on a fixed tick ladder between 1.01 and 1000,
//! with the tick size widening in bands as the price rises.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Lowest quotable price.
pub const MIN_PRICE: Decimal = dec!(1.01);

/// Highest quotable price.
pub const MAX_PRICE: Decimal = dec!(1000);

/// Tick bands as (inclusive upper bound, tick size).
const BANDS: [(Decimal, Decimal); 10] = [
    (dec!(2), dec!(0.01)),
    (dec!(3), dec!(0.02)),
    (dec!(4), dec!(0.05)),
    (dec!(6), dec!(0.1)),
    (dec!(10), dec!(0.2)),
    (dec!(20), dec!(0.5)),
    (dec!(30), dec!(1)),
    (dec!(50), dec!(2)),
    (dec!(100), dec!(5)),
    (dec!(1000), dec!(10)),
];

/// Tick size at the given price, or `None` outside [1.01, 1000].
#[must_use]
pub fn tick_size(price: Decimal) -> Option<Decimal> {
    if price < MIN_PRICE || price > MAX_PRICE {
        return None;
    }
    BANDS
        .iter()
        .find(|(upper, _)| price <= *upper)
        .map(|(_, tick)| *tick)
}

/// Whether the price sits exactly on the ladder.
#[must_use]
pub fn is_on_tick(price: Decimal) -> bool {
    match tick_size(price) {
        Some(tick) => (price % tick).is_zero(),
        None => false,
    }
}

/// Round a price to the nearest ladder tick, clamping to [1.01, 1000].
#[must_use]
pub fn nearest_tick(price: Decimal) -> Decimal {
    let clamped = price.clamp(MIN_PRICE, MAX_PRICE);
    // clamped is in range, so tick_size always resolves
    let tick = tick_size(clamped).unwrap_or(MIN_PRICE);
    let rounded = (clamped / tick).round() * tick;
    rounded.clamp(MIN_PRICE, MAX_PRICE)
}
