//! Monetary types for price and size representation.
//!
//! Ladder keys need a total order, so everything monetary is a `Decimal` -
//! never a float.

use rust_decimal::Decimal;

/// Price (odds) represented as a Decimal for precision.
pub type Price = Decimal;

/// Size (stake / volume) represented as a Decimal for precision.
pub type Size = Decimal;
