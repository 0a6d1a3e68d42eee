//! Domain identifier types with proper encapsulation.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Market identifier - newtype for type safety.
///
/// The exchange issues market ids of the form `1.<digits>`. Construction is
/// unchecked so wire data always round-trips; [`MarketId::is_well_formed`]
/// reports whether the id matches the exchange's format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarketId(String);

impl MarketId {
    /// Create a new `MarketId` from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the market ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this id matches the exchange's `1.<digits>` format.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        match self.0.strip_prefix("1.") {
            Some(rest) => !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()),
            None => false,
        }
    }
}

impl fmt::Display for MarketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for MarketId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for MarketId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Selection (runner) identifier - newtype over the exchange's integer id.
///
/// Unique within a market; positive for every real selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SelectionId(i64);

impl SelectionId {
    /// Create a new `SelectionId` from an i64 value.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the underlying value.
    #[must_use]
    pub const fn value(&self) -> i64 {
        self.0
    }

    /// Selection ids are positive integers.
    #[must_use]
    pub const fn is_well_formed(&self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for SelectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for SelectionId {
    fn from(id: i64) -> Self {
        Self::new(id)
    }
}

/// Unique identifier for an order on the exchange.
///
/// The inner String is private to ensure all construction goes through
/// the defined constructors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    /// Create a new order ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the order ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Customer strategy reference used to partition matched volumes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerStrategyRef(String);

impl CustomerStrategyRef {
    /// Create a new strategy reference.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the reference as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CustomerStrategyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for CustomerStrategyRef {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for CustomerStrategyRef {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn market_id_new_and_as_str() {
        let id = MarketId::new("1.2345");
        assert_eq!(id.as_str(), "1.2345");
    }

    #[test]
    fn market_id_display() {
        let id = MarketId::new("1.2345");
        assert_eq!(format!("{}", id), "1.2345");
    }

    #[test]
    fn market_id_well_formed() {
        assert!(MarketId::new("1.2345").is_well_formed());
        assert!(MarketId::new("1.0").is_well_formed());
    }

    #[test]
    fn market_id_malformed() {
        assert!(!MarketId::new("2.2345").is_well_formed());
        assert!(!MarketId::new("1.").is_well_formed());
        assert!(!MarketId::new("1.23a").is_well_formed());
        assert!(!MarketId::new("").is_well_formed());
    }

    #[test]
    fn selection_id_value_and_validity() {
        let id = SelectionId::new(47972);
        assert_eq!(id.value(), 47972);
        assert!(id.is_well_formed());
        assert!(!SelectionId::new(0).is_well_formed());
        assert!(!SelectionId::new(-1).is_well_formed());
    }

    #[test]
    fn order_id_from_str() {
        let id = OrderId::from("o-123");
        assert_eq!(id.as_str(), "o-123");
        assert_eq!(format!("{}", id), "o-123");
    }

    #[test]
    fn strategy_ref_round_trip() {
        let r = CustomerStrategyRef::from("strat-a".to_string());
        assert_eq!(r.as_str(), "strat-a");
    }

    #[test]
    fn ids_serialize_transparently() {
        let id = MarketId::new("1.99");
        assert_eq!(serde_json::to_string(&id).unwrap(), r#""1.99""#);

        let sel: SelectionId = serde_json::from_str("47972").unwrap();
        assert_eq!(sel, SelectionId::new(47972));
    }
}
