//! Price ladders.
//!
//! A ladder maps price to size with a total order on prices, so updates are
//! sparse upserts and a snapshot iterates in price order. Size 0 never
//! appears in a ladder: it is the wire sentinel for removal.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::domain::{Price, Size};

/// Full-depth ladder: price → size.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Ladder {
    levels: BTreeMap<Price, Size>,
}

impl Ladder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one `(price, size)` update: size 0 deletes the level, anything
    /// else upserts it.
    pub fn apply(&mut self, price: Price, size: Size) {
        if size.is_zero() {
            self.levels.remove(&price);
        } else {
            self.levels.insert(price, size);
        }
    }

    /// Size at a price, if the level exists.
    #[must_use]
    pub fn get(&self, price: &Price) -> Option<Size> {
        self.levels.get(price).copied()
    }

    /// Levels in ascending price order.
    pub fn iter(&self) -> impl Iterator<Item = (&Price, &Size)> {
        self.levels.iter()
    }

    /// Lowest price in the ladder.
    #[must_use]
    pub fn min_price(&self) -> Option<Price> {
        self.levels.keys().next().copied()
    }

    /// Highest price in the ladder.
    #[must_use]
    pub fn max_price(&self) -> Option<Price> {
        self.levels.keys().next_back().copied()
    }

    /// Sum of all sizes.
    #[must_use]
    pub fn total_size(&self) -> Size {
        self.levels.values().copied().sum()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// True when no level carries a zero size. Merge keeps this invariant;
    /// the check exists for debug assertions.
    #[must_use]
    pub fn invariant_holds(&self) -> bool {
        self.levels.values().all(|size| !size.is_zero())
    }
}

/// One quote on a best-offer ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LevelQuote {
    pub price: Price,
    pub size: Size,
}

/// Best-n ladder: ladder level (0 = best) → quote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct BestLadder {
    levels: BTreeMap<u32, LevelQuote>,
}

impl BestLadder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one `(level, price, size)` update: size 0 deletes the level,
    /// anything else upserts it.
    pub fn apply(&mut self, level: u32, price: Price, size: Size) {
        if size.is_zero() {
            self.levels.remove(&level);
        } else {
            self.levels.insert(level, LevelQuote { price, size });
        }
    }

    /// Quote at a ladder position.
    #[must_use]
    pub fn get(&self, level: u32) -> Option<LevelQuote> {
        self.levels.get(&level).copied()
    }

    /// The best (level 0) quote.
    #[must_use]
    pub fn best(&self) -> Option<LevelQuote> {
        self.get(0)
    }

    /// Quotes in ladder-position order.
    pub fn iter(&self) -> impl Iterator<Item = (&u32, &LevelQuote)> {
        self.levels.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// True when no level carries a zero size.
    #[must_use]
    pub fn invariant_holds(&self) -> bool {
        self.levels.values().all(|quote| !quote.size.is_zero())
    }
}
