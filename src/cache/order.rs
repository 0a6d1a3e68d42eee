//! Order cache: the account's own orders, merged from the order stream.
//!
//! The stream only ever shows executable and just-completed orders. An
//! order disappears from the cache solely through a full-image reset; the
//! cache never infers disappearance from matched counters.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Serialize;

use super::ladder::Ladder;
use crate::domain::{CustomerStrategyRef, MarketId, OrderId, SelectionId};
use crate::protocol::market::PriceSize;
use crate::protocol::order::{
    OrderAccountChange, OrderChangeMessage, OrderRunnerChange, UnmatchedOrder,
};

/// Matched ladders scoped to one customer strategy reference.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StrategyMatches {
    matched_backs: Ladder,
    matched_lays: Ladder,
}

impl StrategyMatches {
    #[must_use]
    pub const fn matched_backs(&self) -> &Ladder {
        &self.matched_backs
    }

    #[must_use]
    pub const fn matched_lays(&self) -> &Ladder {
        &self.matched_lays
    }
}

/// Cached order state for one runner.
#[derive(Debug, Clone, Serialize)]
pub struct OrderRunnerBook {
    id: SelectionId,
    handicap: Option<Decimal>,
    unmatched: BTreeMap<OrderId, UnmatchedOrder>,
    matched_backs: Ladder,
    matched_lays: Ladder,
    strategy_matches: BTreeMap<CustomerStrategyRef, StrategyMatches>,
}

impl OrderRunnerBook {
    fn new(id: SelectionId) -> Self {
        Self {
            id,
            handicap: None,
            unmatched: BTreeMap::new(),
            matched_backs: Ladder::new(),
            matched_lays: Ladder::new(),
            strategy_matches: BTreeMap::new(),
        }
    }

    #[must_use]
    pub const fn id(&self) -> SelectionId {
        self.id
    }

    #[must_use]
    pub const fn handicap(&self) -> Option<Decimal> {
        self.handicap
    }

    /// Unmatched orders by order id.
    #[must_use]
    pub const fn unmatched(&self) -> &BTreeMap<OrderId, UnmatchedOrder> {
        &self.unmatched
    }

    #[must_use]
    pub fn order(&self, id: &OrderId) -> Option<&UnmatchedOrder> {
        self.unmatched.get(id)
    }

    /// Matched backs ladder, ascending by price.
    #[must_use]
    pub const fn matched_backs(&self) -> &Ladder {
        &self.matched_backs
    }

    /// Matched lays ladder, ascending by price.
    #[must_use]
    pub const fn matched_lays(&self) -> &Ladder {
        &self.matched_lays
    }

    /// Per-strategy matched ladders.
    #[must_use]
    pub const fn strategy_matches(&self) -> &BTreeMap<CustomerStrategyRef, StrategyMatches> {
        &self.strategy_matches
    }

    fn apply_ladder(ladder: &mut Ladder, levels: &[PriceSize]) {
        for level in levels {
            ladder.apply(level.price(), level.size());
        }
    }

    fn apply_change(&mut self, orc: &OrderRunnerChange, deltas: &mut Vec<String>, market_id: &MarketId) {
        if let Some(hc) = orc.hc {
            self.handicap = Some(hc);
        }
        if let Some(orders) = &orc.uo {
            for uo in orders {
                // Each entry is a complete snapshot; upsert by order id.
                deltas.push(format!(
                    "{market_id}/{}: order {} {:?} matched {} remaining {}",
                    self.id,
                    uo.id,
                    uo.status,
                    uo.sm.unwrap_or_default(),
                    uo.sr.unwrap_or_default()
                ));
                self.unmatched.insert(OrderId::new(uo.id.clone()), uo.clone());
            }
        }
        if let Some(levels) = &orc.mb {
            Self::apply_ladder(&mut self.matched_backs, levels);
            deltas.push(format!(
                "{market_id}/{}: matched-back {} levels",
                self.id,
                levels.len()
            ));
        }
        if let Some(levels) = &orc.ml {
            Self::apply_ladder(&mut self.matched_lays, levels);
            deltas.push(format!(
                "{market_id}/{}: matched-lay {} levels",
                self.id,
                levels.len()
            ));
        }
        if let Some(changes) = &orc.smc {
            for (strategy, change) in changes {
                let matches = self
                    .strategy_matches
                    .entry(CustomerStrategyRef::new(strategy.clone()))
                    .or_default();
                if let Some(levels) = &change.mb {
                    Self::apply_ladder(&mut matches.matched_backs, levels);
                }
                if let Some(levels) = &change.ml {
                    Self::apply_ladder(&mut matches.matched_lays, levels);
                }
                deltas.push(format!(
                    "{market_id}/{}: strategy {strategy} matches updated",
                    self.id
                ));
            }
        }
    }
}

/// Cached order state for one market.
#[derive(Debug, Clone, Serialize)]
pub struct OrderMarketBook {
    market_id: MarketId,
    closed: bool,
    runners: BTreeMap<SelectionId, OrderRunnerBook>,
}

impl OrderMarketBook {
    fn new(market_id: MarketId) -> Self {
        Self {
            market_id,
            closed: false,
            runners: BTreeMap::new(),
        }
    }

    #[must_use]
    pub const fn market_id(&self) -> &MarketId {
        &self.market_id
    }

    #[must_use]
    pub const fn closed(&self) -> bool {
        self.closed
    }

    #[must_use]
    pub const fn runners(&self) -> &BTreeMap<SelectionId, OrderRunnerBook> {
        &self.runners
    }

    #[must_use]
    pub fn runner(&self, id: SelectionId) -> Option<&OrderRunnerBook> {
        self.runners.get(&id)
    }

    fn apply_change(&mut self, oc: &OrderAccountChange, deltas: &mut Vec<String>) {
        let market_full_image = oc.full_image == Some(true);
        if market_full_image {
            self.runners.clear();
            deltas.push(format!("{}: order image", self.market_id));
        }
        if let Some(closed) = oc.closed {
            self.closed = closed;
        }
        let Some(changes) = &oc.orc else {
            return;
        };
        for orc in changes {
            let sid = SelectionId::new(orc.id);
            if orc.full_image == Some(true) {
                // Fresh runner; the handicap survives the reset.
                let handicap = self
                    .runners
                    .get(&sid)
                    .and_then(OrderRunnerBook::handicap)
                    .or(orc.hc);
                let mut fresh = OrderRunnerBook::new(sid);
                fresh.handicap = handicap;
                self.runners.insert(sid, fresh);
            }
            let runner = self
                .runners
                .entry(sid)
                .or_insert_with(|| OrderRunnerBook::new(sid));
            runner.apply_change(orc, deltas, &self.market_id);
        }
    }
}

/// The order cache: market id → the account's orders in that market.
#[derive(Debug, Default, Serialize)]
#[serde(transparent)]
pub struct OrderState {
    markets: BTreeMap<MarketId, OrderMarketBook>,
}

impl OrderState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one fully reassembled, non-heartbeat order change message.
    pub fn apply_message(&mut self, msg: &OrderChangeMessage, deltas: &mut Vec<String>) {
        let Some(changes) = &msg.oc else {
            return;
        };
        for oc in changes {
            let market_id = MarketId::new(oc.id.clone());
            let empty_orc = oc.orc.as_ref().map_or(true, Vec::is_empty);
            if oc.full_image == Some(true) && empty_orc {
                // The account holds nothing in this market any more.
                if self.markets.remove(&market_id).is_some() {
                    deltas.push(format!("{market_id}: orders cleared"));
                }
                continue;
            }
            let book = self
                .markets
                .entry(market_id.clone())
                .or_insert_with(|| OrderMarketBook::new(market_id));
            book.apply_change(oc, deltas);
        }
    }

    #[must_use]
    pub fn get(&self, market_id: &MarketId) -> Option<&OrderMarketBook> {
        self.markets.get(market_id)
    }

    #[must_use]
    pub const fn markets(&self) -> &BTreeMap<MarketId, OrderMarketBook> {
        &self.markets
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.markets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.markets.is_empty()
    }

    /// Drop everything. Used on session reset.
    pub fn clear(&mut self) {
        self.markets.clear();
    }
}
