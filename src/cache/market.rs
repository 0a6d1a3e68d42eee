//! Market cache: image and delta merge.
//!
//! One [`MarketBook`] per market id, replaced wholesale on an image frame
//! and patched in place by deltas. Every apply appends human-readable
//! delta strings to the caller's list; the decoder hands that list to the
//! market-change callback and clears it afterwards.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

use super::ladder::{BestLadder, Ladder};
use crate::domain::{MarketId, SelectionId};
use crate::protocol::market::{
    MarketChange, MarketChangeMessage, MarketDefinition, MarketStatus, PriceSize, RunnerChange,
    RunnerStatus,
};

/// Scale a volume-like value by the configured currency rate.
///
/// Rate 1 must leave values bit-identical, so the multiplication is skipped
/// entirely in that case.
fn scale(value: Decimal, rate: Decimal) -> Decimal {
    if rate == Decimal::ONE {
        value
    } else {
        value * rate
    }
}

/// Cached state for one runner within a market.
#[derive(Debug, Clone, Serialize)]
pub struct RunnerBook {
    id: SelectionId,
    status: RunnerStatus,
    last_traded: Option<Decimal>,
    total_matched: Decimal,
    sp_near: Option<Decimal>,
    sp_far: Option<Decimal>,
    adjustment_factor: Option<Decimal>,
    available_to_back: Ladder,
    available_to_lay: Ladder,
    sp_back: Ladder,
    sp_lay: Ladder,
    traded: Ladder,
    best_to_back: BestLadder,
    best_to_lay: BestLadder,
    best_display_to_back: BestLadder,
    best_display_to_lay: BestLadder,
}

impl RunnerBook {
    fn new(id: SelectionId) -> Self {
        Self {
            id,
            status: RunnerStatus::Active,
            last_traded: None,
            total_matched: Decimal::ZERO,
            sp_near: None,
            sp_far: None,
            adjustment_factor: None,
            available_to_back: Ladder::new(),
            available_to_lay: Ladder::new(),
            sp_back: Ladder::new(),
            sp_lay: Ladder::new(),
            traded: Ladder::new(),
            best_to_back: BestLadder::new(),
            best_to_lay: BestLadder::new(),
            best_display_to_back: BestLadder::new(),
            best_display_to_lay: BestLadder::new(),
        }
    }

    #[must_use]
    pub const fn id(&self) -> SelectionId {
        self.id
    }

    #[must_use]
    pub const fn status(&self) -> RunnerStatus {
        self.status
    }

    #[must_use]
    pub const fn last_traded(&self) -> Option<Decimal> {
        self.last_traded
    }

    #[must_use]
    pub const fn total_matched(&self) -> Decimal {
        self.total_matched
    }

    #[must_use]
    pub const fn sp_near(&self) -> Option<Decimal> {
        self.sp_near
    }

    #[must_use]
    pub const fn sp_far(&self) -> Option<Decimal> {
        self.sp_far
    }

    #[must_use]
    pub const fn adjustment_factor(&self) -> Option<Decimal> {
        self.adjustment_factor
    }

    #[must_use]
    pub const fn available_to_back(&self) -> &Ladder {
        &self.available_to_back
    }

    #[must_use]
    pub const fn available_to_lay(&self) -> &Ladder {
        &self.available_to_lay
    }

    #[must_use]
    pub const fn sp_back(&self) -> &Ladder {
        &self.sp_back
    }

    #[must_use]
    pub const fn sp_lay(&self) -> &Ladder {
        &self.sp_lay
    }

    #[must_use]
    pub const fn traded(&self) -> &Ladder {
        &self.traded
    }

    #[must_use]
    pub const fn best_to_back(&self) -> &BestLadder {
        &self.best_to_back
    }

    #[must_use]
    pub const fn best_to_lay(&self) -> &BestLadder {
        &self.best_to_lay
    }

    #[must_use]
    pub const fn best_display_to_back(&self) -> &BestLadder {
        &self.best_display_to_back
    }

    #[must_use]
    pub const fn best_display_to_lay(&self) -> &BestLadder {
        &self.best_display_to_lay
    }

    fn apply_levels(ladder: &mut Ladder, levels: &[PriceSize], rate: Decimal) {
        for level in levels {
            ladder.apply(level.price(), scale(level.size(), rate));
        }
    }

    fn apply_change(
        &mut self,
        market_id: &MarketId,
        rc: &RunnerChange,
        rate: Decimal,
        deltas: &mut Vec<String>,
    ) {
        let sid = self.id;

        if let Some(ltp) = rc.ltp {
            if self.last_traded != Some(ltp) {
                deltas.push(format!("{market_id}/{sid}: last traded {ltp}"));
            }
            self.last_traded = Some(ltp);
        }
        if let Some(spn) = rc.spn {
            if self.sp_near != Some(spn) {
                deltas.push(format!("{market_id}/{sid}: bsp near {spn}"));
            }
            self.sp_near = Some(spn);
        }
        if let Some(spf) = rc.spf {
            if self.sp_far != Some(spf) {
                deltas.push(format!("{market_id}/{sid}: bsp far {spf}"));
            }
            self.sp_far = Some(spf);
        }
        if let Some(tv) = rc.tv {
            // A zero runner volume after trading has occurred is the
            // matcher zeroing counters at settlement; the last real value
            // is kept.
            if tv.is_zero() && !self.total_matched.is_zero() {
                debug!(market = %market_id, selection = %sid, "ignoring zeroed runner volume");
            } else {
                let scaled = scale(tv, rate);
                if self.total_matched != scaled {
                    deltas.push(format!("{market_id}/{sid}: runner volume {scaled}"));
                }
                self.total_matched = scaled;
            }
        }

        if let Some(levels) = &rc.atb {
            Self::apply_levels(&mut self.available_to_back, levels, rate);
            deltas.push(format!(
                "{market_id}/{sid}: available-to-back {} levels",
                levels.len()
            ));
        }
        if let Some(levels) = &rc.atl {
            Self::apply_levels(&mut self.available_to_lay, levels, rate);
            deltas.push(format!(
                "{market_id}/{sid}: available-to-lay {} levels",
                levels.len()
            ));
        }
        if let Some(levels) = &rc.spb {
            Self::apply_levels(&mut self.sp_back, levels, rate);
            deltas.push(format!("{market_id}/{sid}: sp-back {} levels", levels.len()));
        }
        if let Some(levels) = &rc.spl {
            Self::apply_levels(&mut self.sp_lay, levels, rate);
            deltas.push(format!("{market_id}/{sid}: sp-lay {} levels", levels.len()));
        }
        if let Some(levels) = &rc.trd {
            // An all-zero traded ladder against existing state is the same
            // settlement artefact as the zeroed runner volume.
            let all_zero = levels.iter().all(|ps| ps.size().is_zero());
            if all_zero && !self.traded.is_empty() {
                debug!(market = %market_id, selection = %sid, "ignoring all-zero traded update");
            } else {
                Self::apply_levels(&mut self.traded, levels, rate);
                deltas.push(format!("{market_id}/{sid}: traded {} levels", levels.len()));
            }
        }

        if let Some(levels) = &rc.batb {
            for quote in levels {
                self.best_to_back
                    .apply(quote.level(), quote.price(), scale(quote.size(), rate));
            }
            deltas.push(format!(
                "{market_id}/{sid}: best-to-back {} levels",
                levels.len()
            ));
        }
        if let Some(levels) = &rc.batl {
            for quote in levels {
                self.best_to_lay
                    .apply(quote.level(), quote.price(), scale(quote.size(), rate));
            }
            deltas.push(format!(
                "{market_id}/{sid}: best-to-lay {} levels",
                levels.len()
            ));
        }
        if let Some(levels) = &rc.bdatb {
            for quote in levels {
                self.best_display_to_back
                    .apply(quote.level(), quote.price(), scale(quote.size(), rate));
            }
            deltas.push(format!(
                "{market_id}/{sid}: best-display-to-back {} levels",
                levels.len()
            ));
        }
        if let Some(levels) = &rc.bdatl {
            for quote in levels {
                self.best_display_to_lay
                    .apply(quote.level(), quote.price(), scale(quote.size(), rate));
            }
            deltas.push(format!(
                "{market_id}/{sid}: best-display-to-lay {} levels",
                levels.len()
            ));
        }
    }

    fn ladders_hold_invariant(&self) -> bool {
        self.available_to_back.invariant_holds()
            && self.available_to_lay.invariant_holds()
            && self.sp_back.invariant_holds()
            && self.sp_lay.invariant_holds()
            && self.traded.invariant_holds()
            && self.best_to_back.invariant_holds()
            && self.best_to_lay.invariant_holds()
            && self.best_display_to_back.invariant_holds()
            && self.best_display_to_lay.invariant_holds()
    }
}

/// Cached state for one market.
#[derive(Debug, Clone, Serialize)]
pub struct MarketBook {
    market_id: MarketId,
    definition: Option<Box<MarketDefinition>>,
    runners: BTreeMap<SelectionId, RunnerBook>,
    total_matched: Decimal,
    publish_time: Option<i64>,
    completed: bool,
}

impl MarketBook {
    fn new(market_id: MarketId) -> Self {
        Self {
            market_id,
            definition: None,
            runners: BTreeMap::new(),
            total_matched: Decimal::ZERO,
            publish_time: None,
            completed: false,
        }
    }

    #[must_use]
    pub const fn market_id(&self) -> &MarketId {
        &self.market_id
    }

    #[must_use]
    pub fn definition(&self) -> Option<&MarketDefinition> {
        self.definition.as_deref()
    }

    #[must_use]
    pub const fn runners(&self) -> &BTreeMap<SelectionId, RunnerBook> {
        &self.runners
    }

    #[must_use]
    pub fn runner(&self, id: SelectionId) -> Option<&RunnerBook> {
        self.runners.get(&id)
    }

    #[must_use]
    pub const fn total_matched(&self) -> Decimal {
        self.total_matched
    }

    #[must_use]
    pub const fn publish_time(&self) -> Option<i64> {
        self.publish_time
    }

    /// Whether the market has genuinely finished trading.
    ///
    /// True when the definition reports CLOSED, or SUSPENDED with every
    /// runner in a settlement-terminal status. Latched: stays true for all
    /// subsequent deltas until a new image replaces the book. The server's
    /// own `complete` flag is informational only; read it from
    /// [`MarketBook::definition`].
    #[must_use]
    pub const fn is_truly_complete(&self) -> bool {
        self.completed
    }

    fn apply_definition(&mut self, def: &MarketDefinition, deltas: &mut Vec<String>) {
        deltas.push(format!(
            "{}: market definition updated ({:?})",
            self.market_id, def.status
        ));
        for rd in &def.runners {
            let sid = SelectionId::new(rd.id);
            if let Some(runner) = self.runners.get_mut(&sid) {
                if runner.status != rd.status {
                    deltas.push(format!(
                        "{}/{}: status {:?} -> {:?}",
                        self.market_id, sid, runner.status, rd.status
                    ));
                    runner.status = rd.status;
                }
                if rd.adjustment_factor.is_some() {
                    runner.adjustment_factor = rd.adjustment_factor;
                }
            }
        }
        self.definition = Some(Box::new(def.clone()));
    }

    fn apply_change(&mut self, change: &MarketChange, rate: Decimal, deltas: &mut Vec<String>) {
        if let Some(def) = &change.market_definition {
            self.apply_definition(def, deltas);
        }
        if let Some(tv) = change.tv {
            let scaled = scale(tv, rate);
            if self.total_matched != scaled {
                deltas.push(format!("{}: total matched {scaled}", self.market_id));
            }
            self.total_matched = scaled;
        }
        if let Some(changes) = &change.rc {
            for rc in changes {
                let sid = SelectionId::new(rc.id);
                let runner = self
                    .runners
                    .entry(sid)
                    .or_insert_with(|| RunnerBook::new(sid));
                runner.apply_change(&self.market_id, rc, rate, deltas);
                debug_assert!(runner.ladders_hold_invariant());
            }
        }
        self.update_completion();
    }

    fn update_completion(&mut self) {
        if self.completed {
            return;
        }
        let Some(def) = &self.definition else {
            return;
        };
        self.completed = match def.status {
            MarketStatus::Closed => true,
            MarketStatus::Suspended => {
                !def.runners.is_empty() && def.runners.iter().all(|r| r.status.is_terminal())
            }
            _ => false,
        };
    }
}

/// The market cache: every market seen since subscription or last reset.
#[derive(Debug, Default, Serialize)]
#[serde(transparent)]
pub struct MarketState {
    markets: BTreeMap<MarketId, MarketBook>,
}

impl MarketState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one fully reassembled, non-heartbeat market change message.
    pub fn apply_message(
        &mut self,
        msg: &MarketChangeMessage,
        rate: Decimal,
        deltas: &mut Vec<String>,
    ) {
        let Some(changes) = &msg.mc else {
            return;
        };
        for change in changes {
            let market_id = MarketId::new(change.id.clone());
            let book = self
                .markets
                .entry(market_id.clone())
                .or_insert_with(|| MarketBook::new(market_id.clone()));
            if change.img == Some(true) {
                // An image is not a delta: all prior state for the market
                // goes, including the completion latch.
                *book = MarketBook::new(market_id.clone());
                deltas.push(format!("{market_id}: image"));
            }
            book.publish_time = msg.pt;
            book.apply_change(change, rate, deltas);
        }
    }

    #[must_use]
    pub fn get(&self, market_id: &MarketId) -> Option<&MarketBook> {
        self.markets.get(market_id)
    }

    #[must_use]
    pub const fn markets(&self) -> &BTreeMap<MarketId, MarketBook> {
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

    /// Drop every market. Used when resubscribing.
    pub fn clear(&mut self) {
        self.markets.clear();
    }
}
