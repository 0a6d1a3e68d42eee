//! Market change (`mcm`) wire types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::segment::Segmented;
use super::{ChangeType, SegmentType};

/// A `(price, size)` pair as sent on the wire: a two-element array.
///
/// Size 0 is the sentinel for "remove this price level".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceSize(pub Decimal, pub Decimal);

impl PriceSize {
    #[must_use]
    pub const fn price(&self) -> Decimal {
        self.0
    }

    #[must_use]
    pub const fn size(&self) -> Decimal {
        self.1
    }
}

/// A `(level, price, size)` triple for best-offer ladders. Level 0 is best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelPriceSize(pub u32, pub Decimal, pub Decimal);

impl LevelPriceSize {
    #[must_use]
    pub const fn level(&self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn price(&self) -> Decimal {
        self.1
    }

    #[must_use]
    pub const fn size(&self) -> Decimal {
        self.2
    }
}

/// Market lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketStatus {
    Inactive,
    Open,
    Suspended,
    Closed,
}

/// Runner lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunnerStatus {
    Active,
    Winner,
    Loser,
    Placed,
    RemovedVacant,
    Removed,
    Hidden,
}

impl RunnerStatus {
    /// Whether this status is a settlement-terminal value.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Winner | Self::Loser | Self::Placed | Self::RemovedVacant | Self::Removed
        )
    }
}

/// Runner entry inside a market definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerDefinition {
    pub id: i64,
    pub status: RunnerStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_priority: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adjustment_factor: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bsp: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hc: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removal_date: Option<DateTime<Utc>>,
}

/// The full market definition blob. Replaced wholesale on arrival.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketDefinition {
    pub status: MarketStatus,
    #[serde(default)]
    pub runners: Vec<RunnerDefinition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_type_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub betting_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suspend_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settled_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number_of_winners: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number_of_active_runners: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bet_delay: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bsp_market: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bsp_reconciled: Option<bool>,
    /// Server-reported completeness. Surfaced but never used for gating;
    /// see `MarketBook::is_truly_complete`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complete: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_play: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cross_matching: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runners_voidable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_in_play_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persistence_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_allowed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regulators: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
}

/// Per-runner delta inside a market change.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerChange {
    pub id: i64,
    /// Last traded price.
    pub ltp: Option<Decimal>,
    /// Total volume traded on this runner.
    pub tv: Option<Decimal>,
    /// Starting price near estimate.
    pub spn: Option<Decimal>,
    /// Starting price far estimate.
    pub spf: Option<Decimal>,
    /// Available to back, full depth.
    pub atb: Option<Vec<PriceSize>>,
    /// Available to lay, full depth.
    pub atl: Option<Vec<PriceSize>>,
    /// Starting price back ladder.
    pub spb: Option<Vec<PriceSize>>,
    /// Starting price lay ladder.
    pub spl: Option<Vec<PriceSize>>,
    /// Traded volume ladder.
    pub trd: Option<Vec<PriceSize>>,
    /// Best available to back, by level.
    pub batb: Option<Vec<LevelPriceSize>>,
    /// Best available to lay, by level.
    pub batl: Option<Vec<LevelPriceSize>>,
    /// Best display available to back (virtual bets included), by level.
    pub bdatb: Option<Vec<LevelPriceSize>>,
    /// Best display available to lay, by level.
    pub bdatl: Option<Vec<LevelPriceSize>>,
}

/// Per-market delta inside an `mcm` frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketChange {
    pub id: String,
    /// When true this change is an image: it replaces all prior state for
    /// the market rather than patching it.
    pub img: Option<bool>,
    /// Total amount matched across the market.
    pub tv: Option<Decimal>,
    /// Conflation applied to this market's updates.
    pub con: Option<bool>,
    pub market_definition: Option<Box<MarketDefinition>>,
    pub rc: Option<Vec<RunnerChange>>,
}

/// A complete `mcm` frame, possibly one segment of a larger logical message.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketChangeMessage {
    pub id: Option<i64>,
    pub ct: Option<ChangeType>,
    pub clk: Option<String>,
    pub initial_clk: Option<String>,
    /// Publish time, epoch millis.
    pub pt: Option<i64>,
    pub status: Option<i64>,
    pub con: Option<bool>,
    pub segmentation_type: Option<SegmentType>,
    pub segmentation_enabled: Option<bool>,
    pub conflate_ms: Option<u64>,
    pub heartbeat_ms: Option<u64>,
    pub mc: Option<Vec<MarketChange>>,
}

impl MarketChangeMessage {
    /// Whether this frame is a liveness heartbeat with no payload to merge.
    #[must_use]
    pub fn is_heartbeat(&self) -> bool {
        self.ct == Some(ChangeType::Heartbeat)
    }
}

impl Segmented for MarketChangeMessage {
    fn request_id(&self) -> i64 {
        self.id.unwrap_or_default()
    }

    fn segmentation_type(&self) -> Option<SegmentType> {
        self.segmentation_type
    }

    fn reassemble(mut segments: Vec<Self>) -> Self {
        // Top-level meta comes from the first segment; pt/clk/status/con and
        // the segmentation marker from the last when present there; the
        // payload array is the concatenation in arrival order.
        let mut head = segments.remove(0);
        let mut mc = head.mc.take().unwrap_or_default();
        let count = segments.len();
        for (i, mut seg) in segments.into_iter().enumerate() {
            if let Some(more) = seg.mc.take() {
                mc.extend(more);
            }
            if i + 1 == count {
                if seg.pt.is_some() {
                    head.pt = seg.pt;
                }
                if seg.clk.is_some() {
                    head.clk = seg.clk;
                }
                if seg.status.is_some() {
                    head.status = seg.status;
                }
                if seg.con.is_some() {
                    head.con = seg.con;
                }
                if seg.segmentation_type.is_some() {
                    head.segmentation_type = seg.segmentation_type;
                }
            }
        }
        head.mc = Some(mc);
        head
    }
}
