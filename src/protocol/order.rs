//! Order change (`ocm`) wire types.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::market::PriceSize;
use super::segment::Segmented;
use super::{ChangeType, SegmentType};

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    #[serde(rename = "B")]
    Back,
    #[serde(rename = "L")]
    Lay,
}

/// Order execution status as reported by the matcher.
///
/// The stream only ever carries executable and execution-complete orders;
/// cancelled and lapsed history never appears on this channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    #[serde(rename = "E")]
    Executable,
    #[serde(rename = "EC")]
    ExecutionComplete,
}

/// What happens to the unmatched portion at market turn-in-play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PersistenceType {
    #[serde(rename = "L")]
    Lapse,
    #[serde(rename = "P")]
    Persist,
    #[serde(rename = "MOC")]
    MarketOnClose,
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    #[serde(rename = "L")]
    Limit,
    #[serde(rename = "MOC")]
    MarketOnClose,
    #[serde(rename = "LOC")]
    LimitOnClose,
}

/// A full snapshot of one unmatched (or just-completed) order.
///
/// Every `uo` entry is a complete snapshot, never a delta on the counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnmatchedOrder {
    pub id: String,
    /// Price.
    pub p: Decimal,
    /// Original size.
    pub s: Decimal,
    pub side: Side,
    pub status: OrderStatus,
    /// Persistence type.
    pub pt: Option<PersistenceType>,
    /// Order type.
    pub ot: Option<OrderType>,
    /// Placed date, epoch millis.
    pub pd: Option<i64>,
    /// Matched date, epoch millis.
    pub md: Option<i64>,
    /// Cancelled date, epoch millis.
    pub cd: Option<i64>,
    /// Lapsed date, epoch millis.
    pub ld: Option<i64>,
    /// Lapse status reason code.
    pub lsrc: Option<String>,
    /// Average price matched.
    pub avp: Option<Decimal>,
    /// Size matched.
    pub sm: Option<Decimal>,
    /// Size remaining.
    pub sr: Option<Decimal>,
    /// Size lapsed.
    pub sl: Option<Decimal>,
    /// Size cancelled.
    pub sc: Option<Decimal>,
    /// Size voided.
    pub sv: Option<Decimal>,
    /// Regulator auth code.
    pub rac: Option<String>,
    /// Regulator code.
    pub rc: Option<String>,
    /// Customer order reference.
    pub rfo: Option<String>,
    /// Customer strategy reference.
    pub rfs: Option<String>,
}

/// Matched ladders scoped to one customer strategy reference.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrategyMatchChange {
    pub mb: Option<Vec<PriceSize>>,
    pub ml: Option<Vec<PriceSize>>,
}

/// Per-runner delta inside an order account change.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRunnerChange {
    pub id: i64,
    pub hc: Option<Decimal>,
    pub full_image: Option<bool>,
    /// Unmatched orders, each a full snapshot keyed by order id.
    pub uo: Option<Vec<UnmatchedOrder>>,
    /// Matched backs ladder, sparse.
    pub mb: Option<Vec<PriceSize>>,
    /// Matched lays ladder, sparse.
    pub ml: Option<Vec<PriceSize>>,
    /// Strategy-ref scoped matched ladders.
    pub smc: Option<HashMap<String, StrategyMatchChange>>,
}

/// Per-market delta inside an `ocm` frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderAccountChange {
    /// Market id.
    pub id: String,
    pub closed: Option<bool>,
    pub full_image: Option<bool>,
    pub orc: Option<Vec<OrderRunnerChange>>,
}

/// A complete `ocm` frame, possibly one segment of a larger logical message.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderChangeMessage {
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
    pub oc: Option<Vec<OrderAccountChange>>,
}

impl OrderChangeMessage {
    /// Whether this frame is a liveness heartbeat with no payload to merge.
    #[must_use]
    pub fn is_heartbeat(&self) -> bool {
        self.ct == Some(ChangeType::Heartbeat)
    }
}

impl Segmented for OrderChangeMessage {
    fn request_id(&self) -> i64 {
        self.id.unwrap_or_default()
    }

    fn segmentation_type(&self) -> Option<SegmentType> {
        self.segmentation_type
    }

    fn reassemble(mut segments: Vec<Self>) -> Self {
        let mut head = segments.remove(0);
        let mut oc = head.oc.take().unwrap_or_default();
        let count = segments.len();
        for (i, mut seg) in segments.into_iter().enumerate() {
            if let Some(more) = seg.oc.take() {
                oc.extend(more);
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
        head.oc = Some(oc);
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn parse(line: &str) -> OrderChangeMessage {
        serde_json::from_str(line).unwrap()
    }

    #[test]
    fn parses_unmatched_order_snapshot() {
        let msg = parse(
            r#"{"op":"ocm","id":3,"clk":"X","pt":1467395827077,
               "oc":[{"id":"1.102151675","orc":[{"id":6113662,
               "uo":[{"id":"10822867886","p":12,"s":2,"side":"B","status":"E",
                      "pt":"L","ot":"L","pd":1467395786000,"sm":0,"sr":2,
                      "sl":0,"sc":0,"sv":0,"avp":0}],
               "mb":[[12,0.5]]}]}]}"#,
        );
        let oc = &msg.oc.as_ref().unwrap()[0];
        assert_eq!(oc.id, "1.102151675");
        let orc = &oc.orc.as_ref().unwrap()[0];
        let uo = &orc.uo.as_ref().unwrap()[0];
        assert_eq!(uo.id, "10822867886");
        assert_eq!(uo.side, Side::Back);
        assert_eq!(uo.status, OrderStatus::Executable);
        assert_eq!(uo.pt, Some(PersistenceType::Lapse));
        assert_eq!(uo.ot, Some(OrderType::Limit));
        assert_eq!(uo.sr, Some(dec!(2)));

        let mb = orc.mb.as_ref().unwrap();
        assert_eq!(mb[0].price(), dec!(12));
        assert_eq!(mb[0].size(), dec!(0.5));
    }

    #[test]
    fn parses_strategy_match_changes() {
        let msg = parse(
            r#"{"op":"ocm","id":3,"oc":[{"id":"1.1","orc":[{"id":10,
               "smc":{"strat-a":{"mb":[[2.5,10]]},"strat-b":{"ml":[[3,4]]}}}]}]}"#,
        );
        let orc = &msg.oc.as_ref().unwrap()[0].orc.as_ref().unwrap()[0];
        let smc = orc.smc.as_ref().unwrap();
        assert_eq!(smc.len(), 2);
        assert_eq!(smc["strat-a"].mb.as_ref().unwrap()[0].size(), dec!(10));
        assert_eq!(smc["strat-b"].ml.as_ref().unwrap()[0].price(), dec!(3));
    }

    #[test]
    fn parses_full_image_flags() {
        let msg = parse(
            r#"{"op":"ocm","id":3,"oc":[{"id":"1.1","fullImage":true,"closed":true,
               "orc":[{"id":10,"fullImage":true}]}]}"#,
        );
        let oc = &msg.oc.as_ref().unwrap()[0];
        assert_eq!(oc.full_image, Some(true));
        assert_eq!(oc.closed, Some(true));
        assert_eq!(oc.orc.as_ref().unwrap()[0].full_image, Some(true));
    }

    #[test]
    fn execution_complete_round_trip() {
        let uo: UnmatchedOrder = serde_json::from_str(
            r#"{"id":"o1","p":2.5,"s":10,"side":"L","status":"EC","sm":10,"sr":0}"#,
        )
        .unwrap();
        assert_eq!(uo.status, OrderStatus::ExecutionComplete);
        assert_eq!(uo.side, Side::Lay);

        let json = serde_json::to_value(&uo).unwrap();
        assert_eq!(json["status"], "EC");
        assert_eq!(json["side"], "L");
    }

    #[test]
    fn reassembly_concatenates_oc() {
        let a = parse(
            r#"{"op":"ocm","id":5,"segmentationType":"SEG_START","clk":"c0",
               "oc":[{"id":"1.1"}]}"#,
        );
        let b = parse(
            r#"{"op":"ocm","id":5,"segmentationType":"SEG_END","clk":"c1","pt":9,
               "oc":[{"id":"1.2"}]}"#,
        );
        let whole = OrderChangeMessage::reassemble(vec![a, b]);
        let ids: Vec<_> = whole
            .oc
            .as_ref()
            .unwrap()
            .iter()
            .map(|o| o.id.as_str())
            .collect();
        assert_eq!(ids, vec!["1.1", "1.2"]);
        assert_eq!(whole.clk.as_deref(), Some("c1"));
        assert_eq!(whole.pt, Some(9));
    }
}
