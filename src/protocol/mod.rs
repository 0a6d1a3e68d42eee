//! Wire protocol types for the exchange stream.
//!
//! Each direction of the stream sends UTF-8 JSON objects, one per line,
//! terminated by CRLF. Every object carries an `op` discriminator. Inbound
//! frames are classified into [`InboundMessage`]; outbound requests are
//! built from the request structs below and serialized by the session.

pub mod market;
pub mod order;
pub mod segment;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use market::{
    MarketChange, MarketChangeMessage, MarketDefinition, MarketStatus, PriceSize, LevelPriceSize,
    RunnerChange, RunnerDefinition, RunnerStatus,
};
pub use order::{
    OrderAccountChange, OrderChangeMessage, OrderRunnerChange, OrderStatus, OrderType,
    PersistenceType, Side, StrategyMatchChange, UnmatchedOrder,
};
pub use segment::{SegmentBuffer, SegmentLimits, SegmentOutcome, Segmented};

/// Change message type carried in `ct`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    SubImage,
    ResubDelta,
    Heartbeat,
}

/// Segmentation marker carried in `segmentationType`.
///
/// Middle segments carry no marker at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SegmentType {
    SegStart,
    SegEnd,
}

/// Status code on an acknowledgement frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCode {
    Success,
    Failure,
}

/// Server greeting sent right after the TLS handshake.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionMessage {
    pub id: Option<i64>,
    pub connection_id: String,
}

/// Acknowledgement of an outbound request, matched by `id`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusMessage {
    pub id: Option<i64>,
    pub status_code: StatusCode,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub connection_closed: Option<bool>,
    pub connections_available: Option<i64>,
}

impl StatusMessage {
    /// Human-readable failure reason for logs and errors.
    #[must_use]
    pub fn reason(&self) -> String {
        match (&self.error_code, &self.error_message) {
            (Some(code), Some(msg)) => format!("{code}: {msg}"),
            (Some(code), None) => code.clone(),
            (None, Some(msg)) => msg.clone(),
            (None, None) => "unspecified".into(),
        }
    }
}

/// A fully classified inbound frame.
#[derive(Debug, Clone)]
pub enum InboundMessage {
    Connection(ConnectionMessage),
    Status(StatusMessage),
    MarketChange(MarketChangeMessage),
    OrderChange(OrderChangeMessage),
}

/// Why a frame could not be classified.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Not valid JSON, or no `op` discriminator.
    #[error("unparsable frame: {0}")]
    Unparsable(String),

    /// Known `op` but the payload is missing required fields.
    #[error("bad {op} payload: {source}")]
    BadPayload { op: String, source: serde_json::Error },

    /// An `op` this client does not understand.
    #[error("unknown op {0:?}")]
    UnknownOp(String),
}

/// Classify one inbound line into a frame.
///
/// Parse failures and unknown ops are reported, never panicked on - the
/// stream must survive malformed frames.
pub fn classify(line: &str) -> Result<InboundMessage, FrameError> {
    let value: Value =
        serde_json::from_str(line).map_err(|e| FrameError::Unparsable(e.to_string()))?;
    let op = value
        .get("op")
        .and_then(Value::as_str)
        .ok_or_else(|| FrameError::Unparsable("missing op field".into()))?
        .to_string();

    let payload = |e| FrameError::BadPayload {
        op: op.clone(),
        source: e,
    };
    match op.as_str() {
        "connection" => serde_json::from_value(value)
            .map(InboundMessage::Connection)
            .map_err(payload),
        "status" => serde_json::from_value(value)
            .map(InboundMessage::Status)
            .map_err(payload),
        "mcm" => serde_json::from_value(value)
            .map(InboundMessage::MarketChange)
            .map_err(payload),
        "ocm" => serde_json::from_value(value)
            .map(InboundMessage::OrderChange)
            .map_err(payload),
        _ => Err(FrameError::UnknownOp(op)),
    }
}

/// Authentication request sent once per connection.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationRequest {
    pub op: &'static str,
    pub id: i64,
    pub app_key: String,
    pub session: String,
}

impl AuthenticationRequest {
    #[must_use]
    pub fn new(id: i64, app_key: impl Into<String>, session: impl Into<String>) -> Self {
        Self {
            op: "authentication",
            id,
            app_key: app_key.into(),
            session: session.into(),
        }
    }
}

/// Market filter restricting a subscription to explicit market ids.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketFilter {
    pub market_ids: Vec<String>,
}

/// Market subscription request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSubscriptionRequest {
    pub op: &'static str,
    pub id: i64,
    pub market_filter: MarketFilter,
    pub segmentation_enabled: bool,
    pub conflate_ms: u64,
    pub heartbeat_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_clk: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clk: Option<String>,
}

impl MarketSubscriptionRequest {
    #[must_use]
    pub fn new(
        id: i64,
        market_ids: Vec<String>,
        segmentation_enabled: bool,
        conflate_ms: u64,
        heartbeat_ms: u64,
    ) -> Self {
        Self {
            op: "marketSubscription",
            id,
            market_filter: MarketFilter { market_ids },
            segmentation_enabled,
            conflate_ms,
            heartbeat_ms,
            initial_clk: None,
            clk: None,
        }
    }

    /// Attach stream clocks so the server resumes with a delta instead of a
    /// full image where it can.
    #[must_use]
    pub fn resume_from(mut self, initial_clk: Option<String>, clk: Option<String>) -> Self {
        self.initial_clk = initial_clk;
        self.clk = clk;
        self
    }
}

/// Order filter narrowing the order subscription.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_overall_position: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_strategy_refs: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partition_matched_by_strategy_ref: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_ids: Option<Vec<i64>>,
}

/// Order subscription request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSubscriptionRequest {
    pub op: &'static str,
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_filter: Option<OrderFilter>,
    pub segmentation_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflate_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heartbeat_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_clk: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clk: Option<String>,
}

impl OrderSubscriptionRequest {
    #[must_use]
    pub fn new(id: i64, order_filter: Option<OrderFilter>, segmentation_enabled: bool) -> Self {
        Self {
            op: "orderSubscription",
            id,
            order_filter,
            segmentation_enabled,
            conflate_ms: None,
            heartbeat_ms: None,
            initial_clk: None,
            clk: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_connection_frame() {
        let line = r#"{"op":"connection","connectionId":"002-230915140112-174"}"#;
        match classify(line).unwrap() {
            InboundMessage::Connection(c) => {
                assert_eq!(c.connection_id, "002-230915140112-174");
            }
            other => panic!("expected connection, got {other:?}"),
        }
    }

    #[test]
    fn classifies_status_frame() {
        let line = r#"{"op":"status","id":2,"statusCode":"SUCCESS","connectionClosed":false}"#;
        match classify(line).unwrap() {
            InboundMessage::Status(s) => {
                assert_eq!(s.id, Some(2));
                assert_eq!(s.status_code, StatusCode::Success);
                assert_eq!(s.connection_closed, Some(false));
            }
            other => panic!("expected status, got {other:?}"),
        }
    }

    #[test]
    fn classifies_failure_status_with_reason() {
        let line = r#"{"op":"status","id":1,"statusCode":"FAILURE","errorCode":"NO_APP_KEY","errorMessage":"AppKey not set","connectionClosed":true}"#;
        match classify(line).unwrap() {
            InboundMessage::Status(s) => {
                assert_eq!(s.status_code, StatusCode::Failure);
                assert_eq!(s.reason(), "NO_APP_KEY: AppKey not set");
            }
            other => panic!("expected status, got {other:?}"),
        }
    }

    #[test]
    fn unknown_op_is_rejected_gracefully() {
        let line = r#"{"op":"pong","id":1}"#;
        match classify(line) {
            Err(FrameError::UnknownOp(op)) => assert_eq!(op, "pong"),
            other => panic!("expected unknown op, got {other:?}"),
        }
    }

    #[test]
    fn garbage_is_unparsable() {
        assert!(matches!(
            classify("not json at all"),
            Err(FrameError::Unparsable(_))
        ));
        assert!(matches!(
            classify(r#"{"id":1}"#),
            Err(FrameError::Unparsable(_))
        ));
    }

    #[test]
    fn bad_payload_names_the_op() {
        // status requires statusCode
        match classify(r#"{"op":"status","id":1}"#) {
            Err(FrameError::BadPayload { op, .. }) => assert_eq!(op, "status"),
            other => panic!("expected bad payload, got {other:?}"),
        }
    }

    #[test]
    fn authentication_request_wire_shape() {
        let req = AuthenticationRequest::new(123_456_789, "key", "token");
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["op"], "authentication");
        assert_eq!(json["id"], 123_456_789);
        assert_eq!(json["appKey"], "key");
        assert_eq!(json["session"], "token");
    }

    #[test]
    fn market_subscription_wire_shape() {
        let req = MarketSubscriptionRequest::new(7, vec!["1.234".into()], true, 0, 5000);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["op"], "marketSubscription");
        assert_eq!(json["marketFilter"]["marketIds"][0], "1.234");
        assert_eq!(json["segmentationEnabled"], true);
        assert_eq!(json["conflateMs"], 0);
        assert_eq!(json["heartbeatMs"], 5000);
        assert!(json.get("initialClk").is_none());
    }

    #[test]
    fn market_subscription_resume_carries_clocks() {
        let req = MarketSubscriptionRequest::new(7, vec!["1.234".into()], true, 0, 5000)
            .resume_from(Some("abc".into()), Some("def".into()));
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["initialClk"], "abc");
        assert_eq!(json["clk"], "def");
    }

    #[test]
    fn order_subscription_omits_empty_filter() {
        let req = OrderSubscriptionRequest::new(9, None, true);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["op"], "orderSubscription");
        assert!(json.get("orderFilter").is_none());
    }

    #[test]
    fn order_filter_serializes_set_fields_only() {
        let filter = OrderFilter {
            include_overall_position: Some(false),
            customer_strategy_refs: Some(vec!["s1".into()]),
            ..OrderFilter::default()
        };
        let req = OrderSubscriptionRequest::new(9, Some(filter), false);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["orderFilter"]["includeOverallPosition"], false);
        assert_eq!(json["orderFilter"]["customerStrategyRefs"][0], "s1");
        assert!(json["orderFilter"].get("accountIds").is_none());
    }
}
