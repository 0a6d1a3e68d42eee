//! Frame decoder: classification, segmentation reassembly, cache dispatch.
//!
//! The decoder owns both caches and the per-channel segment buffers. Each
//! inbound line produces one [`StreamEvent`]; the session reacts to the
//! event (fires callbacks, resolves pending requests) and then clears the
//! delta list. Parse and semantic failures never kill the stream - the
//! line is dropped, counted, and processing continues.

use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::cache::{MarketState, OrderState};
use crate::protocol::market::MarketChangeMessage;
use crate::protocol::order::OrderChangeMessage;
use crate::protocol::{
    classify, ConnectionMessage, FrameError, InboundMessage, SegmentBuffer, SegmentLimits,
    SegmentOutcome, Segmented, StatusMessage,
};

/// Stream clocks observed on a channel, re-sent on resubscription so the
/// server can resume with a delta instead of a full image.
#[derive(Debug, Clone, Default)]
pub struct StreamClocks {
    pub initial_clk: Option<String>,
    pub clk: Option<String>,
}

impl StreamClocks {
    fn note(&mut self, initial_clk: &Option<String>, clk: &Option<String>) {
        if initial_clk.is_some() {
            self.initial_clk.clone_from(initial_clk);
        }
        if clk.is_some() {
            self.clk.clone_from(clk);
        }
    }
}

/// What one inbound line amounted to.
#[derive(Debug)]
pub enum StreamEvent {
    /// Server greeting carrying the connection id.
    Connection(ConnectionMessage),
    /// Acknowledgement of an outbound request.
    Status(StatusMessage),
    /// The market cache was mutated; deltas are ready.
    MarketUpdate,
    /// The order cache was mutated; deltas are ready.
    OrderUpdate,
    /// Liveness heartbeat; no payload was merged.
    Heartbeat,
    /// A segment was buffered; the logical message is still incomplete.
    Buffered,
    /// The line was dropped (unparsable, unknown op, bound exceeded, or a
    /// change frame arriving before authentication).
    Dropped,
}

/// Decoder state: caches, segment buffers, delta list and counters.
pub struct Decoder {
    markets: MarketState,
    orders: OrderState,
    market_segments: SegmentBuffer<MarketChangeMessage>,
    order_segments: SegmentBuffer<OrderChangeMessage>,
    deltas: Vec<String>,
    currency_rate: Decimal,
    market_clocks: StreamClocks,
    order_clocks: StreamClocks,
    heartbeat_ms: Option<u64>,
    dropped_frames: u64,
}

impl Decoder {
    #[must_use]
    pub fn new(currency_rate: Decimal, limits: SegmentLimits) -> Self {
        Self {
            markets: MarketState::new(),
            orders: OrderState::new(),
            market_segments: SegmentBuffer::new(limits),
            order_segments: SegmentBuffer::new(limits),
            deltas: Vec::new(),
            currency_rate,
            market_clocks: StreamClocks::default(),
            order_clocks: StreamClocks::default(),
            heartbeat_ms: None,
            dropped_frames: 0,
        }
    }

    /// Process one inbound line.
    ///
    /// `accept_changes` gates `mcm`/`ocm` frames: before the authentication
    /// ack they are dropped deterministically rather than merged.
    pub fn process_line(&mut self, line: &str, accept_changes: bool) -> StreamEvent {
        match classify(line) {
            Ok(InboundMessage::Connection(msg)) => StreamEvent::Connection(msg),
            Ok(InboundMessage::Status(msg)) => StreamEvent::Status(msg),
            Ok(InboundMessage::MarketChange(msg)) => {
                if !accept_changes {
                    warn!("market change before authentication ack, dropping");
                    self.dropped_frames += 1;
                    return StreamEvent::Dropped;
                }
                if msg.heartbeat_ms.is_some() {
                    self.heartbeat_ms = msg.heartbeat_ms;
                }
                if msg.is_heartbeat() {
                    self.market_clocks.note(&msg.initial_clk, &msg.clk);
                    return StreamEvent::Heartbeat;
                }
                match self.market_segments.offer(msg, line.len()) {
                    SegmentOutcome::Complete(segments) => {
                        let whole = MarketChangeMessage::reassemble(segments);
                        self.market_clocks.note(&whole.initial_clk, &whole.clk);
                        self.markets
                            .apply_message(&whole, self.currency_rate, &mut self.deltas);
                        StreamEvent::MarketUpdate
                    }
                    SegmentOutcome::Buffered => StreamEvent::Buffered,
                    SegmentOutcome::Discarded => {
                        self.dropped_frames += 1;
                        StreamEvent::Dropped
                    }
                }
            }
            Ok(InboundMessage::OrderChange(msg)) => {
                if !accept_changes {
                    warn!("order change before authentication ack, dropping");
                    self.dropped_frames += 1;
                    return StreamEvent::Dropped;
                }
                if msg.heartbeat_ms.is_some() {
                    self.heartbeat_ms = msg.heartbeat_ms;
                }
                if msg.is_heartbeat() {
                    self.order_clocks.note(&msg.initial_clk, &msg.clk);
                    return StreamEvent::Heartbeat;
                }
                match self.order_segments.offer(msg, line.len()) {
                    SegmentOutcome::Complete(segments) => {
                        let whole = OrderChangeMessage::reassemble(segments);
                        self.order_clocks.note(&whole.initial_clk, &whole.clk);
                        self.orders.apply_message(&whole, &mut self.deltas);
                        StreamEvent::OrderUpdate
                    }
                    SegmentOutcome::Buffered => StreamEvent::Buffered,
                    SegmentOutcome::Discarded => {
                        self.dropped_frames += 1;
                        StreamEvent::Dropped
                    }
                }
            }
            Err(FrameError::UnknownOp(op)) => {
                debug!(op = %op, "unknown op, dropping frame");
                self.dropped_frames += 1;
                StreamEvent::Dropped
            }
            Err(err) => {
                warn!(error = %err, "dropping frame");
                self.dropped_frames += 1;
                StreamEvent::Dropped
            }
        }
    }

    /// The market cache.
    #[must_use]
    pub const fn markets(&self) -> &MarketState {
        &self.markets
    }

    /// The order cache.
    #[must_use]
    pub const fn orders(&self) -> &OrderState {
        &self.orders
    }

    /// Delta strings accumulated by the last apply.
    #[must_use]
    pub fn deltas(&self) -> &[String] {
        &self.deltas
    }

    /// Clear the delta list. The session calls this right after the
    /// callback returns, so deltas never accumulate across applies.
    pub fn clear_deltas(&mut self) {
        self.deltas.clear();
    }

    /// Frames dropped so far (unparsable, unknown op, out of bounds).
    #[must_use]
    pub const fn dropped_frames(&self) -> u64 {
        self.dropped_frames
    }

    /// Clocks last seen on the market channel.
    #[must_use]
    pub const fn market_clocks(&self) -> &StreamClocks {
        &self.market_clocks
    }

    /// Clocks last seen on the order channel.
    #[must_use]
    pub const fn order_clocks(&self) -> &StreamClocks {
        &self.order_clocks
    }

    /// The heartbeat interval the server last echoed on a change message,
    /// which may differ from the requested one.
    #[must_use]
    pub const fn negotiated_heartbeat_ms(&self) -> Option<u64> {
        self.heartbeat_ms
    }

    /// Reset performed by a new market subscription: market cache, delta
    /// list and market segment buffer all go.
    pub fn reset_markets(&mut self) {
        self.markets.clear();
        self.deltas.clear();
        self.market_segments.clear();
        self.market_clocks = StreamClocks::default();
    }

    /// Drop all buffered segments. Used on close.
    pub fn clear_segments(&mut self) {
        self.market_segments.clear();
        self.order_segments.clear();
    }

    /// Whether a market-channel segment buffer exists for the request id.
    #[must_use]
    pub fn has_market_segments(&self, id: i64) -> bool {
        self.market_segments.has_pending(id)
    }
}
