//! Segmentation reassembly.
//!
//! The server may split a large logical change message into several wire
//! frames sharing a request id: the first is marked `SEG_START`, middles
//! carry no marker, and the last is marked `SEG_END`. Segments for one id
//! are guaranteed contiguous, so the buffer only has to collect per id and
//! hand the whole sequence back on `SEG_END`.
//!
//! The buffer is bounded so a buggy or hostile server cannot grow it
//! without limit: exceeding the per-id segment count or the total byte
//! budget discards that id's buffer.

use std::collections::HashMap;

use tracing::warn;

use super::SegmentType;

/// Messages that can arrive in segments.
pub trait Segmented: Sized {
    /// The request id the segments are grouped by.
    fn request_id(&self) -> i64;

    /// The segmentation marker on this frame, if any.
    fn segmentation_type(&self) -> Option<SegmentType>;

    /// Merge a contiguous segment sequence into one logical message.
    ///
    /// Callers must pass at least one segment.
    fn reassemble(segments: Vec<Self>) -> Self;
}

/// Bounds on buffered segments.
#[derive(Debug, Clone, Copy)]
pub struct SegmentLimits {
    /// Maximum segments held for a single request id.
    pub max_segments_per_request: usize,
    /// Maximum bytes of raw payload buffered across all request ids.
    pub max_buffered_bytes: usize,
}

impl Default for SegmentLimits {
    fn default() -> Self {
        Self {
            max_segments_per_request: 64,
            max_buffered_bytes: 8 * 1024 * 1024,
        }
    }
}

/// Outcome of offering one frame to the buffer.
#[derive(Debug)]
pub enum SegmentOutcome<M> {
    /// A complete logical message is ready to apply.
    Complete(Vec<M>),
    /// The frame was buffered; more segments are expected.
    Buffered,
    /// A bound was exceeded; the request id's buffer was discarded.
    Discarded,
}

struct Pending<M> {
    segments: Vec<M>,
    bytes: usize,
}

/// Per-channel segment buffer keyed by request id.
pub struct SegmentBuffer<M> {
    pending: HashMap<i64, Pending<M>>,
    buffered_bytes: usize,
    limits: SegmentLimits,
}

impl<M: Segmented> SegmentBuffer<M> {
    #[must_use]
    pub fn new(limits: SegmentLimits) -> Self {
        Self {
            pending: HashMap::new(),
            buffered_bytes: 0,
            limits,
        }
    }

    /// Offer one frame. `frame_bytes` is the raw line length, used for the
    /// byte bound.
    pub fn offer(&mut self, message: M, frame_bytes: usize) -> SegmentOutcome<M> {
        let id = message.request_id();
        match message.segmentation_type() {
            Some(SegmentType::SegStart) => {
                // A new start discards any unfinished buffer for the id.
                if self.remove(id).is_some() {
                    warn!(request_id = id, "segment start discarded unfinished buffer");
                }
                self.insert(id, message, frame_bytes)
            }
            None if !self.pending.contains_key(&id) => {
                SegmentOutcome::Complete(vec![message])
            }
            None => self.insert(id, message, frame_bytes),
            Some(SegmentType::SegEnd) => match self.insert(id, message, frame_bytes) {
                SegmentOutcome::Buffered => match self.remove(id) {
                    Some(pending) => SegmentOutcome::Complete(pending.segments),
                    None => SegmentOutcome::Discarded,
                },
                outcome => outcome,
            },
        }
    }

    /// Drop every buffered segment. Used on resubscribe and session reset.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.buffered_bytes = 0;
    }

    /// Whether a buffer exists for the given request id.
    #[must_use]
    pub fn has_pending(&self, id: i64) -> bool {
        self.pending.contains_key(&id)
    }

    /// Total bytes currently buffered.
    #[must_use]
    pub fn buffered_bytes(&self) -> usize {
        self.buffered_bytes
    }

    fn insert(&mut self, id: i64, message: M, frame_bytes: usize) -> SegmentOutcome<M> {
        let entry = self.pending.entry(id).or_insert_with(|| Pending {
            segments: Vec::new(),
            bytes: 0,
        });
        entry.segments.push(message);
        entry.bytes += frame_bytes;
        self.buffered_bytes += frame_bytes;

        if entry.segments.len() > self.limits.max_segments_per_request
            || self.buffered_bytes > self.limits.max_buffered_bytes
        {
            warn!(
                request_id = id,
                segments = entry.segments.len(),
                buffered_bytes = self.buffered_bytes,
                "segment buffer bound exceeded, discarding request"
            );
            self.remove(id);
            return SegmentOutcome::Discarded;
        }
        SegmentOutcome::Buffered
    }

    fn remove(&mut self, id: i64) -> Option<Pending<M>> {
        let pending = self.pending.remove(&id)?;
        self.buffered_bytes -= pending.bytes;
        Some(pending)
    }
}
