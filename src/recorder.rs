//! Market recorder: per-market raw frame streams plus periodic snapshots.
//!
//! Consumes the public callback surface only - the raw tap and the
//! market-change callback - and produces no feedback into the decoder.
//! Each market gets an append-only `<marketId>.jsonl` of the raw frames
//! that mention it and a `<marketId>.snap.json` structured snapshot
//! rewritten on an interval. When the cache reports a market truly
//! complete the recorder writes a final snapshot and stops touching its
//! files.

use std::collections::{HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::Value;
use tracing::{info, warn};

use crate::cache::{MarketBook, MarketState};
use crate::domain::MarketId;
use crate::error::Result;

/// Recorder settings.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Output directory, created if missing.
    pub dir: PathBuf,
    /// How often each market's structured snapshot is rewritten.
    pub snapshot_interval: Duration,
}

impl RecorderConfig {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            snapshot_interval: Duration::from_secs(60),
        }
    }

    #[must_use]
    pub fn with_snapshot_interval(mut self, interval: Duration) -> Self {
        self.snapshot_interval = interval;
        self
    }
}

/// Writes raw frames and periodic snapshots for every market seen.
pub struct MarketRecorder {
    dir: PathBuf,
    snapshot_interval: Duration,
    raw_files: HashMap<MarketId, BufWriter<File>>,
    last_snapshot: HashMap<MarketId, Instant>,
    finished: HashSet<MarketId>,
}

impl MarketRecorder {
    pub fn new(config: RecorderConfig) -> Result<Self> {
        fs::create_dir_all(&config.dir)?;
        Ok(Self {
            dir: config.dir,
            snapshot_interval: config.snapshot_interval,
            raw_files: HashMap::new(),
            last_snapshot: HashMap::new(),
            finished: HashSet::new(),
        })
    }

    /// Append one raw line to the stream file of every market it mentions.
    ///
    /// Feed this from the session's raw tap; non-market frames are skipped.
    pub fn record_raw(&mut self, line: &str) {
        let Ok(value) = serde_json::from_str::<Value>(line) else {
            return;
        };
        if value.get("op").and_then(Value::as_str) != Some("mcm") {
            return;
        }
        let Some(changes) = value.get("mc").and_then(Value::as_array) else {
            return;
        };
        for change in changes {
            let Some(id) = change.get("id").and_then(Value::as_str) else {
                continue;
            };
            let market_id = MarketId::new(id);
            if self.finished.contains(&market_id) {
                continue;
            }
            self.append_raw(&market_id, line);
        }
    }

    /// Snapshot due markets and finalize completed ones.
    ///
    /// Feed this from the market-change callback.
    pub fn on_market_change(&mut self, markets: &MarketState, _deltas: &[String]) {
        for (market_id, book) in markets.markets() {
            if self.finished.contains(market_id) {
                continue;
            }
            if book.is_truly_complete() {
                self.finish(market_id.clone(), book);
                continue;
            }
            let due = self
                .last_snapshot
                .get(market_id)
                .map_or(true, |at| at.elapsed() >= self.snapshot_interval);
            if due {
                self.write_snapshot(market_id, book);
                self.last_snapshot.insert(market_id.clone(), Instant::now());
            }
        }
    }

    /// Flush every open raw stream.
    pub fn flush(&mut self) {
        for (market_id, file) in &mut self.raw_files {
            if let Err(e) = file.flush() {
                warn!(market = %market_id, error = %e, "flush failed");
            }
        }
    }

    /// Markets already finalized.
    #[must_use]
    pub fn finished(&self) -> &HashSet<MarketId> {
        &self.finished
    }

    fn raw_path(&self, market_id: &MarketId) -> PathBuf {
        self.dir.join(format!("{market_id}.jsonl"))
    }

    fn snapshot_path(&self, market_id: &MarketId) -> PathBuf {
        self.dir.join(format!("{market_id}.snap.json"))
    }

    fn append_raw(&mut self, market_id: &MarketId, line: &str) {
        if !self.raw_files.contains_key(market_id) {
            match open_append(&self.raw_path(market_id)) {
                Ok(file) => {
                    self.raw_files
                        .insert(market_id.clone(), BufWriter::new(file));
                }
                Err(e) => {
                    warn!(market = %market_id, error = %e, "raw stream open failed");
                    return;
                }
            }
        }
        if let Some(file) = self.raw_files.get_mut(market_id) {
            if let Err(e) = writeln!(file, "{line}") {
                warn!(market = %market_id, error = %e, "raw append failed");
            }
        }
    }

    fn write_snapshot(&self, market_id: &MarketId, book: &MarketBook) {
        let snapshot = serde_json::json!({
            "recordedAt": Utc::now().to_rfc3339(),
            "market": book,
        });
        let path = self.snapshot_path(market_id);
        if let Err(e) = fs::write(&path, snapshot.to_string()) {
            warn!(market = %market_id, error = %e, "snapshot write failed");
        }
    }

    fn finish(&mut self, market_id: MarketId, book: &MarketBook) {
        self.write_snapshot(&market_id, book);
        if let Some(mut file) = self.raw_files.remove(&market_id) {
            if let Err(e) = file.flush() {
                warn!(market = %market_id, error = %e, "final flush failed");
            }
        }
        self.last_snapshot.remove(&market_id);
        info!(market = %market_id, "market complete, recording finished");
        self.finished.insert(market_id);
    }
}

fn open_append(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MarketState;
    use rust_decimal::Decimal;

    fn recorder(dir: &Path) -> MarketRecorder {
        MarketRecorder::new(
            RecorderConfig::new(dir).with_snapshot_interval(Duration::ZERO),
        )
        .unwrap()
    }

    fn apply(state: &mut MarketState, line: &str) {
        let msg = serde_json::from_str(line).unwrap();
        let mut deltas = Vec::new();
        state.apply_message(&msg, Decimal::ONE, &mut deltas);
    }

    const TICK: &str = r#"{"op":"mcm","id":1,"pt":1,"mc":[{"id":"1.1","rc":[{"id":10,"ltp":2.5}]}]}"#;

    #[test]
    fn raw_lines_land_in_per_market_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut rec = recorder(dir.path());

        rec.record_raw(TICK);
        rec.record_raw(
            r#"{"op":"mcm","id":2,"pt":2,"mc":[{"id":"1.1","rc":[]},{"id":"1.2","rc":[]}]}"#,
        );
        // non-market frames are skipped
        rec.record_raw(r#"{"op":"status","id":1,"statusCode":"SUCCESS"}"#);
        rec.record_raw("not json");
        rec.flush();

        let first = fs::read_to_string(dir.path().join("1.1.jsonl")).unwrap();
        assert_eq!(first.lines().count(), 2);
        let second = fs::read_to_string(dir.path().join("1.2.jsonl")).unwrap();
        assert_eq!(second.lines().count(), 1);
    }

    #[test]
    fn snapshots_written_on_market_change() {
        let dir = tempfile::tempdir().unwrap();
        let mut rec = recorder(dir.path());
        let mut state = MarketState::new();
        apply(&mut state, TICK);

        rec.on_market_change(&state, &[]);

        let snapshot = fs::read_to_string(dir.path().join("1.1.snap.json")).unwrap();
        let value: Value = serde_json::from_str(&snapshot).unwrap();
        assert!(value["recordedAt"].is_string());
        assert_eq!(value["market"]["market_id"], "1.1");
    }

    #[test]
    fn completion_finalizes_and_stops_recording() {
        let dir = tempfile::tempdir().unwrap();
        let mut rec = recorder(dir.path());
        let mut state = MarketState::new();
        apply(&mut state, TICK);
        rec.record_raw(TICK);
        rec.on_market_change(&state, &[]);

        apply(
            &mut state,
            r#"{"op":"mcm","id":2,"pt":2,"mc":[{"id":"1.1",
                "marketDefinition":{"status":"CLOSED","runners":[{"id":10,"status":"WINNER"}]}}]}"#,
        );
        rec.on_market_change(&state, &[]);
        assert!(rec.finished().contains(&MarketId::new("1.1")));

        // later frames for a finished market are ignored
        rec.record_raw(TICK);
        rec.flush();
        let raw = fs::read_to_string(dir.path().join("1.1.jsonl")).unwrap();
        assert_eq!(raw.lines().count(), 1);

        // the final snapshot reflects the completed state
        let snapshot = fs::read_to_string(dir.path().join("1.1.snap.json")).unwrap();
        let value: Value = serde_json::from_str(&snapshot).unwrap();
        assert_eq!(value["market"]["completed"], true);
    }

    #[test]
    fn snapshot_interval_throttles_rewrites() {
        let dir = tempfile::tempdir().unwrap();
        let mut rec = MarketRecorder::new(
            RecorderConfig::new(dir.path()).with_snapshot_interval(Duration::from_secs(3600)),
        )
        .unwrap();
        let mut state = MarketState::new();
        apply(&mut state, TICK);

        rec.on_market_change(&state, &[]);
        let first = fs::read_to_string(dir.path().join("1.1.snap.json")).unwrap();

        apply(
            &mut state,
            r#"{"op":"mcm","id":2,"pt":2,"mc":[{"id":"1.1","rc":[{"id":10,"ltp":9.8}]}]}"#,
        );
        rec.on_market_change(&state, &[]);
        let second = fs::read_to_string(dir.path().join("1.1.snap.json")).unwrap();
        assert_eq!(first, second, "within the interval the snapshot stands");
    }
}
