//! Shared helpers for stream integration tests.
#![allow(dead_code)] // each test binary uses a subset of the helpers

use betstream::{Credentials, StreamConfig, StreamSession};
use tokio::io::{AsyncWriteExt, DuplexStream};

/// A session wired to an in-memory pipe; returns the server half.
pub fn piped_session(session: &mut StreamSession) -> DuplexStream {
    let (client, server) = tokio::io::duplex(256 * 1024);
    let (reader, writer) = tokio::io::split(client);
    session.attach(reader, writer);
    server
}

pub fn test_session() -> StreamSession {
    StreamSession::new(
        StreamConfig::default(),
        Credentials::new("test-app-key", "test-session-token"),
    )
}

/// Write one CRLF-terminated frame to the server half.
pub async fn send_frame(server: &mut DuplexStream, frame: &str) {
    server.write_all(frame.as_bytes()).await.unwrap();
    server.write_all(b"\r\n").await.unwrap();
}

/// A market change frame carrying one runner tick.
pub fn tick_frame(request_id: i64, market: &str, runner: i64, ltp: &str) -> String {
    format!(
        r#"{{"op":"mcm","id":{request_id},"pt":{request_id},"mc":[{{"id":"{market}","rc":[{{"id":{runner},"ltp":{ltp}}}]}}]}}"#
    )
}

/// A segmented market change frame. `segmentation` is e.g.
/// `Some("SEG_START")`, `None` for a middle segment.
pub fn segment_frame(request_id: i64, segmentation: Option<&str>, mc_body: &str) -> String {
    match segmentation {
        Some(marker) => format!(
            r#"{{"op":"mcm","id":{request_id},"segmentationType":"{marker}","mc":[{mc_body}]}}"#
        ),
        None => format!(r#"{{"op":"mcm","id":{request_id},"mc":[{mc_body}]}}"#),
    }
}
