//! Betstream - betting exchange stream client.
//!
//! # Architecture
//!
//! ```text
//! src/
//! ├── domain/           # Identifier newtypes, money aliases, tick ladder
//! ├── protocol/         # Wire DTOs, frame classification, segmentation
//! ├── cache/            # Market and order caches with merge semantics
//! ├── decoder.rs        # Segment buffer + cache dispatch + delta lists
//! ├── session/          # TLS transport, protocol state machine, heartbeat
//! ├── recorder.rs       # Raw frame + snapshot writer
//! └── config.rs         # TOML configuration + logging setup
//! ```
//!
//! Data flows inbound-driven: TLS byte stream → line framer → frame
//! classifier → (raw tap) → segment buffer → cache merge → callback. A
//! session owns its caches exclusively; callbacks receive borrows for the
//! duration of the call.

pub mod cache;
pub mod config;
pub mod decoder;
pub mod domain;
pub mod error;
pub mod protocol;
pub mod recorder;
pub mod session;

pub use cache::{MarketState, OrderState};
pub use config::{Config, Credentials, CurrencyConfig, LoggingConfig, StreamConfig};
pub use decoder::{Decoder, StreamEvent};
pub use error::{Error, Result};
pub use recorder::{MarketRecorder, RecorderConfig};
pub use session::{HeartbeatMonitor, SessionPhase, StreamSession};
