//! Capture tool: subscribe to markets and record raw frames plus periodic
//! snapshots to disk.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use parking_lot::Mutex;
use tokio::signal;
use tracing::{error, info};

use betstream::domain::MarketId;
use betstream::{Config, Credentials, MarketRecorder, RecorderConfig, StreamSession};

#[derive(Parser)]
#[command(
    name = "betstream-dump",
    about = "Record betting exchange stream markets to disk."
)]
struct Args {
    /// Config file path. Defaults are used when the file is missing.
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Output directory for raw streams and snapshots.
    #[arg(long, default_value = "capture")]
    out: PathBuf,

    /// Snapshot rewrite interval in seconds.
    #[arg(long, default_value_t = 60)]
    snapshot_secs: u64,

    /// Market ids to record (form 1.<digits>).
    #[arg(required = true)]
    markets: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    let config = if args.config.exists() {
        Config::load(&args.config)?
    } else {
        Config::default()
    };
    config.logging.init();

    let market_ids: Vec<MarketId> = args.markets.iter().cloned().map(MarketId::new).collect();
    for market_id in &market_ids {
        anyhow::ensure!(
            market_id.is_well_formed(),
            "malformed market id {market_id}"
        );
    }

    let credentials = Credentials::from_env().context("stream credentials")?;

    let recorder = Arc::new(Mutex::new(MarketRecorder::new(
        RecorderConfig::new(&args.out)
            .with_snapshot_interval(Duration::from_secs(args.snapshot_secs)),
    )?));

    let raw_recorder = recorder.clone();
    let change_recorder = recorder.clone();
    let mut session = StreamSession::new(config.stream.clone(), credentials)
        .on_raw_data(move |line| raw_recorder.lock().record_raw(line))
        .on_market_change(move |markets, deltas| {
            change_recorder.lock().on_market_change(markets, deltas);
        });

    session.connect().await?;
    session.authenticate().await?;
    session.subscribe_markets(&market_ids).await?;
    info!(markets = market_ids.len(), out = %args.out.display(), "recording");

    tokio::select! {
        result = session.run() => {
            if let Err(e) = result {
                error!(error = %e, "stream ended");
            }
        }
        _ = signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    session.close().await?;
    recorder.lock().flush();
    Ok(())
}
