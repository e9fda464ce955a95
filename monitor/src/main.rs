//! Load-cell monitor
//!
//! Runs the HX711 acquisition loop on a timer against a simulated chip and
//! publishes every good reading as one JSON line on stdout.
//!
//! # Usage
//! ```bash
//! LOADCELL_SIM_STALL_EVERY=20 RUST_LOG=loadcell_driver=debug cargo run -p loadcell-monitor
//! ```

mod acquisition;
mod config;

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::acquisition::Sample;
use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing (driver `log` records are bridged in)
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "loadcell_monitor=info,loadcell_driver=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Load-cell monitor sampling every {:?}", config.sample_interval);
    tracing::debug!("{:?}", config);

    // Broadcast channel for published readings
    let (sample_tx, sample_rx) = broadcast::channel::<Sample>(100);
    let output = tokio::spawn(write_samples(sample_rx));

    let stop = Arc::new(AtomicBool::new(false));
    let acquisition = acquisition::spawn(config, sample_tx, stop.clone())
        .context("failed to start acquisition thread")?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    stop.store(true, Ordering::Relaxed);

    tokio::task::spawn_blocking(move || acquisition.join())
        .await?
        .map_err(|_| anyhow::anyhow!("acquisition thread panicked"))?;
    output.await??;

    Ok(())
}

/// Write each sample as a JSON line until the acquisition side hangs up.
async fn write_samples(mut rx: broadcast::Receiver<Sample>) -> anyhow::Result<()> {
    loop {
        match rx.recv().await {
            Ok(sample) => {
                let line = serde_json::to_string(&sample)?;
                writeln!(std::io::stdout(), "{}", line)?;
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("Output lagging, dropped {} samples", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => return Ok(()),
        }
    }
}
