//! Acquisition thread: the periodic timer that owns the chip.
//!
//! The driver busy-waits and the simulated pins are `!Send`, so the whole
//! loop lives on one OS thread. Only finished [`Sample`]s cross into the
//! async side, over a broadcast channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Utc};
use loadcell_driver::sim::SimHx711;
use loadcell_driver::{Calibration, Hx711, Outcome, Reading, Sampler};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::config::{Config, SimConfig};

/// One published reading
#[derive(Debug, Clone, Serialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    /// Sign-extended 24-bit count
    pub raw: i32,
    /// Calibrated value
    pub value: f32,
}

impl Sample {
    pub fn new(reading: Reading, calibration: &Calibration) -> Self {
        Self {
            timestamp: Utc::now(),
            raw: reading.value(),
            value: calibration.apply(reading),
        }
    }
}

/// Start the acquisition thread. It exits at the first tick after `stop` is set.
pub fn spawn(
    config: Config,
    tx: broadcast::Sender<Sample>,
    stop: Arc<AtomicBool>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("acquisition".into())
        .spawn(move || run(&config, &tx, &stop))
}

fn run(config: &Config, tx: &broadcast::Sender<Sample>, stop: &AtomicBool) {
    let sim = SimHx711::new(config.sim.conversion_period_us);
    let (sck, dout, delay) = sim.pins();
    let mut hx711 = Hx711::with_timing(sck, dout, delay, config.timing);

    match hx711.probe() {
        Ok(true) => tracing::info!("HX711 detected"),
        Ok(false) => tracing::warn!("HX711 probe failed, continuing anyway"),
        Err(e) => {
            tracing::error!("HX711 probe: {}", e);
            return;
        }
    }
    if let Err(e) = hx711.initialize() {
        tracing::warn!("HX711 initialization failed: {}", e);
    }

    let mut sampler = Sampler::new(config.attempts_per_sample, config.max_consecutive_failures);
    let mut tick: u64 = 0;

    while !stop.load(Ordering::Relaxed) {
        tick += 1;
        drive_simulation(&sim, &config.sim, tick);

        let mut publisher = |reading: Reading| {
            // No subscribers is fine, the sample is just dropped
            let _ = tx.send(Sample::new(reading, &config.calibration));
        };

        match sampler.sample(&mut hx711, &mut publisher) {
            Ok(Outcome::Published(reading)) => tracing::trace!("tick {}: {}", tick, reading),
            Ok(Outcome::Skipped) => tracing::debug!("tick {}: no reading", tick),
            Ok(Outcome::Reinitialized) => {
                tracing::warn!("tick {}: too many failures, HX711 reinitialized", tick)
            }
            Err(e) => {
                tracing::error!("tick {}: {}", tick, e);
                break;
            }
        }

        thread::sleep(config.sample_interval);
    }

    tracing::info!("Acquisition stopped after {} ticks: {:?}", tick, hx711.diagnostics());
}

/// Feed the simulated chip a slow sine load and scheduled stalls.
fn drive_simulation(sim: &SimHx711, config: &SimConfig, tick: u64) {
    let phase = tick as f64 * 0.05;
    let load = f64::from(config.baseline) + f64::from(config.amplitude) * phase.sin();
    sim.set_load(load as i32);

    if config.stall_every != 0 && tick % config.stall_every == 0 {
        tracing::debug!("tick {}: stalling simulated HX711 for {} power cycles", tick, config.stall_length);
        sim.stall(config.stall_length);
    }
}
