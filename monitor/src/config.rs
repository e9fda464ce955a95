use std::str::FromStr;
use std::time::Duration;

use loadcell_driver::{Calibration, Timing};
use thiserror::Error;

/// Monitor configuration, read from `LOADCELL_*` environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Timer period between samples
    pub sample_interval: Duration,
    /// Reads per sample before giving up
    pub attempts_per_sample: u8,
    /// Failed samples in a row before reinitializing the chip
    pub max_consecutive_failures: u8,
    pub calibration: Calibration,
    pub timing: Timing,
    pub sim: SimConfig,
}

/// Simulated chip behaviour
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub conversion_period_us: u32,
    /// Centre of the synthetic load waveform, in raw counts
    pub baseline: i32,
    /// Peak deviation of the synthetic load waveform, in raw counts
    pub amplitude: i32,
    /// Stall the chip every N ticks (0 disables)
    pub stall_every: u64,
    /// Power cycles each stall lasts
    pub stall_length: u32,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys take their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Timing::default();
        let timing = Timing {
            settle_us: parse(&lookup, "LOADCELL_SETTLE_US", defaults.settle_us)?,
            ready_poll_iterations: parse(&lookup, "LOADCELL_READY_POLL_ITERATIONS", defaults.ready_poll_iterations)?,
            power_up_ms: parse(&lookup, "LOADCELL_POWER_UP_MS", defaults.power_up_ms)?,
            power_down_hold_us: parse(&lookup, "LOADCELL_POWER_DOWN_HOLD_US", defaults.power_down_hold_us)?,
            retry_delay_ms: parse(&lookup, "LOADCELL_RETRY_DELAY_MS", defaults.retry_delay_ms)?,
            strict_verify: parse(&lookup, "LOADCELL_STRICT_VERIFY", defaults.strict_verify)?,
            ..defaults
        };

        let cal = Calibration::default();
        let calibration = Calibration {
            offset: parse(&lookup, "LOADCELL_OFFSET", cal.offset)?,
            scale: parse(&lookup, "LOADCELL_SCALE", cal.scale)?,
        };

        let sim = SimConfig {
            conversion_period_us: parse(&lookup, "LOADCELL_SIM_CONVERSION_US", 12_500)?,
            baseline: parse(&lookup, "LOADCELL_SIM_BASELINE", calibration.offset)?,
            amplitude: parse(&lookup, "LOADCELL_SIM_AMPLITUDE", 200_000)?,
            stall_every: parse(&lookup, "LOADCELL_SIM_STALL_EVERY", 0)?,
            stall_length: parse(&lookup, "LOADCELL_SIM_STALL_LENGTH", 2)?,
        };

        Ok(Self {
            sample_interval: Duration::from_millis(parse(&lookup, "LOADCELL_SAMPLE_INTERVAL_MS", 100)?),
            attempts_per_sample: parse(&lookup, "LOADCELL_ATTEMPTS", 3)?,
            max_consecutive_failures: parse(&lookup, "LOADCELL_MAX_FAILURES", 5)?,
            calibration,
            timing: timing.sanitized(),
            sim,
        })
    }
}

fn parse<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}
