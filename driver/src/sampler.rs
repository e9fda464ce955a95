//! Periodic sampling policy around [`Hx711`].
//!
//! One [`Sampler::sample`] call per timer tick: read with retry, hand good
//! readings to the publisher, and reinitialize the chip after too many
//! failed ticks in a row.

use core::fmt::Debug;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use log::warn;

use crate::error::Error;
use crate::hx711::Hx711;
use crate::reading::Reading;

/// Downstream consumer of good readings
pub trait Publish {
    fn publish(&mut self, reading: Reading);
}

impl<F> Publish for F
where
    F: FnMut(Reading),
{
    fn publish(&mut self, reading: Reading) {
        self(reading)
    }
}

/// What one tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Published(Reading),
    /// Read failed, nothing published
    Skipped,
    /// Read failed and the failure limit was hit; the chip was reinitialized
    Reinitialized,
}

/// Consecutive-failure policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sampler {
    attempts_per_sample: u8,
    max_consecutive_failures: u8,
    consecutive_failures: u8,
}

impl Default for Sampler {
    fn default() -> Self {
        Self::new(3, 5)
    }
}

impl Sampler {
    /// A zero failure limit is treated as one.
    pub fn new(attempts_per_sample: u8, max_consecutive_failures: u8) -> Self {
        Self {
            attempts_per_sample,
            max_consecutive_failures: max_consecutive_failures.max(1),
            consecutive_failures: 0,
        }
    }

    pub fn consecutive_failures(&self) -> u8 {
        self.consecutive_failures
    }

    /// Run one tick. Only GPIO errors are returned.
    pub fn sample<SCK, DT, D, E, P>(
        &mut self,
        hx711: &mut Hx711<SCK, DT, D>,
        publisher: &mut P,
    ) -> Result<Outcome, Error<E>>
    where
        SCK: OutputPin<Error = E>,
        DT: InputPin<Error = E>,
        D: DelayNs,
        E: Debug,
        P: Publish,
    {
        match hx711.read_with_retry(self.attempts_per_sample) {
            Ok(reading) => {
                self.consecutive_failures = 0;
                publisher.publish(reading);
                Ok(Outcome::Published(reading))
            }
            Err(Error::Pin(e)) => Err(Error::Pin(e)),
            Err(e) => {
                self.consecutive_failures += 1;
                warn!(
                    "HX711 sample failed ({:?}), {}/{} consecutive failures",
                    e, self.consecutive_failures, self.max_consecutive_failures
                );

                if self.consecutive_failures < self.max_consecutive_failures {
                    return Ok(Outcome::Skipped);
                }

                self.consecutive_failures = 0;
                match hx711.initialize() {
                    Ok(()) => {}
                    Err(Error::Pin(e)) => return Err(Error::Pin(e)),
                    Err(e) => warn!("HX711 reinitialization failed: {:?}", e),
                }
                Ok(Outcome::Reinitialized)
            }
        }
    }
}
