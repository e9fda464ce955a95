//! Acquisition loop for an HX711 load-cell amplifier.
//!
//! The HX711 talks over two lines:
//! - SCK - clock, driven by the host (active high)
//! - DOUT - data, driven by the chip (low when a conversion is ready)
//!
//! A transfer is 24 data bits, MSB first, followed by 1-3 extra clock
//! pulses that select gain/channel for the next conversion. Holding SCK
//! high for more than 60us powers the chip down; pulling it low again
//! powers it back up.
//!
//! The driver is blocking and busy-waits through [`embedded_hal::delay::DelayNs`].
//! Callers own scheduling: one [`Hx711`] per chip, never called concurrently.

#![cfg_attr(not(test), no_std)]

#[cfg(any(test, feature = "sim"))]
extern crate alloc;

pub mod calibration;
pub mod error;
pub mod hx711;
pub mod reading;
pub mod sampler;
#[cfg(any(test, feature = "sim"))]
pub mod sim;
pub mod timing;

pub use calibration::Calibration;
pub use error::Error;
pub use hx711::{DeviceState, Diagnostics, Gain, Hx711};
pub use reading::{legacy_code, Reading, COMM_ERROR_SENTINEL, TIMEOUT_SENTINEL};
pub use sampler::{Outcome, Publish, Sampler};
pub use timing::Timing;
