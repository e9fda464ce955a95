//! HX711 bit-banged driver.
//!
//! Protocol summary (datasheet, gain 128 on channel A):
//! - SCK low, wait for DOUT low (conversion ready)
//! - 24 pulses, DOUT sampled after each falling edge, MSB first
//! - 1 more pulse selects gain/channel for the next conversion
//! - DOUT returns high until the next conversion completes

use core::fmt::Debug;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use log::{debug, info, warn};

use crate::error::Error;
use crate::reading::Reading;
use crate::timing::{Timing, DATA_BITS};

/// Gain/channel selected by the pulses after the data bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Gain {
    /// Channel A, gain 128 (25 pulses)
    #[default]
    A128,
    /// Channel B, gain 32 (26 pulses)
    B32,
    /// Channel A, gain 64 (27 pulses)
    A64,
}

impl Gain {
    /// Pulses issued after the 24 data bits.
    pub const fn extra_pulses(self) -> u8 {
        match self {
            Gain::A128 => 1,
            Gain::B32 => 2,
            Gain::A64 => 3,
        }
    }

    /// Total pulses per transfer.
    pub const fn total_pulses(self) -> u8 {
        DATA_BITS + self.extra_pulses()
    }
}

/// Last known state of the chip, as far as the host can tell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    PoweredDown,
    PoweredUp,
    Ready,
    Fault,
}

/// Running counters, never reset by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Diagnostics {
    /// Reads that gave up waiting for DOUT
    pub timeouts: u32,
    /// Power-down/power-up cycles issued for recovery
    pub power_cycles: u32,
    /// Calls to [`Hx711::initialize`]
    pub initializations: u32,
    /// Transfers after which DOUT did not go high
    pub unverified_transfers: u32,
}

/// HX711 on two GPIO lines
pub struct Hx711<SCK, DT, D> {
    sck: SCK,
    dout: DT,
    delay: D,
    timing: Timing,
    gain: Gain,
    state: DeviceState,
    diagnostics: Diagnostics,
}

impl<SCK, DT, D, E> Hx711<SCK, DT, D>
where
    SCK: OutputPin<Error = E>,
    DT: InputPin<Error = E>,
    D: DelayNs,
    E: Debug,
{
    pub fn new(sck: SCK, dout: DT, delay: D) -> Self {
        Self::with_timing(sck, dout, delay, Timing::default())
    }

    pub fn with_timing(sck: SCK, dout: DT, delay: D, timing: Timing) -> Self {
        Self {
            sck,
            dout,
            delay,
            timing: timing.sanitized(),
            gain: Gain::default(),
            // Pin state unknown until the first power command
            state: DeviceState::PoweredDown,
            diagnostics: Diagnostics::default(),
        }
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    pub fn gain(&self) -> Gain {
        self.gain
    }

    /// Takes effect for the conversion after the next transfer.
    pub fn set_gain(&mut self, gain: Gain) {
        self.gain = gain;
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn diagnostics(&self) -> Diagnostics {
        self.diagnostics
    }

    /// Give back the pins and delay.
    pub fn release(self) -> (SCK, DT, D) {
        (self.sck, self.dout, self.delay)
    }

    /// Pull SCK low and wait for the chip to wake up.
    pub fn power_up(&mut self) -> Result<(), Error<E>> {
        self.clock_low()?;
        self.delay.delay_ms(self.timing.power_up_ms);
        self.state = DeviceState::PoweredUp;
        Ok(())
    }

    /// Hold SCK high past the power-down threshold. SCK is left high.
    pub fn power_down(&mut self) -> Result<(), Error<E>> {
        self.clock_high()?;
        self.delay.delay_us(self.timing.power_down_hold_us);
        self.state = DeviceState::PoweredDown;
        Ok(())
    }

    /// Single DOUT sample; low means a conversion is waiting.
    pub fn is_ready(&mut self) -> Result<bool, Error<E>> {
        let ready = self.dout.is_low().map_err(Error::Pin)?;
        if ready {
            self.state = DeviceState::Ready;
        }
        Ok(ready)
    }

    /// Power up and wait for the first conversion.
    pub fn initialize(&mut self) -> Result<(), Error<E>> {
        self.diagnostics.initializations += 1;
        self.clock_low()?;
        self.power_up()?;

        if self.wait_ready(self.timing.init_poll_delay_us)? {
            info!("HX711 initialized");
            Ok(())
        } else {
            warn!("HX711 not responding during initialization");
            self.state = DeviceState::Fault;
            Err(Error::InitTimeout)
        }
    }

    /// One full transfer: wait for data ready, clock out 24 bits, select gain.
    pub fn read_once(&mut self) -> Result<Reading, Error<E>> {
        self.clock_low()?;
        self.delay.delay_us(self.timing.settle_us);

        if !self.wait_ready(self.timing.ready_poll_delay_us)? {
            debug!("HX711 DOUT stayed high for {} polls", self.timing.ready_poll_iterations);
            self.diagnostics.timeouts += 1;
            self.state = DeviceState::Fault;
            return Err(Error::ReadTimeout);
        }

        let mut raw: u32 = 0;
        for _ in 0..DATA_BITS {
            self.clock_high()?;
            self.delay.delay_us(self.timing.clock_high_us);
            raw <<= 1;
            self.clock_low()?;
            self.delay.delay_us(self.timing.clock_low_us);
            // Sample after the falling edge
            if self.dout.is_high().map_err(Error::Pin)? {
                raw |= 1;
            }
        }

        for _ in 0..self.gain.extra_pulses() {
            self.pulse()?;
        }
        self.state = DeviceState::PoweredUp;

        // DOUT should be high again while the next conversion runs
        self.delay.delay_us(self.timing.verify_delay_us);
        if self.dout.is_low().map_err(Error::Pin)? {
            self.diagnostics.unverified_transfers += 1;
            warn!("HX711 DOUT still low after transfer (raw {:#08x})", raw);
            if self.timing.strict_verify {
                return Err(Error::Communication);
            }
        }

        Ok(Reading::from_raw(raw))
    }

    /// Up to `max_attempts` reads, power cycling after each timeout.
    ///
    /// Returns the first good reading or the last error. GPIO errors are
    /// returned immediately. A zero attempt count still reads once.
    pub fn read_with_retry(&mut self, max_attempts: u8) -> Result<Reading, Error<E>> {
        let attempts = max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let err = match self.read_once() {
                Ok(reading) => return Ok(reading),
                Err(Error::Pin(e)) => return Err(Error::Pin(e)),
                Err(e) => e,
            };
            debug!("HX711 read attempt {}/{} failed: {:?}", attempt, attempts, err);

            if err.is_timeout() {
                self.power_cycle()?;
            }
            self.delay.delay_ms(self.timing.retry_delay_ms);

            if attempt >= attempts {
                return Err(err);
            }
            attempt += 1;
        }
    }

    /// Power down, short gap, power up.
    pub fn power_cycle(&mut self) -> Result<(), Error<E>> {
        self.diagnostics.power_cycles += 1;
        self.power_down()?;
        self.delay.delay_us(self.timing.power_cycle_gap_us);
        self.power_up()
    }

    /// Check that something HX711-shaped is on the lines.
    ///
    /// A powered-down chip drives DOUT high, and a powered-up one pulls it
    /// low once a conversion completes. A floating or shorted DOUT fails one
    /// of the two checks. Leaves the chip powered up.
    pub fn probe(&mut self) -> Result<bool, Error<E>> {
        self.clock_low()?;
        self.delay.delay_us(self.timing.settle_us);

        self.power_down()?;
        self.delay.delay_us(self.timing.power_cycle_gap_us);
        let idle_high = self.dout.is_high().map_err(Error::Pin)?;

        self.power_up()?;
        let ready = self.wait_ready(self.timing.init_poll_delay_us)?;

        debug!("HX711 probe: DOUT high in power-down: {}, ready after power-up: {}", idle_high, ready);
        if !ready {
            self.state = DeviceState::Fault;
        }
        Ok(idle_high && ready)
    }

    /// Poll DOUT up to the configured bound.
    fn wait_ready(&mut self, poll_delay_us: u32) -> Result<bool, Error<E>> {
        for _ in 0..self.timing.ready_poll_iterations {
            if self.is_ready()? {
                return Ok(true);
            }
            self.delay.delay_us(poll_delay_us);
        }
        self.is_ready()
    }

    fn pulse(&mut self) -> Result<(), Error<E>> {
        self.clock_high()?;
        self.delay.delay_us(self.timing.clock_high_us);
        self.clock_low()?;
        self.delay.delay_us(self.timing.clock_low_us);
        Ok(())
    }

    fn clock_high(&mut self) -> Result<(), Error<E>> {
        self.sck.set_high().map_err(Error::Pin)
    }

    fn clock_low(&mut self) -> Result<(), Error<E>> {
        self.sck.set_low().map_err(Error::Pin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimClock, SimData, SimDelay, SimHx711};

    type SimDriver = Hx711<SimClock, SimData, SimDelay>;

    fn driver(sim: &SimHx711, timing: Timing) -> SimDriver {
        let (sck, dout, delay) = sim.pins();
        Hx711::with_timing(sck, dout, delay, timing)
    }

    #[test]
    fn test_read_once_issues_25_pulses() {
        let sim = SimHx711::default();
        sim.push_sample(1234);
        let mut hx = driver(&sim, Timing::default());

        let before = sim.pulses();
        let reading = hx.read_once().unwrap();

        assert_eq!(reading.value(), 1234);
        assert_eq!(sim.pulses() - before, 25);
        assert_eq!(sim.gain_pulses(), 1);
        assert_eq!(hx.state(), DeviceState::PoweredUp);
        assert_eq!(hx.diagnostics().unverified_transfers, 0);
    }

    #[test]
    fn test_read_once_negative_values() {
        let sim = SimHx711::default();
        sim.push_sample(-8_388_607);
        sim.push_sample(-1);
        let mut hx = driver(&sim, Timing::default());

        assert_eq!(hx.read_once().unwrap().value(), -8_388_607);
        // Next conversion is 12.5ms away, well inside the poll bound
        assert_eq!(hx.read_once().unwrap().value(), -1);
        assert_eq!(sim.transfers(), 2);
    }

    #[test]
    fn test_read_once_timeout_issues_no_pulses() {
        let sim = SimHx711::default();
        sim.set_dout_stuck(Some(true));
        let mut hx = driver(&sim, Timing::default());

        let before = sim.pulses();
        assert_eq!(hx.read_once(), Err(Error::ReadTimeout));
        assert_eq!(sim.pulses(), before);
        assert_eq!(hx.state(), DeviceState::Fault);
        assert_eq!(hx.diagnostics().timeouts, 1);
    }

    #[test]
    fn test_gain_selects_extra_pulses() {
        let sim = SimHx711::default();
        let mut hx = driver(&sim, Timing::default());
        hx.set_gain(Gain::B32);

        let before = sim.pulses();
        hx.read_once().unwrap();
        assert_eq!(sim.pulses() - before, u32::from(Gain::B32.total_pulses()));
        assert_eq!(sim.gain_pulses(), 2);

        hx.set_gain(Gain::A64);
        let before = sim.pulses();
        hx.read_once().unwrap();
        assert_eq!(sim.pulses() - before, 27);
        assert_eq!(sim.gain_pulses(), 3);
    }

    #[test]
    fn test_retry_recovers_after_two_timeouts() {
        let sim = SimHx711::default();
        sim.stall(2);
        sim.set_load(-500);
        let mut hx = driver(&sim, Timing::default());

        let reading = hx.read_with_retry(3).unwrap();

        assert_eq!(reading.value(), -500);
        assert_eq!(sim.power_downs(), 2);
        assert_eq!(hx.diagnostics().power_cycles, 2);
        assert_eq!(hx.diagnostics().timeouts, 2);
        assert_eq!(sim.transfers(), 1);
    }

    #[test]
    fn test_retry_returns_last_error() {
        let sim = SimHx711::default();
        sim.set_dout_stuck(Some(true));
        let mut hx = driver(&sim, Timing::default());

        assert_eq!(hx.read_with_retry(3), Err(Error::ReadTimeout));
        assert_eq!(hx.diagnostics().timeouts, 3);
        assert_eq!(hx.diagnostics().power_cycles, 3);
    }

    #[test]
    fn test_retry_zero_attempts_reads_once() {
        let sim = SimHx711::default();
        sim.set_load(7);
        let mut hx = driver(&sim, Timing::default());

        assert_eq!(hx.read_with_retry(0).unwrap().value(), 7);
    }

    #[test]
    fn test_retry_does_not_power_cycle_on_communication_error() {
        // Zero conversion period: DOUT is low again right after the transfer
        let sim = SimHx711::new(0);
        let timing = Timing {
            strict_verify: true,
            ..Timing::default()
        };
        let mut hx = driver(&sim, timing);

        assert_eq!(hx.read_with_retry(2), Err(Error::Communication));
        assert_eq!(hx.diagnostics().power_cycles, 0);
        assert_eq!(hx.diagnostics().unverified_transfers, 2);
    }

    #[test]
    fn test_unverified_transfer_is_advisory() {
        let sim = SimHx711::new(0);
        sim.set_load(42);
        let mut hx = driver(&sim, Timing::default());

        assert_eq!(hx.read_once().unwrap().value(), 42);
        assert_eq!(hx.diagnostics().unverified_transfers, 1);
    }

    #[test]
    fn test_power_down_holds_clock_high() {
        let sim = SimHx711::default();
        let mut hx = driver(&sim, Timing::default());

        hx.power_down().unwrap();
        assert!(sim.sck_high_for_us() >= 60);
        assert!(!sim.is_powered());
        assert_eq!(hx.state(), DeviceState::PoweredDown);

        hx.power_up().unwrap();
        assert!(sim.is_powered());
        assert_eq!(hx.state(), DeviceState::PoweredUp);
    }

    #[test]
    fn test_power_down_hold_is_clamped() {
        let sim = SimHx711::default();
        let timing = Timing {
            power_down_hold_us: 5,
            ..Timing::default()
        };
        let mut hx = driver(&sim, timing);

        hx.power_down().unwrap();
        assert!(!sim.is_powered());
    }

    #[test]
    fn test_is_ready_samples_dout() {
        let sim = SimHx711::default();
        let mut hx = driver(&sim, Timing::default());
        assert!(hx.is_ready().unwrap());
        assert_eq!(hx.state(), DeviceState::Ready);

        sim.set_dout_stuck(Some(true));
        assert!(!hx.is_ready().unwrap());
    }

    #[test]
    fn test_initialize() {
        let sim = SimHx711::default();
        let mut hx = driver(&sim, Timing::default());
        hx.power_down().unwrap();

        hx.initialize().unwrap();
        assert_eq!(hx.state(), DeviceState::Ready);
        assert_eq!(hx.diagnostics().initializations, 1);
    }

    #[test]
    fn test_initialize_timeout() {
        let sim = SimHx711::default();
        sim.set_dout_stuck(Some(true));
        let timing = Timing {
            ready_poll_iterations: 100,
            ..Timing::default()
        };
        let mut hx = driver(&sim, timing);

        assert_eq!(hx.initialize(), Err(Error::InitTimeout));
        assert_eq!(hx.state(), DeviceState::Fault);
    }

    #[test]
    fn test_probe() {
        let sim = SimHx711::default();
        let mut hx = driver(&sim, Timing::default());
        assert!(hx.probe().unwrap());
        assert!(sim.is_powered());

        sim.set_dout_stuck(Some(false));
        assert!(!hx.probe().unwrap());

        sim.set_dout_stuck(Some(true));
        assert!(!hx.probe().unwrap());
        assert_eq!(hx.state(), DeviceState::Fault);
    }

    #[test]
    fn test_release_returns_pins() {
        let sim = SimHx711::default();
        let hx = driver(&sim, Timing::default());
        let (mut sck, _dout, _delay) = hx.release();
        sck.set_high().unwrap();
        assert_eq!(sim.pulses(), 1);
    }
}
