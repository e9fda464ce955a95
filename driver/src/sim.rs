//! Simulated HX711 for host builds and tests.
//!
//! The clock pin, data pin and delay share one chip model. Time only moves
//! when the driver delays, so a 50 ms ready-poll timeout costs no wall time.
//!
//! Modelled behaviour:
//! - SCK high for >= 60us powers the chip down, SCK low powers it back up
//! - a conversion is ready one conversion period after power-up or after
//!   the previous transfer
//! - rising edges shift out 24 bits MSB first, then count gain pulses
//! - stalls keep DOUT high until the next power-down

use alloc::collections::VecDeque;
use alloc::rc::Rc;
use core::cell::RefCell;
use core::convert::Infallible;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, InputPin, OutputPin};

use crate::reading::Reading;
use crate::timing::{DATA_BITS, POWER_DOWN_THRESHOLD_US};

/// 80 SPS
pub const DEFAULT_CONVERSION_PERIOD_US: u32 = 12_500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Shifting { word: u32, sent: u8 },
    GainSelect,
}

struct Chip {
    now_ns: u64,
    sck_high: bool,
    sck_high_since_ns: u64,
    powered: bool,
    ready_at_ns: u64,
    conversion_period_ns: u64,
    phase: Phase,
    dout_bit: bool,
    stalls: u32,
    stuck: Option<bool>,
    samples: VecDeque<i32>,
    load: i32,
    pulses: u32,
    gain_pulses: u8,
    power_downs: u32,
    transfers: u32,
}

impl Chip {
    fn new(conversion_period_us: u32) -> Self {
        Self {
            now_ns: 0,
            sck_high: false,
            sck_high_since_ns: 0,
            powered: true,
            ready_at_ns: 0,
            conversion_period_ns: u64::from(conversion_period_us) * 1_000,
            phase: Phase::Idle,
            dout_bit: true,
            stalls: 0,
            stuck: None,
            samples: VecDeque::new(),
            load: 0,
            pulses: 0,
            gain_pulses: 0,
            power_downs: 0,
            transfers: 0,
        }
    }

    fn conversion_ready(&self) -> bool {
        self.powered && self.stalls == 0 && self.now_ns >= self.ready_at_ns
    }

    fn advance(&mut self, ns: u64) {
        self.now_ns += ns;
        self.check_power_down();
    }

    fn check_power_down(&mut self) {
        let hold_ns = u64::from(POWER_DOWN_THRESHOLD_US) * 1_000;
        if self.powered && self.sck_high && self.now_ns - self.sck_high_since_ns >= hold_ns {
            self.powered = false;
            self.phase = Phase::Idle;
            self.power_downs += 1;
            self.stalls = self.stalls.saturating_sub(1);
        }
    }

    fn rising_edge(&mut self) {
        self.sck_high = true;
        self.sck_high_since_ns = self.now_ns;
        self.pulses += 1;
        if !self.powered {
            return;
        }

        match self.phase {
            Phase::Shifting { word, sent } if sent < DATA_BITS => {
                self.dout_bit = word & (1 << (DATA_BITS - 1 - sent)) != 0;
                self.phase = Phase::Shifting { word, sent: sent + 1 };
            }
            Phase::Shifting { .. } => {
                // 25th pulse: transfer done, next conversion starts
                self.phase = Phase::GainSelect;
                self.gain_pulses = 1;
                self.transfers += 1;
                self.ready_at_ns = self.now_ns + self.conversion_period_ns;
            }
            Phase::GainSelect if !self.conversion_ready() => {
                self.gain_pulses = self.gain_pulses.saturating_add(1);
            }
            Phase::GainSelect | Phase::Idle => {
                if self.conversion_ready() {
                    let value = self.samples.pop_front().unwrap_or(self.load);
                    let word = Reading::new(value).unwrap_or(if value < 0 { Reading::MIN } else { Reading::MAX }).to_raw();
                    self.dout_bit = word & (1 << (DATA_BITS - 1)) != 0;
                    self.phase = Phase::Shifting { word, sent: 1 };
                }
            }
        }
    }

    fn falling_edge(&mut self) {
        self.check_power_down();
        self.sck_high = false;
        if !self.powered {
            self.powered = true;
            self.phase = Phase::Idle;
            self.ready_at_ns = self.now_ns + self.conversion_period_ns;
        }
    }

    fn dout(&self) -> bool {
        if let Some(level) = self.stuck {
            return level;
        }
        match self.phase {
            _ if !self.powered => true,
            Phase::Shifting { .. } => self.dout_bit,
            Phase::Idle | Phase::GainSelect => !self.conversion_ready(),
        }
    }
}

/// Handle to a simulated chip; hands out pins and inspects state.
#[derive(Clone)]
pub struct SimHx711 {
    chip: Rc<RefCell<Chip>>,
}

impl Default for SimHx711 {
    fn default() -> Self {
        Self::new(DEFAULT_CONVERSION_PERIOD_US)
    }
}

impl SimHx711 {
    /// Starts powered up with a conversion already waiting.
    pub fn new(conversion_period_us: u32) -> Self {
        Self {
            chip: Rc::new(RefCell::new(Chip::new(conversion_period_us))),
        }
    }

    /// Clock pin, data pin and delay wired to this chip.
    pub fn pins(&self) -> (SimClock, SimData, SimDelay) {
        (
            SimClock { chip: self.chip.clone() },
            SimData { chip: self.chip.clone() },
            SimDelay { chip: self.chip.clone() },
        )
    }

    /// Value returned once all queued samples are used up.
    /// Clamped to the 24-bit range on output.
    pub fn set_load(&self, value: i32) {
        self.chip.borrow_mut().load = value;
    }

    /// Queue a value for the next transfer.
    pub fn push_sample(&self, value: i32) {
        self.chip.borrow_mut().samples.push_back(value);
    }

    /// Keep DOUT high until `power_downs` power-downs have happened.
    pub fn stall(&self, power_downs: u32) {
        self.chip.borrow_mut().stalls = power_downs;
    }

    /// Force DOUT to a fixed level, e.g. a broken wire. `None` releases it.
    pub fn set_dout_stuck(&self, level: Option<bool>) {
        self.chip.borrow_mut().stuck = level;
    }

    /// Rising SCK edges seen so far.
    pub fn pulses(&self) -> u32 {
        self.chip.borrow().pulses
    }

    /// Pulses after the 24 data bits in the last transfer.
    pub fn gain_pulses(&self) -> u8 {
        self.chip.borrow().gain_pulses
    }

    pub fn power_downs(&self) -> u32 {
        self.chip.borrow().power_downs
    }

    /// Completed 24-bit transfers.
    pub fn transfers(&self) -> u32 {
        self.chip.borrow().transfers
    }

    pub fn is_powered(&self) -> bool {
        self.chip.borrow().powered
    }

    pub fn now_us(&self) -> u64 {
        self.chip.borrow().now_ns / 1_000
    }

    /// How long SCK has been held high, zero when low.
    pub fn sck_high_for_us(&self) -> u64 {
        let chip = self.chip.borrow();
        if chip.sck_high {
            (chip.now_ns - chip.sck_high_since_ns) / 1_000
        } else {
            0
        }
    }
}

pub struct SimClock {
    chip: Rc<RefCell<Chip>>,
}

pub struct SimData {
    chip: Rc<RefCell<Chip>>,
}

pub struct SimDelay {
    chip: Rc<RefCell<Chip>>,
}

impl ErrorType for SimClock {
    type Error = Infallible;
}

impl OutputPin for SimClock {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.chip.borrow_mut().falling_edge();
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        let mut chip = self.chip.borrow_mut();
        if !chip.sck_high {
            chip.rising_edge();
        }
        Ok(())
    }
}

impl ErrorType for SimData {
    type Error = Infallible;
}

impl InputPin for SimData {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.chip.borrow().dout())
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.chip.borrow().dout())
    }
}

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.chip.borrow_mut().advance(u64::from(ns));
    }
}
