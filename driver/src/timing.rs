//! Timing configuration for the HX711 two-wire protocol.

/// Datasheet power-down threshold: SCK held high this long enters power-down.
pub const POWER_DOWN_THRESHOLD_US: u32 = 60;

/// Number of data bits in one conversion result.
pub const DATA_BITS: u8 = 24;

/// Bus timing for one [`crate::Hx711`]
///
/// All waits are busy delays. Defaults match the chip running at 80 SPS on a
/// slow GPIO expander, which is slower than the datasheet minimums.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Settle time after pulling SCK low, before polling DOUT
    pub settle_us: u32,
    /// Minimum SCK high time per pulse
    pub clock_high_us: u32,
    /// Minimum SCK low time per pulse
    pub clock_low_us: u32,
    /// Upper bound on DOUT polls while waiting for data ready
    pub ready_poll_iterations: u32,
    /// Delay between DOUT polls in a read
    pub ready_poll_delay_us: u32,
    /// Delay between DOUT polls during initialization
    pub init_poll_delay_us: u32,
    /// Recovery time after power-up
    pub power_up_ms: u32,
    /// SCK high hold to enter power-down
    pub power_down_hold_us: u32,
    /// Gap between power-down and power-up when power cycling
    pub power_cycle_gap_us: u32,
    /// Fixed pause after every failed attempt in a retry loop
    pub retry_delay_ms: u32,
    /// Wait after the gain pulse before checking DOUT went high
    pub verify_delay_us: u32,
    /// Treat a DOUT that stays low after the transfer as an error
    pub strict_verify: bool,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            settle_us: 100,
            clock_high_us: 1,
            clock_low_us: 1,
            ready_poll_iterations: 50_000,
            ready_poll_delay_us: 1,
            init_poll_delay_us: 10,
            power_up_ms: 100,
            power_down_hold_us: POWER_DOWN_THRESHOLD_US,
            power_cycle_gap_us: 1_000,
            retry_delay_ms: 10,
            verify_delay_us: 10,
            strict_verify: false,
        }
    }
}

impl Timing {
    /// Clamp values the chip cannot work with.
    ///
    /// The power-down hold never drops below the datasheet threshold, and at
    /// least one ready poll always happens.
    pub fn sanitized(mut self) -> Self {
        self.power_down_hold_us = self.power_down_hold_us.max(POWER_DOWN_THRESHOLD_US);
        self.ready_poll_iterations = self.ready_poll_iterations.max(1);
        self
    }

    /// Worst-case duration of one read in microseconds, ignoring GPIO latency.
    pub fn worst_case_read_us(&self, pulses: u8) -> u64 {
        let poll = u64::from(self.ready_poll_iterations) * u64::from(self.ready_poll_delay_us);
        let pulse = u64::from(self.clock_high_us) + u64::from(self.clock_low_us);
        u64::from(self.settle_us) + poll + u64::from(pulses) * pulse + u64::from(self.verify_delay_us)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let timing = Timing::default();
        assert_eq!(timing.settle_us, 100);
        assert_eq!(timing.ready_poll_iterations, 50_000);
        assert_eq!(timing.power_up_ms, 100);
        assert!(timing.power_down_hold_us >= POWER_DOWN_THRESHOLD_US);
        assert!(!timing.strict_verify);
    }

    #[test]
    fn test_sanitized_clamps_power_down_hold() {
        let timing = Timing {
            power_down_hold_us: 10,
            ready_poll_iterations: 0,
            ..Timing::default()
        }
        .sanitized();
        assert_eq!(timing.power_down_hold_us, POWER_DOWN_THRESHOLD_US);
        assert_eq!(timing.ready_poll_iterations, 1);
    }

    #[test]
    fn test_worst_case_read() {
        // 100 settle + 50000 poll + 25 * 2 clocking + 10 verify
        assert_eq!(Timing::default().worst_case_read_us(25), 50_160);
    }
}
