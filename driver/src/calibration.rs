//! Linear conversion from raw counts to physical units.

use crate::reading::Reading;

/// `value = (raw - offset) * scale`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    /// Raw count at zero load
    pub offset: i32,
    /// Units per count
    pub scale: f32,
}

impl Default for Calibration {
    /// Torque cell defaults: ~2.1 mV bridge offset, N·cm per count.
    fn default() -> Self {
        Self {
            offset: 880_804,
            scale: 1.33e-7,
        }
    }
}

impl Calibration {
    pub const fn new(offset: i32, scale: f32) -> Self {
        Self { offset, scale }
    }

    pub fn apply(&self, reading: Reading) -> f32 {
        let counts = i64::from(reading.value()) - i64::from(self.offset);
        counts as f32 * self.scale
    }

    /// Zero the offset on the mean of `readings` taken with no load.
    /// Leaves the offset alone when `readings` is empty.
    pub fn tare(&mut self, readings: &[Reading]) {
        if readings.is_empty() {
            return;
        }
        let n = readings.len() as i64;
        let sum: i64 = readings.iter().map(|r| i64::from(r.value())).sum();
        // Round half away from zero
        let half = if sum < 0 { -n / 2 } else { n / 2 };
        self.offset = ((sum + half) / n) as i32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(v: i32) -> Reading {
        Reading::new(v).unwrap()
    }

    #[test]
    fn test_apply() {
        let cal = Calibration::new(1_000, 0.5);
        assert_eq!(cal.apply(r(1_000)), 0.0);
        assert_eq!(cal.apply(r(1_010)), 5.0);
        assert_eq!(cal.apply(r(990)), -5.0);
    }

    #[test]
    fn test_apply_extreme_offset() {
        let cal = Calibration::new(i32::MAX, 1.0);
        assert!(cal.apply(Reading::MIN) < 0.0);
    }

    #[test]
    fn test_tare_uses_mean() {
        let mut cal = Calibration::new(0, 1.0);
        cal.tare(&[r(100), r(101), r(103)]);
        // 304 / 3 = 101.33
        assert_eq!(cal.offset, 101);

        cal.tare(&[r(-3), r(-4)]);
        assert_eq!(cal.offset, -4);
        assert_eq!(cal.apply(r(-4)), 0.0);
    }

    #[test]
    fn test_tare_empty_is_noop() {
        let mut cal = Calibration::default();
        cal.tare(&[]);
        assert_eq!(cal.offset, 880_804);
    }
}
