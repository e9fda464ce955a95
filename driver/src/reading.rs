//! Conversion results and their legacy wire encoding.

use core::convert::Infallible;
use core::fmt;

use crate::error::Error;

/// Legacy code for "chip never became ready".
pub const TIMEOUT_SENTINEL: i32 = i32::MIN;
/// Legacy code for "transfer looked wrong".
pub const COMM_ERROR_SENTINEL: i32 = i32::MAX;

const RAW_MASK: u32 = 0x00FF_FFFF;
const SIGN_BIT: u32 = 0x0080_0000;

/// One signed 24-bit conversion result, sign-extended to `i32`.
///
/// Always inside `[-2^23, 2^23 - 1]`, so it can never collide with the
/// legacy sentinels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Reading(i32);

impl Reading {
    pub const MIN: Reading = Reading(-(1 << 23));
    pub const MAX: Reading = Reading((1 << 23) - 1);

    /// Checked constructor. `None` outside the 24-bit range.
    pub const fn new(value: i32) -> Option<Self> {
        if value >= Self::MIN.0 && value <= Self::MAX.0 {
            Some(Self(value))
        } else {
            None
        }
    }

    /// Decode a raw 24-bit two's-complement word as clocked off DOUT.
    /// Bits above 23 are ignored.
    pub const fn from_raw(raw: u32) -> Self {
        let raw = raw & RAW_MASK;
        if raw & SIGN_BIT != 0 {
            Self((raw | !RAW_MASK) as i32)
        } else {
            Self(raw as i32)
        }
    }

    /// The 24-bit word the chip would have shifted out for this value.
    pub const fn to_raw(self) -> u32 {
        (self.0 as u32) & RAW_MASK
    }

    pub const fn value(self) -> i32 {
        self.0
    }

    /// Notification payload: the sign-extended value, big-endian.
    pub const fn to_be_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    /// Parse a notification payload, mapping sentinels back to errors.
    pub fn from_be_bytes(bytes: [u8; 4]) -> Result<Self, Error<Infallible>> {
        Self::from_legacy(i32::from_be_bytes(bytes))
    }

    /// Interpret a legacy sentinel-style return value.
    ///
    /// Anything outside the 24-bit range that is not a known sentinel is
    /// treated as a communication error too.
    pub fn from_legacy(code: i32) -> Result<Self, Error<Infallible>> {
        match code {
            TIMEOUT_SENTINEL => Err(Error::ReadTimeout),
            COMM_ERROR_SENTINEL => Err(Error::Communication),
            other => Self::new(other).ok_or(Error::Communication),
        }
    }
}

impl From<Reading> for i32 {
    fn from(reading: Reading) -> Self {
        reading.0
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Collapse a read result into the legacy sentinel protocol.
///
/// Timeouts map to [`TIMEOUT_SENTINEL`]; GPIO and verification failures map
/// to [`COMM_ERROR_SENTINEL`].
pub fn legacy_code<E>(result: &Result<Reading, Error<E>>) -> i32 {
    match result {
        Ok(reading) => reading.value(),
        Err(Error::InitTimeout | Error::ReadTimeout) => TIMEOUT_SENTINEL,
        Err(Error::Pin(_) | Error::Communication) => COMM_ERROR_SENTINEL,
    }
}
