use thiserror::Error;

/// HX711 errors
///
/// `E` is the GPIO error type shared by the clock and data pins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error<E> {
    /// Clock or data pin access failed
    #[error("GPIO error: {0:?}")]
    Pin(E),
    /// Chip never signalled ready during initialization
    #[error("HX711 not ready after power-up")]
    InitTimeout,
    /// DOUT never went low within the ready-poll bound
    #[error("timed out waiting for HX711 data ready")]
    ReadTimeout,
    /// DOUT still low after the gain pulse (only raised with strict verification)
    #[error("HX711 did not start a new conversion after transfer")]
    Communication,
}

impl<E> Error<E> {
    /// Timeouts are recovered by power cycling; everything else is not.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::InitTimeout | Error::ReadTimeout)
    }
}
