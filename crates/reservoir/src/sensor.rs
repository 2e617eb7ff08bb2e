use core::fmt::Debug;

/// A ranging sensor able to return a single filtered echo duration.
///
/// Implementations are expected to reject outliers internally, for example
/// by taking the median over several pings.
pub trait RangingSensor {
    /// Sensor error.
    type Error: Debug;

    /// Takes `samples` pings and returns the filtered round-trip echo
    /// duration in microseconds.
    ///
    /// # Errors
    ///
    /// Returns an error when no usable echo is received.
    fn sample_median(&mut self, samples: u8) -> Result<u32, Self::Error>;
}
