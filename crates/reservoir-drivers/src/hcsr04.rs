//! # HC-SR04 Driver
//!
//! This module provides an architecture-agnostic driver for the `HC-SR04`
//! ultrasonic ranging sensor.
//!
//! A 10 µs pulse on the trigger pin emits an ultrasonic burst. The sensor
//! then raises its echo pin for as long as the burst takes to travel to the
//! target and back, so the echo width is proportional to twice the distance.
//!
//! The driver is synchronous and measures the echo width by polling the pin
//! with 1 µs delays, which is precise enough at the millimeter scale of a
//! reservoir.
//!
//! Single pings are prone to spurious reflections, so
//! [`Hcsr04::sample_median`] takes several spaced pings and returns the
//! median of the successful ones.
//!
//! For detailed specifications, refer to the
//! [datasheet](https://cdn.sparkfun.com/datasheets/Sensors/Proximity/HCSR04.pdf).

use core::result::Result::{self, Err, Ok};

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};

// Protocol-specific timing constants.
const TRIGGER_SETTLE_US: u32 = 2; // Trigger held low before the pulse.
const TRIGGER_PULSE_US: u32 = 10; // Minimum trigger pulse width.
const POLL_DELAY_US: u32 = 1; // Delay between echo pin polls.
const ECHO_TIMEOUT_US: u32 = 25_000; // Longer echoes are beyond the sensor range.
const PING_SPACING_MS: u32 = 30; // Lets the previous burst fade out.

/// Maximum number of pings taken by [`Hcsr04::sample_median`].
pub const MAX_PINGS: usize = 15;

/// Errors that may occur when interacting with the `HC-SR04` sensor.
#[derive(Debug)]
pub enum Hcsr04Error<E> {
    /// GPIO pin errors.
    Pin(E),
    /// The echo pin never went high after the trigger.
    NoEcho,
    /// The echo pin stayed high beyond the sensor range.
    Timeout,
}

impl<E> From<E> for Hcsr04Error<E> {
    fn from(e: E) -> Self {
        Hcsr04Error::Pin(e)
    }
}

/// The `HC-SR04` driver.
pub struct Hcsr04<T, E, D>
where
    T: OutputPin,
    E: InputPin<Error = T::Error>,
    D: DelayNs,
{
    trigger: T,
    echo: E,
    delay: D,
}

impl<T, E, D> Hcsr04<T, E, D>
where
    T: OutputPin,
    E: InputPin<Error = T::Error>,
    D: DelayNs,
{
    /// Creates a [`Hcsr04`] driver for the given pins and delay provider.
    #[must_use]
    pub fn new(trigger: T, echo: E, delay: D) -> Self {
        Self {
            trigger,
            echo,
            delay,
        }
    }

    /// Releases the pins and the delay provider.
    pub fn release(self) -> (T, E, D) {
        (self.trigger, self.echo, self.delay)
    }

    /// Takes a single ping and returns the round-trip echo duration, in
    /// microseconds.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Driving or reading a pin fails
    /// - No echo starts within the timeout
    /// - The echo lasts longer than the timeout
    pub fn ping(&mut self) -> Result<u32, Hcsr04Error<T::Error>> {
        self.send_trigger()?;
        self.wait_for_echo_start()?;
        self.measure_echo_width()
    }

    /// Takes up to `pings` spaced pings, bounded by [`MAX_PINGS`], and
    /// returns the median echo duration of the successful ones, in
    /// microseconds.
    ///
    /// # Errors
    ///
    /// Returns the error of the last ping if no ping succeeds.
    pub fn sample_median(&mut self, pings: u8) -> Result<u32, Hcsr04Error<T::Error>> {
        let pings = usize::from(pings).clamp(1, MAX_PINGS);

        let mut echoes = [0u32; MAX_PINGS];
        let mut valid = 0;
        let mut last_error = Hcsr04Error::NoEcho;

        for i in 0..pings {
            if i > 0 {
                self.delay.delay_ms(PING_SPACING_MS);
            }
            match self.ping() {
                Ok(echo) => {
                    echoes[valid] = echo;
                    valid += 1;
                }
                Err(e) => last_error = e,
            }
        }

        if valid == 0 {
            return Err(last_error);
        }

        Ok(median(&mut echoes[..valid]))
    }

    fn send_trigger(&mut self) -> Result<(), Hcsr04Error<T::Error>> {
        self.trigger.set_low()?;
        self.delay.delay_us(TRIGGER_SETTLE_US);

        self.trigger.set_high()?;
        self.delay.delay_us(TRIGGER_PULSE_US);

        self.trigger.set_low()?;

        Ok(())
    }

    fn wait_for_echo_start(&mut self) -> Result<(), Hcsr04Error<T::Error>> {
        let mut waited = 0;
        while self.echo.is_low()? {
            if waited >= ECHO_TIMEOUT_US {
                return Err(Hcsr04Error::NoEcho);
            }
            self.delay.delay_us(POLL_DELAY_US);
            waited += POLL_DELAY_US;
        }

        Ok(())
    }

    fn measure_echo_width(&mut self) -> Result<u32, Hcsr04Error<T::Error>> {
        let mut width = 0;
        while self.echo.is_high()? {
            if width >= ECHO_TIMEOUT_US {
                return Err(Hcsr04Error::Timeout);
            }
            self.delay.delay_us(POLL_DELAY_US);
            width += POLL_DELAY_US;
        }

        Ok(width)
    }
}

// Sorts the values in place and returns their median. Even-sized sets yield
// the mean of the two central values.
fn median(values: &mut [u32]) -> u32 {
    values.sort_unstable();

    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        // The sum of two echo widths cannot overflow a `u64`.
        let sum = u64::from(values[mid - 1]) + u64::from(values[mid]);
        u32::try_from(sum / 2).unwrap_or(u32::MAX)
    } else {
        values[mid]
    }
}

#[cfg(feature = "reservoir")]
impl<T, E, D> reservoir::sensor::RangingSensor for Hcsr04<T, E, D>
where
    T: OutputPin,
    E: InputPin<Error = T::Error>,
    D: DelayNs,
{
    type Error = Hcsr04Error<T::Error>;

    fn sample_median(&mut self, samples: u8) -> Result<u32, Self::Error> {
        Hcsr04::sample_median(self, samples)
    }
}
