use std::convert::Infallible;

use reservoir::config::Calibration;
use reservoir::sensor::RangingSensor;
use reservoir::time::Clock;

/// A [`RangingSensor`] following a simulated fill and drain cycle.
///
/// The level starts from an empty reservoir, rises at a constant rate up to
/// the full level, then drains back at the same rate, forever. A rate of
/// zero keeps the reservoir empty.
#[derive(Debug, Clone)]
pub struct SimulatedSensor<C: Clock> {
    calibration: Calibration,
    clock: C,
    rate_mm_per_s: f32,
}

impl<C: Clock> SimulatedSensor<C> {
    /// Creates a [`SimulatedSensor`] moving the level by `rate_mm_per_s`
    /// millimeters per second.
    #[must_use]
    pub const fn new(calibration: Calibration, clock: C, rate_mm_per_s: f32) -> Self {
        Self {
            calibration,
            clock,
            rate_mm_per_s,
        }
    }

    /// Returns the simulated distance between the sensor and the surface,
    /// in millimeters.
    #[must_use]
    pub fn distance_mm(&self) -> f32 {
        let empty = self.calibration.empty_distance_mm;
        let full = self.calibration.full_distance_mm;
        let span = empty - full;

        if span <= 0. || self.rate_mm_per_s <= 0. {
            return empty;
        }

        #[allow(clippy::cast_precision_loss)]
        let elapsed_s = self.clock.now_ms() as f32 / 1000.;
        let phase = (elapsed_s * self.rate_mm_per_s) % (2. * span);

        if phase <= span {
            empty - phase
        } else {
            full + (phase - span)
        }
    }
}

impl<C: Clock> RangingSensor for SimulatedSensor<C> {
    type Error = Infallible;

    fn sample_median(&mut self, _samples: u8) -> Result<u32, Self::Error> {
        let echo_us = self.distance_mm() / self.calibration.mm_per_echo_us;

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Ok(echo_us.round() as u32)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use reservoir::config::Calibration;
    use reservoir::sensor::RangingSensor;
    use reservoir::time::Clock;

    use super::SimulatedSensor;

    #[derive(Default)]
    struct FixedClock(Cell<u64>);

    impl Clock for &FixedClock {
        fn now_ms(&self) -> u64 {
            self.0.get()
        }
    }

    fn calibration() -> Calibration {
        Calibration {
            empty_distance_mm: 1250.,
            full_distance_mm: 250.,
            mm_per_echo_us: 0.25,
            ..Calibration::default()
        }
    }

    #[test]
    fn fills_then_drains() {
        let clock = FixedClock::default();
        let mut sensor = SimulatedSensor::new(calibration(), &clock, 10.);

        assert_eq!(sensor.distance_mm(), 1250.);
        assert_eq!(sensor.sample_median(5), Ok(5000));

        // Halfway through filling.
        clock.0.set(50_000);
        assert_eq!(sensor.distance_mm(), 750.);
        assert_eq!(sensor.sample_median(5), Ok(3000));

        // Full.
        clock.0.set(100_000);
        assert_eq!(sensor.distance_mm(), 250.);

        // Draining.
        clock.0.set(125_000);
        assert_eq!(sensor.distance_mm(), 500.);

        // Empty again.
        clock.0.set(200_000);
        assert_eq!(sensor.distance_mm(), 1250.);
    }

    #[test]
    fn zero_rate_keeps_the_reservoir_empty() {
        let clock = FixedClock::default();
        clock.0.set(42_000);
        let sensor = SimulatedSensor::new(calibration(), &clock, 0.);

        assert_eq!(sensor.distance_mm(), 1250.);
    }
}
