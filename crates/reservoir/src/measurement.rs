use alloc::format;
use alloc::string::{String, ToString};

use core::fmt;
use core::time::Duration;

use log::{debug, info, warn};

use crate::config::{Calibration, PublishPolicy};
use crate::connectivity::BusSession;
use crate::sensor::RangingSensor;
use crate::telemetry::{DerivedState, LevelRecord, Topic, Topics, round_mm, round_percent};
use crate::time::{Clock, WallClock, elapsed_ms, timestamp};
use crate::trend::{Trend, TrendEstimator};

/// A measurement cycle aborted because of the sensor.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorFault {
    /// No usable echo has been received.
    NoEcho(String),
    /// The measured distance lies outside the plausible range.
    Implausible {
        /// The rejected distance, in millimeters.
        distance_mm: f32,
    },
}

impl fmt::Display for SensorFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoEcho(cause) => write!(f, "Sensor fault: no echo ({cause})"),
            Self::Implausible { distance_mm } => write!(
                f,
                "Sensor fault: implausible distance {} mm",
                round_mm(*distance_mm)
            ),
        }
    }
}

/// The outcome of a successful measurement cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    /// Sensor-to-surface distance, in millimeters.
    pub distance_mm: f32,
    /// Fill percentage, clamped to `[0, 100]`.
    pub percentage: f32,
    /// Level trend.
    pub trend: Trend,
    /// Whether the measurement has been published.
    pub published: bool,
}

/// The snapshot of the last published measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LastSent {
    /// Published distance, in millimeters.
    pub distance_mm: f32,
    /// Published trend.
    pub trend: Trend,
    /// Monotonic instant of the publication, in milliseconds.
    pub sent_at_ms: u64,
}

/// Turns ranging samples into validated, trend-annotated telemetry and
/// decides when it is transmitted.
#[derive(Debug, Clone)]
pub struct MeasurementPipeline {
    calibration: Calibration,
    policy: PublishPolicy,
    median_samples: u8,
    topics: Topics,
    estimator: TrendEstimator,
    last_sent: Option<LastSent>,
}

impl MeasurementPipeline {
    /// Creates a [`MeasurementPipeline`] with an empty history.
    #[must_use]
    pub const fn new(
        calibration: Calibration,
        policy: PublishPolicy,
        median_samples: u8,
        topics: Topics,
    ) -> Self {
        Self {
            calibration,
            policy,
            median_samples,
            topics,
            estimator: TrendEstimator::new(),
            last_sent: None,
        }
    }

    /// Returns the [`TrendEstimator`].
    #[must_use]
    pub const fn estimator(&self) -> &TrendEstimator {
        &self.estimator
    }

    /// Returns the snapshot of the last published measurement.
    #[must_use]
    pub const fn last_sent(&self) -> Option<&LastSent> {
        self.last_sent.as_ref()
    }

    /// Runs a measurement cycle.
    ///
    /// A plausible reading always feeds the trend window. It is published
    /// when `force` is set, when the heartbeat interval has elapsed, when the
    /// distance moved by at least the minimum change, or when the trend
    /// changed. Every topic is published independently, and a failed
    /// publication is neither retried nor rolled back.
    ///
    /// # Errors
    ///
    /// Returns a [`SensorFault`] when no echo is received or the reading is
    /// implausible. The cycle is then aborted without touching the history
    /// and without publishing.
    pub fn perform<S: RangingSensor>(
        &mut self,
        force: bool,
        sensor: &mut S,
        bus: &mut impl BusSession,
        clock: &impl Clock,
        wall_clock: &impl WallClock,
    ) -> Result<Measurement, SensorFault> {
        let echo_us = sensor
            .sample_median(self.median_samples)
            .map_err(|e| SensorFault::NoEcho(format!("{e:?}")))?;

        let distance_mm = self.calibration.distance_mm(echo_us);
        if !self.calibration.is_plausible(distance_mm) {
            return Err(SensorFault::Implausible { distance_mm });
        }

        let percentage = self.calibration.percentage(distance_mm);

        let now = clock.now_ms();
        self.estimator.add_sample(distance_mm, now);
        let trend = self.estimator.current_trend();

        debug!("Measured {distance_mm:.1} mm ({percentage:.1} %), trend {trend}");

        let published = self.should_publish(force, distance_mm, trend, now);
        if published {
            self.last_sent = Some(LastSent {
                distance_mm,
                trend,
                sent_at_ms: now,
            });
            let record = LevelRecord::new(
                timestamp(wall_clock, clock),
                percentage,
                distance_mm,
                trend,
            );
            self.publish(bus, &record, percentage);
        }

        Ok(Measurement {
            distance_mm,
            percentage,
            trend,
            published,
        })
    }

    /// Decides whether a measurement taken at `now_ms` must be published.
    #[must_use]
    pub fn should_publish(&self, force: bool, distance_mm: f32, trend: Trend, now_ms: u64) -> bool {
        if force {
            return true;
        }

        let Some(last) = self.last_sent else {
            return true;
        };

        let elapsed = Duration::from_millis(elapsed_ms(last.sent_at_ms, now_ms));

        elapsed >= self.policy.heartbeat()
            || libm::fabsf(distance_mm - last.distance_mm) >= self.policy.min_change_mm
            || trend != last.trend
    }

    fn publish(&self, bus: &mut impl BusSession, record: &LevelRecord, percentage: f32) {
        let state = DerivedState::from(record.trend);

        let messages = [
            (Topic::LevelPercent, round_percent(percentage).to_string()),
            (Topic::LevelAbsolute, record.absolute.to_string()),
            (Topic::LevelLog, record.to_json()),
            (Topic::TrendFlag, (record.trend == Trend::Rising).to_string()),
            (Topic::DerivedState, String::from(state.as_str())),
        ]
        .into_iter()
        .chain(
            state
                .target_hint()
                .map(|hint| (Topic::TargetHint, hint.to_string())),
        );

        let mut delivered = 0;
        let mut failed = 0;
        for (topic, payload) in messages {
            match bus.publish(&self.topics.path(topic), &payload, topic.retained()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    failed += 1;
                    warn!("Publication on `{}` failed: {e}", topic.suffix());
                }
            }
        }

        info!(
            "Published {}% / {} mm ({}), {delivered} delivered, {failed} failed",
            round_percent(percentage),
            record.absolute,
            record.trend
        );
    }
}
