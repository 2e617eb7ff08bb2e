use core::fmt;

use serde::{Deserialize, Serialize};

/// Maximum number of samples retained by a [`TrendWindow`].
pub const WINDOW_CAPACITY: usize = 60;

/// Minimum number of samples required to estimate a trend.
pub const MIN_TREND_SAMPLES: usize = 5;

/// Slopes within this band, in millimeters per minute, are sensor jitter.
pub const SLOPE_DEADBAND_MM_PER_MIN: f64 = 0.1;

const MS_PER_MINUTE: f64 = 60_000.;

/// A validated distance reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Distance between sensor and liquid surface, in millimeters.
    pub distance_mm: f32,
    /// Monotonic instant of the reading, in milliseconds.
    pub taken_at_ms: u64,
}

impl Sample {
    const EMPTY: Self = Self {
        distance_mm: 0.,
        taken_at_ms: 0,
    };

    /// Creates a [`Sample`].
    #[must_use]
    pub const fn new(distance_mm: f32, taken_at_ms: u64) -> Self {
        Self {
            distance_mm,
            taken_at_ms,
        }
    }
}

/// The level trend.
///
/// Distances are measured from the sensor down to the liquid surface, hence
/// a shrinking distance means a rising level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    /// The level is rising.
    Rising,
    /// The level is falling.
    Falling,
    /// The level is steady, or there is not enough data to tell.
    #[default]
    Stable,
}

impl Trend {
    /// Returns the lowercase label of the trend.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Rising => "rising",
            Self::Falling => "falling",
            Self::Stable => "stable",
        }
    }

    /// Classifies a slope expressed in millimeters per minute.
    #[must_use]
    pub fn from_slope(slope_mm_per_min: f64) -> Self {
        if slope_mm_per_min < -SLOPE_DEADBAND_MM_PER_MIN {
            Self::Rising
        } else if slope_mm_per_min > SLOPE_DEADBAND_MM_PER_MIN {
            Self::Falling
        } else {
            Self::Stable
        }
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

/// A fixed-capacity ring buffer of [`Sample`]s kept in arrival order.
///
/// Once full, each new sample overwrites the oldest one.
#[derive(Debug, Clone)]
pub struct TrendWindow {
    samples: [Sample; WINDOW_CAPACITY],
    // Index of the slot the next sample is written to.
    head: usize,
    len: usize,
}

impl Default for TrendWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl TrendWindow {
    /// Creates an empty [`TrendWindow`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            samples: [Sample::EMPTY; WINDOW_CAPACITY],
            head: 0,
            len: 0,
        }
    }

    /// Appends a sample, evicting the oldest one when the window is full.
    pub fn push(&mut self, sample: Sample) {
        self.samples[self.head] = sample;
        self.head = (self.head + 1) % WINDOW_CAPACITY;
        if self.len < WINDOW_CAPACITY {
            self.len += 1;
        }
    }

    /// Returns the number of retained samples.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Checks whether the window holds no samples.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Checks whether the window reached its capacity.
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.len == WINDOW_CAPACITY
    }

    /// Returns the oldest retained sample.
    #[must_use]
    pub fn oldest(&self) -> Option<&Sample> {
        self.iter().next()
    }

    /// Iterates over the retained samples from the oldest to the newest.
    pub fn iter(&self) -> impl Iterator<Item = &Sample> + '_ {
        let start = (self.head + WINDOW_CAPACITY - self.len) % WINDOW_CAPACITY;
        (0..self.len).map(move |offset| &self.samples[(start + offset) % WINDOW_CAPACITY])
    }

    /// Drops every retained sample.
    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }
}

/// Estimates the level trend from the recent distance history.
#[derive(Debug, Clone, Default)]
pub struct TrendEstimator {
    window: TrendWindow,
}

impl TrendEstimator {
    /// Creates a [`TrendEstimator`] with an empty window.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            window: TrendWindow::new(),
        }
    }

    /// Records a distance taken at the given monotonic instant.
    pub fn add_sample(&mut self, distance_mm: f32, now_ms: u64) {
        self.window.push(Sample::new(distance_mm, now_ms));
    }

    /// Returns the sample window.
    #[must_use]
    pub const fn window(&self) -> &TrendWindow {
        &self.window
    }

    /// Computes the least-squares slope of distance against the minutes
    /// elapsed since the oldest retained sample.
    ///
    /// Returns [`None`] with fewer than [`MIN_TREND_SAMPLES`] samples, or when
    /// all samples share the same instant.
    #[must_use]
    pub fn slope_mm_per_min(&self) -> Option<f64> {
        if self.window.len() < MIN_TREND_SAMPLES {
            return None;
        }

        let origin = self.window.oldest()?.taken_at_ms;

        let (mut sum_x, mut sum_y, mut sum_xy, mut sum_xx) = (0., 0., 0., 0.);
        for sample in self.window.iter() {
            #[allow(clippy::cast_precision_loss)]
            let x = sample.taken_at_ms.saturating_sub(origin) as f64 / MS_PER_MINUTE;
            let y = f64::from(sample.distance_mm);

            sum_x += x;
            sum_y += y;
            sum_xy += x * y;
            sum_xx += x * x;
        }

        #[allow(clippy::cast_precision_loss)]
        let n = self.window.len() as f64;

        let denominator = n * sum_xx - sum_x * sum_x;
        if denominator == 0. {
            return None;
        }

        Some((n * sum_xy - sum_x * sum_y) / denominator)
    }

    /// Returns the current [`Trend`].
    ///
    /// Insufficient or degenerate data always yields [`Trend::Stable`].
    #[must_use]
    pub fn current_trend(&self) -> Trend {
        self.slope_mm_per_min()
            .map_or(Trend::Stable, Trend::from_slope)
    }
}

#[cfg(test)]
mod tests {
    use super::{
        MIN_TREND_SAMPLES, Sample, Trend, TrendEstimator, TrendWindow, WINDOW_CAPACITY,
    };

    const MINUTE_MS: u64 = 60_000;

    fn estimator_from(samples: &[(f32, u64)]) -> TrendEstimator {
        let mut estimator = TrendEstimator::new();
        for &(distance, at) in samples {
            estimator.add_sample(distance, at);
        }
        estimator
    }

    #[test]
    fn not_enough_samples_is_stable() {
        let estimator = estimator_from(&[
            (900., 0),
            (800., MINUTE_MS),
            (700., 2 * MINUTE_MS),
            (600., 3 * MINUTE_MS),
        ]);

        assert_eq!(estimator.window().len(), MIN_TREND_SAMPLES - 1);
        assert_eq!(estimator.slope_mm_per_min(), None);
        assert_eq!(estimator.current_trend(), Trend::Stable);
    }

    #[test]
    fn constant_distance_is_stable() {
        let mut estimator = TrendEstimator::new();
        for i in 0..20 {
            estimator.add_sample(1000., i * 30_000);
        }

        assert_eq!(estimator.current_trend(), Trend::Stable);
    }

    #[test]
    fn shrinking_distance_is_rising() {
        let mut estimator = TrendEstimator::new();
        // Half a millimeter closer every minute.
        for i in 0..10u32 {
            #[allow(clippy::cast_precision_loss)]
            let distance = 1000. - 0.5 * i as f32;
            estimator.add_sample(distance, u64::from(i) * MINUTE_MS);
        }

        assert_eq!(estimator.current_trend(), Trend::Rising);
    }

    #[test]
    fn growing_distance_is_falling() {
        let mut estimator = TrendEstimator::new();
        for i in 0..10u32 {
            #[allow(clippy::cast_precision_loss)]
            let distance = 1000. + 2. * i as f32;
            estimator.add_sample(distance, u64::from(i) * MINUTE_MS);
        }

        assert_eq!(estimator.current_trend(), Trend::Falling);
    }

    #[test]
    fn slope_within_deadband_is_stable() {
        let mut estimator = TrendEstimator::new();
        // 0.05 mm per minute.
        for i in 0..10u32 {
            #[allow(clippy::cast_precision_loss)]
            let distance = 1000. + 0.05 * i as f32;
            estimator.add_sample(distance, u64::from(i) * MINUTE_MS);
        }

        assert_eq!(estimator.current_trend(), Trend::Stable);
    }

    #[test]
    fn identical_instants_are_degenerate() {
        let estimator = estimator_from(&[
            (900., 5000),
            (800., 5000),
            (700., 5000),
            (600., 5000),
            (500., 5000),
        ]);

        assert_eq!(estimator.slope_mm_per_min(), None);
        assert_eq!(estimator.current_trend(), Trend::Stable);
    }

    #[test]
    fn window_evicts_oldest_sample() {
        let mut window = TrendWindow::new();
        for i in 0..=WINDOW_CAPACITY as u64 {
            window.push(Sample::new(1000., i));
        }

        assert!(window.is_full());
        assert_eq!(window.len(), WINDOW_CAPACITY);
        assert!(window.iter().all(|sample| sample.taken_at_ms != 0));
        assert_eq!(window.oldest().map(|sample| sample.taken_at_ms), Some(1));
        assert_eq!(
            window.iter().last().map(|sample| sample.taken_at_ms),
            Some(WINDOW_CAPACITY as u64)
        );
    }

    #[test]
    fn window_keeps_arrival_order() {
        let mut window = TrendWindow::new();
        for i in 0..130u64 {
            window.push(Sample::new(1000., i));
        }

        let mut previous = None;
        for sample in window.iter() {
            if let Some(previous) = previous {
                assert_eq!(sample.taken_at_ms, previous + 1);
            }
            previous = Some(sample.taken_at_ms);
        }
        assert_eq!(previous, Some(129));

        window.clear();
        assert!(window.is_empty());
        assert!(window.oldest().is_none());
    }

    #[test]
    fn regression_uses_oldest_retained_sample() {
        let mut estimator = TrendEstimator::new();
        // Fill the window with a fast drain, then overwrite it entirely with
        // a steady level.
        for i in 0..WINDOW_CAPACITY as u64 {
            #[allow(clippy::cast_precision_loss)]
            let distance = 500. + 10. * i as f32;
            estimator.add_sample(distance, i * MINUTE_MS);
        }
        assert_eq!(estimator.current_trend(), Trend::Falling);

        for i in WINDOW_CAPACITY as u64..2 * WINDOW_CAPACITY as u64 {
            estimator.add_sample(1200., i * MINUTE_MS);
        }
        assert_eq!(estimator.current_trend(), Trend::Stable);
    }

    #[test]
    fn trend_labels() {
        assert_eq!(Trend::from_slope(-0.11), Trend::Rising);
        assert_eq!(Trend::from_slope(0.11), Trend::Falling);
        assert_eq!(Trend::from_slope(0.1), Trend::Stable);
        assert_eq!(Trend::from_slope(-0.1), Trend::Stable);
        assert_eq!(Trend::Rising.as_str(), "rising");
    }
}
