use alloc::string::String;

use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorKind, Result};

/// Sensor geometry and conversion constants of a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Calibration {
    /// Distance between sensor and liquid surface when the reservoir is
    /// empty, in millimeters.
    pub empty_distance_mm: f32,
    /// Distance between sensor and liquid surface when the reservoir is
    /// full, in millimeters.
    pub full_distance_mm: f32,
    /// Millimeters travelled per microsecond of round-trip echo time.
    ///
    /// Half the speed of sound, since the echo covers the distance twice.
    pub mm_per_echo_us: f32,
    /// Readings at or below this distance are implausible.
    pub min_plausible_mm: f32,
    /// Readings above this distance are implausible.
    pub max_plausible_mm: f32,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            empty_distance_mm: 1800.,
            full_distance_mm: 250.,
            mm_per_echo_us: 0.1715,
            min_plausible_mm: 200.,
            max_plausible_mm: 2000.,
        }
    }
}

impl Calibration {
    /// Converts a round-trip echo duration into a distance in millimeters.
    #[must_use]
    pub fn distance_mm(&self, echo_us: u32) -> f32 {
        // Precision loss is irrelevant below the 25 ms echo timeout.
        #[allow(clippy::cast_precision_loss)]
        let echo = echo_us as f32;
        echo * self.mm_per_echo_us
    }

    /// Checks whether a distance lies inside the plausible sensor range.
    #[must_use]
    pub fn is_plausible(&self, distance_mm: f32) -> bool {
        distance_mm > self.min_plausible_mm && distance_mm <= self.max_plausible_mm
    }

    /// Converts a distance into a fill percentage clamped to `[0, 100]`.
    #[must_use]
    pub fn percentage(&self, distance_mm: f32) -> f32 {
        let span = self.empty_distance_mm - self.full_distance_mm;
        ((self.empty_distance_mm - distance_mm) / span * 100.).clamp(0., 100.)
    }
}

/// The debounce and heartbeat rules of telemetry publication.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishPolicy {
    /// Maximum time between two publications, in seconds.
    pub heartbeat_secs: u32,
    /// Minimum distance change that triggers a publication, in millimeters.
    pub min_change_mm: f32,
}

impl Default for PublishPolicy {
    fn default() -> Self {
        Self {
            heartbeat_secs: 300,
            min_change_mm: 5.,
        }
    }
}

impl PublishPolicy {
    /// Returns the heartbeat interval.
    #[must_use]
    pub const fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs as u64)
    }
}

/// Wall-clock time of the daily controlled restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartTime {
    /// Hour of the day, `0..24`.
    pub hour: u32,
    /// Minute of the hour, `0..60`.
    pub minute: u32,
}

impl Default for RestartTime {
    fn default() -> Self {
        Self { hour: 2, minute: 0 }
    }
}

/// Connection establishment rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Minimum time between two network link attempts, in seconds.
    pub network_retry_secs: u32,
    /// Minimum time between two bus session attempts, in seconds.
    pub bus_retry_secs: u32,
    /// Number of attempts per link during the startup phase.
    pub startup_attempts: u8,
    /// First backoff delay of the startup phase, in milliseconds.
    pub startup_backoff_ms: u32,
    /// Upper bound of the startup backoff delay, in milliseconds.
    pub startup_backoff_max_ms: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            network_retry_secs: 10,
            bus_retry_secs: 10,
            startup_attempts: 5,
            startup_backoff_ms: 500,
            startup_backoff_max_ms: 8000,
        }
    }
}

/// The complete node configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Bus client identifier.
    pub client_id: String,
    /// Prefix prepended to every telemetry topic.
    pub base_topic: String,
    /// Time between two measurement cycles, in seconds.
    pub measurement_interval_secs: u32,
    /// Number of ranging samples the median is taken over.
    pub median_samples: u8,
    /// Sensor calibration.
    pub calibration: Calibration,
    /// Publication rules.
    pub publish: PublishPolicy,
    /// Connection rules.
    pub retry: RetryPolicy,
    /// Daily restart time.
    pub daily_restart: RestartTime,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            client_id: String::from("reservoir-node"),
            base_topic: String::from("reservoir"),
            measurement_interval_secs: 30,
            median_samples: 5,
            calibration: Calibration::default(),
            publish: PublishPolicy::default(),
            retry: RetryPolicy::default(),
            daily_restart: RestartTime::default(),
        }
    }
}

impl NodeConfig {
    /// Returns the measurement interval.
    #[must_use]
    pub const fn measurement_interval(&self) -> Duration {
        Duration::from_secs(self.measurement_interval_secs as u64)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The full distance is not strictly below the empty distance
    /// - The empty or full distance lies outside the plausible range
    /// - Any interval or the median sample count is zero
    /// - The daily restart time is not a valid time of day
    /// - The client identifier is empty or starts with a space
    pub fn validate(&self) -> Result<()> {
        let calibration = &self.calibration;

        if self.client_id.is_empty() || self.client_id.starts_with(' ') {
            return Err(config_error("The client identifier is not valid."));
        }

        if calibration.full_distance_mm >= calibration.empty_distance_mm {
            return Err(config_error(
                "The full distance must be below the empty distance.",
            ));
        }

        if !calibration.is_plausible(calibration.empty_distance_mm)
            || !calibration.is_plausible(calibration.full_distance_mm)
        {
            return Err(config_error(
                "The empty and full distances must lie in the plausible range.",
            ));
        }

        if calibration.mm_per_echo_us <= 0. {
            return Err(config_error("The echo conversion factor must be positive."));
        }

        if self.measurement_interval_secs == 0
            || self.publish.heartbeat_secs == 0
            || self.retry.network_retry_secs == 0
            || self.retry.bus_retry_secs == 0
            || self.median_samples == 0
        {
            return Err(config_error(
                "Intervals and the median sample count must be non-zero.",
            ));
        }

        if self.daily_restart.hour > 23 || self.daily_restart.minute > 59 {
            return Err(config_error("The daily restart time is not valid."));
        }

        Ok(())
    }
}

#[inline]
fn config_error(description: &'static str) -> Error {
    Error::new(ErrorKind::Config, description)
}
