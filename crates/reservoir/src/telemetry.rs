use alloc::format;
use alloc::string::String;

use serde::Serialize;

use crate::trend::Trend;

/// Presence payload published once a bus session is established.
pub const ONLINE: &str = "online";
/// Presence payload delivered by the broker when the node vanishes.
pub const OFFLINE: &str = "offline";

/// All telemetry topics of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    /// Node presence, `online` or `offline`.
    Status,
    /// Fill percentage as an integer.
    LevelPercent,
    /// Sensor-to-surface distance in integer millimeters.
    LevelAbsolute,
    /// A JSON [`LevelRecord`].
    LevelLog,
    /// `true` while the level is rising.
    TrendFlag,
    /// The [`DerivedState`] of the reservoir.
    DerivedState,
    /// The [`DerivedState::target_hint`] of a moving level.
    TargetHint,
    /// The most recent fault log entry.
    LastError,
}

impl Topic {
    /// Returns the topic path relative to the node base topic.
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::LevelPercent => "level/percent",
            Self::LevelAbsolute => "level/absolute",
            Self::LevelLog => "level/log",
            Self::TrendFlag => "level/trend-flag",
            Self::DerivedState => "level/derived-state",
            Self::TargetHint => "level/target-hint",
            Self::LastError => "lastError",
        }
    }

    /// Checks whether the broker retains messages on this topic.
    ///
    /// Every node topic is retained, so a late subscriber always receives
    /// the latest value.
    #[must_use]
    pub const fn retained(self) -> bool {
        true
    }
}

/// Resolves [`Topic`]s against the node base topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    base: String,
}

impl Topics {
    /// Creates [`Topics`] rooted at `base`.
    ///
    /// An empty base leaves topic paths untouched.
    #[must_use]
    pub fn new(base: &str) -> Self {
        Self {
            base: String::from(base.trim_end_matches('/')),
        }
    }

    /// Returns the full path of a [`Topic`].
    #[must_use]
    pub fn path(&self, topic: Topic) -> String {
        if self.base.is_empty() {
            String::from(topic.suffix())
        } else {
            format!("{}/{}", self.base, topic.suffix())
        }
    }
}

/// The reservoir state exposed to home-automation integrations.
///
/// The strings are a fixed external contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivedState {
    /// The reservoir is being filled.
    Fill,
    /// The reservoir is being drained.
    Drain,
    /// The level is steady.
    Idle,
}

impl DerivedState {
    /// Returns the published string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fill => "fill",
            Self::Drain => "drain",
            Self::Idle => "idle",
        }
    }

    /// Returns the percentage the level is heading to, if it is moving.
    #[must_use]
    pub const fn target_hint(self) -> Option<u8> {
        match self {
            Self::Fill => Some(100),
            Self::Drain => Some(0),
            Self::Idle => None,
        }
    }
}

impl From<Trend> for DerivedState {
    fn from(trend: Trend) -> Self {
        match trend {
            Trend::Rising => Self::Fill,
            Trend::Falling => Self::Drain,
            Trend::Stable => Self::Idle,
        }
    }
}

/// The structured record published on [`Topic::LevelLog`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelRecord {
    /// ISO 8601 timestamp of the measurement.
    pub timestamp: String,
    /// Fill percentage, rounded to one decimal.
    pub percentage: f64,
    /// Sensor-to-surface distance, rounded to the millimeter.
    pub absolute: u32,
    /// Level trend.
    pub trend: Trend,
}

impl LevelRecord {
    /// Creates a [`LevelRecord`], rounding the measured values.
    #[must_use]
    pub fn new(timestamp: String, percentage: f32, distance_mm: f32, trend: Trend) -> Self {
        Self {
            timestamp,
            percentage: round_one_decimal(percentage),
            absolute: round_mm(distance_mm),
            trend,
        }
    }

    /// Serializes the record into its JSON payload.
    #[must_use]
    pub fn to_json(&self) -> String {
        // A record made of plain strings and numbers cannot fail to serialize.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Rounds a percentage to one decimal.
#[must_use]
pub fn round_one_decimal(value: f32) -> f64 {
    libm::round(f64::from(value) * 10.) / 10.
}

/// Rounds a non-negative distance to the nearest millimeter.
#[must_use]
pub fn round_mm(distance_mm: f32) -> u32 {
    // Plausible distances are positive and far below `u32::MAX`.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let rounded = libm::roundf(distance_mm.max(0.)) as u32;
    rounded
}

/// Rounds a percentage to the nearest integer.
#[must_use]
pub fn round_percent(percentage: f32) -> u8 {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let rounded = libm::roundf(percentage.clamp(0., 100.)) as u8;
    rounded
}
