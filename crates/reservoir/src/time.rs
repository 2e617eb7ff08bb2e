use alloc::string::{String, ToString};

use chrono::{DateTime, NaiveDateTime};

// ISO 8601 layout of every timestamp emitted by the node.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// A monotonic millisecond clock, starting at an arbitrary origin.
pub trait Clock {
    /// Returns the milliseconds elapsed since the clock origin.
    fn now_ms(&self) -> u64;
}

/// A calendar clock that may not be synchronized yet.
pub trait WallClock {
    /// Returns the current local calendar time, or [`None`] when the time is
    /// not trustworthy.
    fn now(&self) -> Option<NaiveDateTime>;
}

/// Formats a calendar time as an ISO 8601 timestamp.
#[must_use]
pub fn format_timestamp(time: &NaiveDateTime) -> String {
    time.format(TIMESTAMP_FORMAT).to_string()
}

/// Builds the timestamp of a telemetry record or a fault log entry.
///
/// When the wall clock is unavailable, the monotonic uptime rendered from
/// the Unix epoch is used instead, so the result is always a well-formed
/// ISO 8601 timestamp.
#[must_use]
pub fn timestamp(wall_clock: &impl WallClock, clock: &impl Clock) -> String {
    if let Some(now) = wall_clock.now() {
        return format_timestamp(&now);
    }

    let uptime = i64::try_from(clock.now_ms())
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .map(|time| time.naive_utc())
        .unwrap_or_default();

    format_timestamp(&uptime)
}

/// Milliseconds elapsed between two monotonic instants.
#[inline]
#[must_use]
pub const fn elapsed_ms(since: u64, now: u64) -> u64 {
    now.saturating_sub(since)
}
