use std::thread;
use std::time::{Duration, Instant};

use chrono::{Datelike, Local, NaiveDateTime};

use embedded_hal::delay::DelayNs;

use reservoir::time::{Clock, WallClock};

/// Calendar years before this one denote an unsynchronized system clock.
pub const MIN_SYNCHRONIZED_YEAR: i32 = 2024;

/// A monotonic [`Clock`] counting from its creation.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemClock {
    /// Creates a [`SystemClock`] starting now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// The local-time [`WallClock`] of the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalWallClock;

impl WallClock for LocalWallClock {
    fn now(&self) -> Option<NaiveDateTime> {
        synchronized(Local::now().naive_local())
    }
}

// A system clock stuck in the past has never been synchronized.
fn synchronized(now: NaiveDateTime) -> Option<NaiveDateTime> {
    (now.year() >= MIN_SYNCHRONIZED_YEAR).then_some(now)
}

/// A blocking [`DelayNs`] sleeping the current thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadDelay;

impl DelayNs for ThreadDelay {
    fn delay_ns(&mut self, ns: u32) {
        thread::sleep(Duration::from_nanos(u64::from(ns)));
    }

    fn delay_ms(&mut self, ms: u32) {
        thread::sleep(Duration::from_millis(u64::from(ms)));
    }
}
