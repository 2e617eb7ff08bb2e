use core::fmt;

use chrono::{NaiveDateTime, Timelike};

use log::{info, warn};

use crate::config::RestartTime;
use crate::fault::Lifecycle;
use crate::update::UpdateEvent;

/// Why the node asks the platform for a controlled restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartCause {
    /// The daily restart time has been reached.
    DailySchedule,
    /// A firmware image has been written and must be booted.
    FirmwareUpdated,
}

impl RestartCause {
    /// Returns the lifecycle event logged right before the restart.
    #[must_use]
    pub const fn lifecycle(self) -> Lifecycle {
        match self {
            Self::DailySchedule => Lifecycle::DailyRestart,
            Self::FirmwareUpdated => Lifecycle::UpdateSucceeded,
        }
    }
}

impl fmt::Display for RestartCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.lifecycle().message().fmt(f)
    }
}

/// What the node must do after an update-endpoint event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailsafeAction {
    /// Log the lifecycle event and keep running.
    Log(Lifecycle),
    /// Log the lifecycle event of the cause and restart.
    Restart(RestartCause),
}

/// Triggers the controlled daily restart and gates the node during
/// firmware updates.
#[derive(Debug, Clone)]
pub struct FailsafeScheduler {
    restart_at: RestartTime,
    // Set once the clock has been seen outside of the restart minute.
    armed: bool,
    updating: bool,
}

impl FailsafeScheduler {
    /// Creates a [`FailsafeScheduler`].
    ///
    /// The daily restart is armed only after the wall clock has been observed
    /// outside of the restart minute, so a node booting within that minute
    /// does not restart again.
    #[must_use]
    pub const fn new(restart_at: RestartTime) -> Self {
        Self {
            restart_at,
            armed: false,
            updating: false,
        }
    }

    /// Checks whether the daily restart must happen now.
    ///
    /// Returns `true` at most once per restart minute. Without a trustworthy
    /// wall clock, the check is a no-op.
    pub fn check_daily_restart(&mut self, now: Option<NaiveDateTime>) -> bool {
        let Some(now) = now else {
            return false;
        };

        if now.hour() != self.restart_at.hour || now.minute() != self.restart_at.minute {
            self.armed = true;
            return false;
        }

        if !self.armed {
            return false;
        }

        self.armed = false;
        info!(
            "Daily restart time {:02}:{:02} reached",
            self.restart_at.hour, self.restart_at.minute
        );
        true
    }

    /// Tracks an update-endpoint event.
    pub fn on_update_event(&mut self, event: UpdateEvent) -> FailsafeAction {
        match event {
            UpdateEvent::Started => {
                info!("Firmware update started, suspending measurements");
                self.updating = true;
                FailsafeAction::Log(Lifecycle::UpdateStarted)
            }
            UpdateEvent::Ended { success: true } => {
                self.updating = false;
                FailsafeAction::Restart(RestartCause::FirmwareUpdated)
            }
            UpdateEvent::Ended { success: false } => {
                warn!("Firmware update failed, resuming measurements");
                self.updating = false;
                FailsafeAction::Log(Lifecycle::UpdateFailed)
            }
        }
    }

    /// Checks whether a firmware update is in progress.
    ///
    /// While it is, measurements and connectivity supervision are suspended.
    #[must_use]
    pub const fn update_in_progress(&self) -> bool {
        self.updating
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveDateTime};

    use crate::config::RestartTime;
    use crate::fault::Lifecycle;
    use crate::update::UpdateEvent;

    use super::{FailsafeAction, FailsafeScheduler, RestartCause};

    fn at(day: u32, hour: u32, minute: u32, second: u32) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(2025, 6, day).and_then(|date| date.and_hms_opt(hour, minute, second))
    }

    #[test]
    fn restarts_once_per_day() {
        let mut scheduler = FailsafeScheduler::new(RestartTime::default());

        assert!(!scheduler.check_daily_restart(at(1, 1, 59, 59)));

        // Checked every second through the whole restart minute.
        let fired = (0..60)
            .filter(|&second| scheduler.check_daily_restart(at(1, 2, 0, second)))
            .count();
        assert_eq!(fired, 1);

        assert!(!scheduler.check_daily_restart(at(1, 2, 1, 0)));
        assert!(scheduler.check_daily_restart(at(2, 2, 0, 0)));
    }

    #[test]
    fn boot_within_restart_minute_does_not_restart() {
        let mut scheduler = FailsafeScheduler::new(RestartTime::default());

        assert!(!scheduler.check_daily_restart(at(1, 2, 0, 5)));
        assert!(!scheduler.check_daily_restart(at(1, 2, 0, 6)));
        assert!(!scheduler.check_daily_restart(at(1, 2, 1, 0)));
        assert!(scheduler.check_daily_restart(at(2, 2, 0, 0)));
    }

    #[test]
    fn unavailable_clock_never_restarts() {
        let mut scheduler = FailsafeScheduler::new(RestartTime::default());

        assert!(!scheduler.check_daily_restart(at(1, 1, 0, 0)));
        assert!(!scheduler.check_daily_restart(None));
        assert!(scheduler.check_daily_restart(at(1, 2, 0, 30)));
    }

    #[test]
    fn custom_restart_time() {
        let mut scheduler = FailsafeScheduler::new(RestartTime {
            hour: 23,
            minute: 45,
        });

        assert!(!scheduler.check_daily_restart(at(1, 2, 0, 0)));
        assert!(scheduler.check_daily_restart(at(1, 23, 45, 10)));
    }

    #[test]
    fn update_gating() {
        let mut scheduler = FailsafeScheduler::new(RestartTime::default());
        assert!(!scheduler.update_in_progress());

        assert_eq!(
            scheduler.on_update_event(UpdateEvent::Started),
            FailsafeAction::Log(Lifecycle::UpdateStarted)
        );
        assert!(scheduler.update_in_progress());

        assert_eq!(
            scheduler.on_update_event(UpdateEvent::Ended { success: false }),
            FailsafeAction::Log(Lifecycle::UpdateFailed)
        );
        assert!(!scheduler.update_in_progress());

        let _ = scheduler.on_update_event(UpdateEvent::Started);
        assert_eq!(
            scheduler.on_update_event(UpdateEvent::Ended { success: true }),
            FailsafeAction::Restart(RestartCause::FirmwareUpdated)
        );
    }

    #[test]
    fn restart_causes_are_lifecycle_events() {
        assert_eq!(
            RestartCause::DailySchedule.lifecycle(),
            Lifecycle::DailyRestart
        );
        assert_eq!(
            RestartCause::FirmwareUpdated.lifecycle(),
            Lifecycle::UpdateSucceeded
        );
    }
}
