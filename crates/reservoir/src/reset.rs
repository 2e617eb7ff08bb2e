use core::fmt;

/// The reason of the last chip reset, as reported by the platform at boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetReason {
    /// Power-on reset.
    PowerOn,
    /// Reset through the external pin.
    External,
    /// Software-requested reset, including controlled restarts.
    Software,
    /// Reset after a panic.
    Panic,
    /// Interrupt watchdog reset.
    InterruptWatchdog,
    /// Task watchdog reset.
    TaskWatchdog,
    /// Any other watchdog reset.
    OtherWatchdog,
    /// Wake up from deep sleep.
    DeepSleep,
    /// Brownout reset.
    Brownout,
    /// Reset over SDIO.
    Sdio,
    /// The reason cannot be determined.
    Unknown,
}

impl ResetReason {
    /// Returns the lifecycle message logged at boot for this reason.
    ///
    /// The message is stable across boots, so that a prior entry can be
    /// compared against it.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::PowerOn => "Reset reason: power-on",
            Self::External => "Reset reason: external pin",
            Self::Software => "Reset reason: software",
            Self::Panic => "Reset reason: panic",
            Self::InterruptWatchdog => "Reset reason: interrupt watchdog",
            Self::TaskWatchdog => "Reset reason: task watchdog",
            Self::OtherWatchdog => "Reset reason: other watchdog",
            Self::DeepSleep => "Reset reason: deep-sleep wake-up",
            Self::Brownout => "Reset reason: brownout",
            Self::Sdio => "Reset reason: SDIO",
            Self::Unknown => "Reset reason: unknown",
        }
    }
}

impl fmt::Display for ResetReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.message().fmt(f)
    }
}
