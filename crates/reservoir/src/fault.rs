use alloc::format;
use alloc::string::String;

use core::fmt;

use log::{error, info, warn};

use crate::connectivity::BusSession;
use crate::reset::ResetReason;
use crate::store::KeyValueStore;
use crate::telemetry::{Topic, Topics};

/// Store namespace of the fault log.
pub const FAULT_NAMESPACE: &str = "faults";
/// Store key of the single fault log entry.
pub const FAULT_KEY: &str = "lastError";

// Separator between the timestamp and the message of an entry.
const SEPARATOR: &str = " -- ";

/// Lifecycle events the node logs about itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// A firmware update has started.
    UpdateStarted,
    /// A firmware update has been written successfully.
    UpdateSucceeded,
    /// A firmware update has failed.
    UpdateFailed,
    /// The daily controlled restart is about to happen.
    DailyRestart,
}

impl Lifecycle {
    /// Returns the logged message.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::UpdateStarted => "Firmware update started",
            Self::UpdateSucceeded => "Firmware update succeeded, restarting",
            Self::UpdateFailed => "Firmware update failed",
            Self::DailyRestart => "Scheduled daily restart",
        }
    }
}

/// Firmware-update messages never re-announced at boot.
const UPDATE_MESSAGES: [Lifecycle; 3] = [
    Lifecycle::UpdateStarted,
    Lifecycle::UpdateSucceeded,
    Lifecycle::UpdateFailed,
];

/// A fault log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultEntry {
    /// ISO 8601 timestamp.
    pub timestamp: String,
    /// Fault message.
    pub message: String,
}

impl FaultEntry {
    /// Creates a [`FaultEntry`].
    #[must_use]
    pub fn new(timestamp: &str, message: &str) -> Self {
        Self {
            timestamp: String::from(timestamp),
            message: String::from(message),
        }
    }

    /// Parses a serialized entry.
    ///
    /// A value without a timestamp prefix is entirely taken as the message.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.split_once(SEPARATOR) {
            Some((timestamp, message)) => Self::new(timestamp, message),
            None => Self::new("", value),
        }
    }
}

impl fmt::Display for FaultEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{SEPARATOR}{}", self.timestamp, self.message)
    }
}

/// Checks whether a prior entry describes the node's own lifecycle and must
/// not be re-announced at boot.
#[must_use]
pub fn is_suppressed(message: &str, reset_reason: ResetReason) -> bool {
    message == reset_reason.message()
        || UPDATE_MESSAGES
            .iter()
            .any(|lifecycle| lifecycle.message() == message)
}

/// The single-slot persistent fault log.
///
/// Writing an entry replaces the prior one. The last entry is also kept in
/// memory and reported by [`FaultLog::last`], even when the store fails.
#[derive(Debug, Clone)]
pub struct FaultLog {
    topic: String,
    last: Option<FaultEntry>,
}

impl FaultLog {
    /// Creates a [`FaultLog`] publishing on the topics of a node.
    #[must_use]
    pub fn new(topics: &Topics) -> Self {
        Self {
            topic: topics.path(Topic::LastError),
            last: None,
        }
    }

    /// Returns the last recorded entry.
    #[must_use]
    pub const fn last(&self) -> Option<&FaultEntry> {
        self.last.as_ref()
    }

    /// Records a fault, replacing the persisted entry, and echoes it over the
    /// bus when a session exists.
    pub fn record(
        &mut self,
        store: &mut impl KeyValueStore,
        bus: &mut impl BusSession,
        timestamp: &str,
        message: &str,
    ) {
        let entry = FaultEntry::new(timestamp, message);
        let serialized = format!("{entry}");
        error!("{serialized}");

        if let Err(e) = store.put(FAULT_NAMESPACE, FAULT_KEY, &serialized) {
            warn!("Fault kept in memory only: {e}");
        }
        self.last = Some(entry);

        self.echo(bus, &serialized);
    }

    /// Reads the entry left by the previous boot, re-announces it unless it
    /// is a lifecycle message of the node itself, clears it, and re-arms the
    /// log with the reset reason of the current boot.
    ///
    /// Must be called exactly once, at startup. Returns the re-announced
    /// entry, if any.
    pub fn read_and_clear(
        &mut self,
        store: &mut impl KeyValueStore,
        bus: &mut impl BusSession,
        timestamp: &str,
        reset_reason: ResetReason,
    ) -> Option<FaultEntry> {
        let prior = match store.get(FAULT_NAMESPACE, FAULT_KEY) {
            Ok(value) => value.unwrap_or_default(),
            Err(e) => {
                warn!("Impossible to read the prior fault: {e}");
                String::new()
            }
        };

        let prior = FaultEntry::parse(&prior);
        let announced = if prior.message.is_empty() || is_suppressed(&prior.message, reset_reason)
        {
            None
        } else {
            info!("Re-announcing the prior fault: {}", prior.message);
            self.echo(bus, &format!("{prior}"));
            Some(prior)
        };

        if let Err(e) = store.remove(FAULT_NAMESPACE, FAULT_KEY) {
            warn!("Impossible to clear the prior fault: {e}");
        }

        self.record(store, bus, timestamp, reset_reason.message());

        announced
    }

    fn echo(&self, bus: &mut impl BusSession, serialized: &str) {
        if !bus.is_connected() {
            return;
        }
        if let Err(e) = bus.publish(&self.topic, serialized, Topic::LastError.retained()) {
            warn!("Fault not echoed over the bus: {e}");
        }
    }
}
