use tracing::{info, warn};

use reservoir::error::Result as EngineResult;
use reservoir::failsafe::RestartCause;
use reservoir::reset::ResetReason;
use reservoir::store::KeyValueStore;

/// Store namespace of the boot marker.
pub const BOOT_NAMESPACE: &str = "system";
/// Store key of the boot marker.
pub const BOOT_KEY: &str = "boot";

// The process is running, or died without a controlled restart.
const RUNNING: &str = "running";
// The process exited through a controlled restart.
const RESTARTED: &str = "restarted";

/// Determines why the process has been started, then marks it as running.
///
/// A process is a software reset when the previous one exited through
/// [`mark_restart`], and a power-on when no previous process left a marker.
/// A marker still set to running means the previous process died, so the
/// reason is unknown.
pub fn boot(store: &mut impl KeyValueStore) -> ResetReason {
    let reason = match store.get(BOOT_NAMESPACE, BOOT_KEY) {
        Ok(Some(marker)) if marker == RESTARTED => ResetReason::Software,
        Ok(Some(_)) => ResetReason::Unknown,
        Ok(None) => ResetReason::PowerOn,
        Err(e) => {
            warn!("Impossible to read the boot marker: {e}");
            ResetReason::Unknown
        }
    };

    if let Err(e) = store.put(BOOT_NAMESPACE, BOOT_KEY, RUNNING) {
        warn!("Impossible to write the boot marker: {e}");
    }

    info!("{reason}");
    reason
}

/// Marks the process as exiting through a controlled restart.
///
/// # Errors
///
/// Returns an error if the marker cannot be persisted.
pub fn mark_restart(store: &mut impl KeyValueStore, cause: RestartCause) -> EngineResult<()> {
    info!("Restarting: {cause}");
    store.put(BOOT_NAMESPACE, BOOT_KEY, RESTARTED)
}
