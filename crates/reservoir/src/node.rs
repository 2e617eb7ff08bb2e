use alloc::string::ToString;

use embedded_hal::delay::DelayNs;

use log::{info, warn};

use crate::config::NodeConfig;
use crate::connectivity::{
    BusSession, BusStatus, ConnectivitySupervisor, Credentials, LinkState, NetworkLink,
};
use crate::error::Result;
use crate::failsafe::{FailsafeAction, FailsafeScheduler, RestartCause};
use crate::fault::FaultLog;
use crate::measurement::{Measurement, MeasurementPipeline};
use crate::reset::ResetReason;
use crate::sensor::RangingSensor;
use crate::store::KeyValueStore;
use crate::telemetry::Topics;
use crate::time::{Clock, WallClock, elapsed_ms, timestamp};
use crate::update::UpdateEndpoint;

/// Message logged when a measurement is due but cannot be published.
pub const SKIPPED_MEASUREMENT: &str = "Measurement skipped: bus session down";

/// The platform services a [`Node`] runs on.
#[derive(Debug)]
pub struct Peripherals<N, B, S, K, C, W, U> {
    /// Network link.
    pub network: N,
    /// Message-bus session.
    pub bus: B,
    /// Ranging sensor.
    pub sensor: S,
    /// Persistent key-value store.
    pub store: K,
    /// Monotonic clock.
    pub clock: C,
    /// Calendar clock.
    pub wall_clock: W,
    /// Firmware-update endpoint.
    pub updates: U,
}

/// What the platform must do after a scheduling tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Keep ticking.
    Continue,
    /// Perform a controlled restart. The cause has already been logged.
    Restart(RestartCause),
}

/// A reservoir fill-level node.
///
/// It owns every component and every platform service, and must be driven
/// by a single cooperative loop calling [`Node::tick`].
#[derive(Debug)]
pub struct Node<N, B, S, K, C, W, U> {
    peripherals: Peripherals<N, B, S, K, C, W, U>,
    supervisor: ConnectivitySupervisor,
    pipeline: MeasurementPipeline,
    fault_log: FaultLog,
    failsafe: FailsafeScheduler,
    reset_reason: ResetReason,
    measurement_interval_ms: u64,
    last_measurement_ms: u64,
}

impl<N, B, S, K, C, W, U> Node<N, B, S, K, C, W, U>
where
    N: NetworkLink,
    B: BusSession,
    S: RangingSensor,
    K: KeyValueStore,
    C: Clock,
    W: WallClock,
    U: UpdateEndpoint,
{
    /// Creates a [`Node`].
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is not valid.
    pub fn new(
        config: &NodeConfig,
        credentials: Option<Credentials>,
        reset_reason: ResetReason,
        peripherals: Peripherals<N, B, S, K, C, W, U>,
    ) -> Result<Self> {
        config.validate()?;

        let topics = Topics::new(&config.base_topic);

        Ok(Self {
            supervisor: ConnectivitySupervisor::new(
                config.retry,
                &config.client_id,
                credentials,
                &topics,
            ),
            fault_log: FaultLog::new(&topics),
            pipeline: MeasurementPipeline::new(
                config.calibration,
                config.publish,
                config.median_samples,
                topics,
            ),
            failsafe: FailsafeScheduler::new(config.daily_restart),
            reset_reason,
            measurement_interval_ms: u64::try_from(config.measurement_interval().as_millis())
                .unwrap_or(u64::MAX),
            last_measurement_ms: peripherals.clock.now_ms(),
            peripherals,
        })
    }

    /// Returns the platform services.
    #[must_use]
    pub const fn peripherals(&self) -> &Peripherals<N, B, S, K, C, W, U> {
        &self.peripherals
    }

    /// Returns the platform services mutably.
    pub const fn peripherals_mut(&mut self) -> &mut Peripherals<N, B, S, K, C, W, U> {
        &mut self.peripherals
    }

    /// Returns the [`ConnectivitySupervisor`].
    #[must_use]
    pub const fn supervisor(&self) -> &ConnectivitySupervisor {
        &self.supervisor
    }

    /// Returns the [`MeasurementPipeline`].
    #[must_use]
    pub const fn pipeline(&self) -> &MeasurementPipeline {
        &self.pipeline
    }

    /// Returns the [`FaultLog`].
    #[must_use]
    pub const fn fault_log(&self) -> &FaultLog {
        &self.fault_log
    }

    /// Releases the platform services.
    pub fn into_peripherals(self) -> Peripherals<N, B, S, K, C, W, U> {
        self.peripherals
    }

    /// Runs the startup phase.
    ///
    /// Both links are established with a bounded blocking backoff, the
    /// fault left by the previous boot is re-announced and replaced by the
    /// reset reason, and a first measurement is published.
    ///
    /// Without a bus session, the first measurement is skipped like any
    /// other, and the first cycle after reconnection publishes.
    pub fn start(&mut self, delay: &mut impl DelayNs) {
        info!("Starting node, {}", self.reset_reason);

        let p = &mut self.peripherals;
        if let Err(e) = self
            .supervisor
            .establish(&mut p.network, &mut p.bus, &p.clock, delay)
        {
            warn!("Startup connection incomplete, retrying in background: {e}");
        }

        let now = timestamp(&p.wall_clock, &p.clock);
        let _ = self
            .fault_log
            .read_and_clear(&mut p.store, &mut p.bus, &now, self.reset_reason);

        if self.bus_ready() {
            let _ = self.perform_measurement(true);
        } else {
            self.log_fault(SKIPPED_MEASUREMENT);
        }
        self.last_measurement_ms = self.peripherals.clock.now_ms();
    }

    /// Runs one scheduling tick.
    ///
    /// The update endpoint is serviced first. Unless an update is in
    /// progress, the bus is then serviced, both links are supervised, and a
    /// measurement runs if the interval has elapsed and no update started in
    /// the meantime. The daily restart check always runs last.
    pub fn tick(&mut self) -> TickOutcome {
        if let Some(event) = self.peripherals.updates.poll() {
            match self.failsafe.on_update_event(event) {
                FailsafeAction::Log(lifecycle) => self.log_fault(lifecycle.message()),
                FailsafeAction::Restart(cause) => return self.restart(cause),
            }
        }

        if !self.update_in_progress() {
            self.supervise();
            // Servicing the bus may have started an upload.
            if !self.update_in_progress() {
                self.schedule_measurement();
            }
        }

        let now = self.peripherals.wall_clock.now();
        if self.failsafe.check_daily_restart(now) {
            return self.restart(RestartCause::DailySchedule);
        }

        TickOutcome::Continue
    }

    /// Checks whether a firmware update is in progress.
    #[must_use]
    pub fn update_in_progress(&self) -> bool {
        self.failsafe.update_in_progress() || self.peripherals.updates.is_busy()
    }

    /// Runs a measurement cycle, logging a sensor fault if it aborts.
    pub fn perform_measurement(&mut self, force: bool) -> Option<Measurement> {
        let p = &mut self.peripherals;
        match self
            .pipeline
            .perform(force, &mut p.sensor, &mut p.bus, &p.clock, &p.wall_clock)
        {
            Ok(measurement) => Some(measurement),
            Err(fault) => {
                self.log_fault(&fault.to_string());
                None
            }
        }
    }

    fn supervise(&mut self) {
        let p = &mut self.peripherals;
        p.bus.service();

        let network_up = self.supervisor.ensure_network(&mut p.network, &p.clock);
        if self.supervisor.ensure_bus(&mut p.bus, network_up, &p.clock) == BusStatus::Reconnected
        {
            info!("Bus session restored");
        }
    }

    // Telemetry only flows once presence has been announced on a live session.
    fn bus_ready(&self) -> bool {
        self.supervisor.bus_state() == LinkState::Connected && self.peripherals.bus.is_connected()
    }

    fn schedule_measurement(&mut self) {
        let now = self.peripherals.clock.now_ms();
        if elapsed_ms(self.last_measurement_ms, now) < self.measurement_interval_ms {
            return;
        }
        self.last_measurement_ms = now;

        if self.bus_ready() {
            let _ = self.perform_measurement(false);
        } else {
            self.log_fault(SKIPPED_MEASUREMENT);
        }
    }

    fn restart(&mut self, cause: RestartCause) -> TickOutcome {
        self.log_fault(cause.lifecycle().message());
        TickOutcome::Restart(cause)
    }

    fn log_fault(&mut self, message: &str) {
        let p = &mut self.peripherals;
        let now = timestamp(&p.wall_clock, &p.clock);
        self.fault_log.record(&mut p.store, &mut p.bus, &now, message);
    }
}
