use alloc::string::String;

use embedded_hal::delay::DelayNs;

use log::{info, warn};

use crate::config::RetryPolicy;
use crate::error::{Error, ErrorKind, Result};
use crate::telemetry::{OFFLINE, ONLINE, Topic, Topics};
use crate::time::{Clock, elapsed_ms};

// Interval between two checks of a pending session during startup.
const SESSION_POLL_MS: u32 = 50;

/// The network link of the node.
pub trait NetworkLink {
    /// Checks whether the link is up.
    fn is_connected(&self) -> bool;

    /// Starts a connection attempt and returns immediately.
    fn begin(&mut self);
}

/// Credentials of a bus session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// User name.
    pub username: String,
    /// Password.
    pub password: String,
}

impl Credentials {
    /// Builds [`Credentials`] only when both user name and password are set.
    #[must_use]
    pub fn from_parts(username: Option<String>, password: Option<String>) -> Option<Self> {
        match (username, password) {
            (Some(username), Some(password)) if !username.is_empty() && !password.is_empty() => {
                Some(Self { username, password })
            }
            _ => None,
        }
    }
}

/// A message the broker publishes on behalf of a node that disconnects
/// uncleanly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastWill {
    /// Topic path.
    pub topic: String,
    /// Payload.
    pub payload: &'static str,
    /// Whether the broker retains the message.
    pub retained: bool,
}

/// Everything needed to open a bus session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest<'a> {
    /// Client identifier.
    pub client_id: &'a str,
    /// Credentials, or [`None`] for an anonymous session.
    pub credentials: Option<&'a Credentials>,
    /// The dead-man's-switch message.
    pub last_will: &'a LastWill,
}

/// A publish/subscribe message-bus session.
pub trait BusSession {
    /// Checks whether a session is established.
    fn is_connected(&self) -> bool;

    /// Checks whether a session attempt is still in flight.
    ///
    /// A pending attempt completes or fails within a bounded time while the
    /// session is serviced. Sessions opened synchronously are never pending.
    fn is_connecting(&self) -> bool {
        false
    }

    /// Starts opening a session.
    ///
    /// The session is either established before returning, or later while
    /// the session is serviced, see [`BusSession::is_connecting`].
    ///
    /// # Errors
    ///
    /// Returns an error if the attempt cannot be started or the broker
    /// refuses the session right away.
    fn connect(&mut self, request: &ConnectRequest<'_>) -> Result<()>;

    /// Publishes a payload on a topic.
    ///
    /// # Errors
    ///
    /// Returns an error if no session exists or the message cannot be
    /// queued.
    fn publish(&mut self, topic: &str, payload: &str, retained: bool) -> Result<()>;

    /// Drives keep-alives and inbound dispatch.
    ///
    /// Must be called on every scheduling tick, whatever the session state.
    fn service(&mut self);
}

/// The state of a supervised link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LinkState {
    /// No connection and no attempt in flight.
    #[default]
    Disconnected,
    /// An attempt has been started and has not completed yet.
    Connecting,
    /// The link is up.
    Connected,
}

/// Rate-limits connection attempts of a single link.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconnector {
    state: LinkState,
    last_attempt_ms: Option<u64>,
    retry_interval_ms: u64,
}

impl Reconnector {
    /// Creates a [`Reconnector`] with the given retry interval.
    #[must_use]
    pub const fn new(retry_interval_ms: u64) -> Self {
        Self {
            state: LinkState::Disconnected,
            last_attempt_ms: None,
            retry_interval_ms,
        }
    }

    /// Returns the [`LinkState`].
    #[must_use]
    pub const fn state(&self) -> LinkState {
        self.state
    }

    /// Returns the instant of the last attempt.
    #[must_use]
    pub const fn last_attempt_ms(&self) -> Option<u64> {
        self.last_attempt_ms
    }

    /// Checks whether a new attempt is allowed at `now_ms`.
    #[must_use]
    pub fn may_attempt(&self, now_ms: u64) -> bool {
        self.last_attempt_ms
            .is_none_or(|last| elapsed_ms(last, now_ms) >= self.retry_interval_ms)
    }

    /// Records an attempt started at `now_ms`.
    pub fn attempted(&mut self, now_ms: u64) {
        self.last_attempt_ms = Some(now_ms);
        self.state = LinkState::Connecting;
    }

    /// Records the link status observed at `now_ms`.
    ///
    /// An attempt that has not brought the link up once the retry interval
    /// has elapsed is over.
    pub fn observe(&mut self, connected: bool, now_ms: u64) {
        self.state = match (connected, self.state) {
            (true, _) => LinkState::Connected,
            (false, LinkState::Connecting) if !self.may_attempt(now_ms) => LinkState::Connecting,
            (false, _) => LinkState::Disconnected,
        };
    }

    /// Marks the link as down.
    pub fn lost(&mut self) {
        self.state = LinkState::Disconnected;
    }
}

/// What a supervision step did to the bus session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusStatus {
    /// The session was already established.
    Connected,
    /// The session has just been established and presence announced.
    Reconnected,
    /// A session attempt is in flight.
    Connecting,
    /// The session is down.
    Disconnected,
}

/// Supervises the network link and the bus session.
///
/// Both links are retried forever at a bounded rate. Outside of
/// [`ConnectivitySupervisor::establish`], no operation ever blocks.
#[derive(Debug, Clone)]
pub struct ConnectivitySupervisor {
    network: Reconnector,
    bus: Reconnector,
    retry: RetryPolicy,
    client_id: String,
    credentials: Option<Credentials>,
    last_will: LastWill,
    status_topic: String,
}

impl ConnectivitySupervisor {
    /// Creates a [`ConnectivitySupervisor`].
    #[must_use]
    pub fn new(
        retry: RetryPolicy,
        client_id: &str,
        credentials: Option<Credentials>,
        topics: &Topics,
    ) -> Self {
        let status_topic = topics.path(Topic::Status);
        Self {
            network: Reconnector::new(u64::from(retry.network_retry_secs) * 1000),
            bus: Reconnector::new(u64::from(retry.bus_retry_secs) * 1000),
            retry,
            client_id: String::from(client_id),
            credentials,
            last_will: LastWill {
                topic: status_topic.clone(),
                payload: OFFLINE,
                retained: Topic::Status.retained(),
            },
            status_topic,
        }
    }

    /// Returns the network [`LinkState`].
    #[must_use]
    pub const fn network_state(&self) -> LinkState {
        self.network.state()
    }

    /// Returns the bus [`LinkState`].
    #[must_use]
    pub const fn bus_state(&self) -> LinkState {
        self.bus.state()
    }

    /// Ensures the network link is up, starting a new attempt if it is down
    /// and the retry interval has elapsed.
    ///
    /// Never blocks.
    pub fn ensure_network(&mut self, link: &mut impl NetworkLink, clock: &impl Clock) -> bool {
        let now = clock.now_ms();
        let connected = link.is_connected();
        self.network.observe(connected, now);

        if connected {
            return true;
        }

        if self.network.may_attempt(now) {
            warn!("Network link is down, starting a new attempt");
            link.begin();
            self.network.attempted(now);
        }

        false
    }

    /// Ensures the bus session is up.
    ///
    /// When the session is down, the network is up, and the retry interval
    /// has elapsed, a single connection attempt is started. An attempt the
    /// bus completes asynchronously is reported as connecting until the
    /// session is acknowledged. As soon as a session is up, the retained
    /// `online` presence is published before anything else.
    ///
    /// Never blocks.
    pub fn ensure_bus(
        &mut self,
        bus: &mut impl BusSession,
        network_up: bool,
        clock: &impl Clock,
    ) -> BusStatus {
        let now = clock.now_ms();

        if bus.is_connected() {
            if self.bus.state() == LinkState::Connected {
                return BusStatus::Connected;
            }
            self.session_opened(bus, now);
            return BusStatus::Reconnected;
        }

        if bus.is_connecting() {
            return BusStatus::Connecting;
        }

        self.bus.lost();
        if !network_up || !self.bus.may_attempt(now) {
            return BusStatus::Disconnected;
        }

        self.bus.attempted(now);
        if !self.start_session(bus) {
            self.bus.lost();
            return BusStatus::Disconnected;
        }

        if bus.is_connected() {
            self.session_opened(bus, now);
            BusStatus::Reconnected
        } else {
            BusStatus::Connecting
        }
    }

    /// Establishes both links during the startup phase.
    ///
    /// Each link gets a bounded number of attempts separated by an
    /// exponential backoff. This is the only blocking operation of the
    /// supervisor.
    ///
    /// # Errors
    ///
    /// Returns an error if a link is still down once its attempts are
    /// exhausted. The steady-state supervision keeps retrying afterwards.
    pub fn establish(
        &mut self,
        link: &mut impl NetworkLink,
        bus: &mut impl BusSession,
        clock: &impl Clock,
        delay: &mut impl DelayNs,
    ) -> Result<()> {
        let mut backoff = Backoff::new(&self.retry);

        info!("Connecting to the network...");
        link.begin();
        self.network.attempted(clock.now_ms());
        while !link.is_connected() {
            let Some(wait) = backoff.next_delay() else {
                self.network.lost();
                return Err(Error::new(
                    ErrorKind::Timeout,
                    "The network link is still down after the startup attempts.",
                ));
            };
            delay.delay_ms(wait);
            if !link.is_connected() {
                link.begin();
                self.network.attempted(clock.now_ms());
            }
        }
        self.network.observe(true, clock.now_ms());
        info!("Network link is up");

        let mut backoff = Backoff::new(&self.retry);
        loop {
            self.bus.attempted(clock.now_ms());
            if self.start_session(bus) {
                while bus.is_connecting() {
                    delay.delay_ms(SESSION_POLL_MS);
                    bus.service();
                }
                if bus.is_connected() {
                    self.session_opened(bus, clock.now_ms());
                    return Ok(());
                }
                warn!("Bus session attempt not acknowledged");
            }
            self.bus.lost();

            let Some(wait) = backoff.next_delay() else {
                return Err(Error::new(
                    ErrorKind::Timeout,
                    "The bus session is still down after the startup attempts.",
                ));
            };
            delay.delay_ms(wait);
        }
    }

    fn start_session(&self, bus: &mut impl BusSession) -> bool {
        let request = ConnectRequest {
            client_id: &self.client_id,
            credentials: self.credentials.as_ref(),
            last_will: &self.last_will,
        };

        match bus.connect(&request) {
            Ok(()) => true,
            Err(e) => {
                warn!("Bus session attempt failed: {e}");
                false
            }
        }
    }

    fn session_opened(&mut self, bus: &mut impl BusSession, now_ms: u64) {
        self.bus.observe(true, now_ms);
        info!("Bus session established");

        if let Err(e) = bus.publish(&self.status_topic, ONLINE, Topic::Status.retained()) {
            warn!("Impossible to announce presence: {e}");
        }
    }
}

// Exponential backoff bounded in both delay and number of attempts.
struct Backoff {
    remaining: u8,
    next_ms: u32,
    max_ms: u32,
}

impl Backoff {
    fn new(retry: &RetryPolicy) -> Self {
        Self {
            // The first attempt is not preceded by a delay.
            remaining: retry.startup_attempts.saturating_sub(1),
            next_ms: retry.startup_backoff_ms,
            max_ms: retry.startup_backoff_max_ms,
        }
    }

    fn next_delay(&mut self) -> Option<u32> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let delay = self.next_ms.min(self.max_ms);
        self.next_ms = self.next_ms.saturating_mul(2);
        Some(delay)
    }
}

#[cfg(test)]
mod tests {
    use alloc::string::String;
    use alloc::vec::Vec;

    use crate::config::RetryPolicy;
    use crate::telemetry::Topics;
    use crate::tests::{FakeNetwork, ManualClock, RecordingBus, RecordingDelay};

    use super::{Backoff, BusSession, BusStatus, ConnectivitySupervisor, Credentials, LinkState, Reconnector};

    fn supervisor(credentials: Option<Credentials>) -> ConnectivitySupervisor {
        ConnectivitySupervisor::new(
            RetryPolicy::default(),
            "node-1",
            credentials,
            &Topics::new("tank"),
        )
    }

    #[test]
    fn credentials_need_both_parts() {
        assert!(Credentials::from_parts(Some("user".into()), None).is_none());
        assert!(Credentials::from_parts(Some(String::new()), Some("pw".into())).is_none());
        assert!(Credentials::from_parts(Some("user".into()), Some("pw".into())).is_some());
    }

    #[test]
    fn reconnector_rate_limits_attempts() {
        let mut reconnector = Reconnector::new(10_000);
        assert!(reconnector.may_attempt(0));

        reconnector.attempted(1_000);
        assert_eq!(reconnector.last_attempt_ms(), Some(1_000));
        assert_eq!(reconnector.state(), LinkState::Connecting);
        assert!(!reconnector.may_attempt(10_999));
        assert!(reconnector.may_attempt(11_000));

        reconnector.observe(true, 2_000);
        assert_eq!(reconnector.state(), LinkState::Connected);
        reconnector.lost();
        assert_eq!(reconnector.state(), LinkState::Disconnected);
    }

    #[test]
    fn unanswered_attempt_expires_after_retry_interval() {
        let mut reconnector = Reconnector::new(10_000);
        reconnector.attempted(1_000);

        reconnector.observe(false, 5_000);
        assert_eq!(reconnector.state(), LinkState::Connecting);

        reconnector.observe(false, 11_000);
        assert_eq!(reconnector.state(), LinkState::Disconnected);

        // Once over, the attempt stays over.
        reconnector.observe(false, 11_500);
        assert_eq!(reconnector.state(), LinkState::Disconnected);
    }

    #[test]
    fn bus_reconnection_announces_presence_first() {
        let mut supervisor = supervisor(None);
        let mut bus = RecordingBus::disconnected();
        let clock = ManualClock::new(0);

        assert_eq!(
            supervisor.ensure_bus(&mut bus, true, &clock),
            BusStatus::Reconnected
        );
        assert_eq!(supervisor.bus_state(), LinkState::Connected);

        let request = bus.last_request().unwrap();
        assert_eq!(request.client_id, "node-1");
        assert!(request.credentials.is_none());
        assert_eq!(request.will_topic, "tank/status");
        assert_eq!(request.will_payload, "offline");
        assert!(request.will_retained);

        let first = bus.published().first().cloned().unwrap();
        assert_eq!(first.topic, "tank/status");
        assert_eq!(first.payload, "online");
        assert!(first.retained);

        assert_eq!(
            supervisor.ensure_bus(&mut bus, true, &clock),
            BusStatus::Connected
        );
        assert_eq!(bus.connect_attempts(), 1);
    }

    #[test]
    fn pending_session_announces_presence_once_acknowledged() {
        let mut supervisor = supervisor(None);
        let mut bus = RecordingBus::acknowledging_after(2);
        let clock = ManualClock::new(0);

        assert_eq!(
            supervisor.ensure_bus(&mut bus, true, &clock),
            BusStatus::Connecting
        );
        assert_eq!(supervisor.bus_state(), LinkState::Connecting);
        assert!(bus.published().is_empty());

        bus.service();
        clock.set(100);
        assert_eq!(
            supervisor.ensure_bus(&mut bus, true, &clock),
            BusStatus::Connecting
        );
        assert_eq!(bus.connect_attempts(), 1);

        bus.service();
        clock.set(200);
        assert_eq!(
            supervisor.ensure_bus(&mut bus, true, &clock),
            BusStatus::Reconnected
        );
        assert_eq!(supervisor.bus_state(), LinkState::Connected);
        assert_eq!(bus.published().len(), 1);
        assert_eq!(bus.published()[0].payload, "online");
    }

    #[test]
    fn bus_connects_with_credentials() {
        let credentials = Credentials::from_parts(Some("user".into()), Some("secret".into()));
        let mut supervisor = supervisor(credentials);
        let mut bus = RecordingBus::disconnected();
        let clock = ManualClock::new(0);

        let _ = supervisor.ensure_bus(&mut bus, true, &clock);

        let request = bus.last_request().unwrap();
        assert_eq!(
            request.credentials,
            Some((String::from("user"), String::from("secret")))
        );
    }

    #[test]
    fn bus_retries_every_ten_seconds() {
        let mut supervisor = supervisor(None);
        let mut bus = RecordingBus::refusing();
        let clock = ManualClock::new(0);

        assert_eq!(
            supervisor.ensure_bus(&mut bus, true, &clock),
            BusStatus::Disconnected
        );
        assert_eq!(bus.connect_attempts(), 1);

        clock.set(9_999);
        let _ = supervisor.ensure_bus(&mut bus, true, &clock);
        assert_eq!(bus.connect_attempts(), 1);

        clock.set(10_000);
        let _ = supervisor.ensure_bus(&mut bus, true, &clock);
        assert_eq!(bus.connect_attempts(), 2);
        assert_eq!(supervisor.bus_state(), LinkState::Disconnected);
        assert!(bus.published().is_empty());
    }

    #[test]
    fn bus_waits_for_network() {
        let mut supervisor = supervisor(None);
        let mut bus = RecordingBus::disconnected();
        let clock = ManualClock::new(0);

        assert_eq!(
            supervisor.ensure_bus(&mut bus, false, &clock),
            BusStatus::Disconnected
        );
        assert_eq!(bus.connect_attempts(), 0);
    }

    #[test]
    fn network_is_restarted_without_blocking() {
        let mut supervisor = supervisor(None);
        let mut network = FakeNetwork::down();
        let clock = ManualClock::new(0);

        assert!(!supervisor.ensure_network(&mut network, &clock));
        assert_eq!(network.begin_calls(), 1);
        assert_eq!(supervisor.network_state(), LinkState::Connecting);

        clock.set(5_000);
        assert!(!supervisor.ensure_network(&mut network, &clock));
        assert_eq!(network.begin_calls(), 1);

        network.set_up(true);
        assert!(supervisor.ensure_network(&mut network, &clock));
        assert_eq!(supervisor.network_state(), LinkState::Connected);
    }

    #[test]
    fn establish_retries_with_backoff() {
        let mut supervisor = supervisor(None);
        // The link comes up on the third attempt.
        let mut network = FakeNetwork::up_after(2);
        let mut bus = RecordingBus::disconnected();
        let clock = ManualClock::new(0);
        let mut delay = RecordingDelay::default();

        supervisor
            .establish(&mut network, &mut bus, &clock, &mut delay)
            .unwrap();

        assert_eq!(delay.waits_ms(), &[500, 1000]);
        assert_eq!(supervisor.network_state(), LinkState::Connected);
        assert_eq!(supervisor.bus_state(), LinkState::Connected);
        assert_eq!(bus.published()[0].payload, "online");
    }

    #[test]
    fn establish_waits_for_pending_session() {
        let mut supervisor = supervisor(None);
        let mut network = FakeNetwork::up_after(0);
        let mut bus = RecordingBus::acknowledging_after(3);
        let clock = ManualClock::new(0);
        let mut delay = RecordingDelay::default();

        supervisor
            .establish(&mut network, &mut bus, &clock, &mut delay)
            .unwrap();

        assert_eq!(delay.waits_ms(), &[50, 50, 50]);
        assert_eq!(bus.connect_attempts(), 1);
        assert_eq!(supervisor.bus_state(), LinkState::Connected);
        assert_eq!(bus.published()[0].payload, "online");
    }

    #[test]
    fn establish_gives_up_after_bounded_attempts() {
        let mut supervisor = supervisor(None);
        let mut network = FakeNetwork::up_after(0);
        let mut bus = RecordingBus::refusing();
        let clock = ManualClock::new(0);
        let mut delay = RecordingDelay::default();

        assert!(
            supervisor
                .establish(&mut network, &mut bus, &clock, &mut delay)
                .is_err()
        );
        assert_eq!(bus.connect_attempts(), 5);
        assert_eq!(delay.waits_ms(), &[500, 1000, 2000, 4000]);
    }

    #[test]
    fn backoff_is_capped() {
        let retry = RetryPolicy {
            startup_attempts: 7,
            startup_backoff_ms: 2000,
            startup_backoff_max_ms: 5000,
            ..RetryPolicy::default()
        };
        let mut backoff = Backoff::new(&retry);

        let delays: Vec<u32> = core::iter::from_fn(|| backoff.next_delay()).collect();
        assert_eq!(delays, [2000, 4000, 5000, 5000, 5000, 5000]);
    }
}
