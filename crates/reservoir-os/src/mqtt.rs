use std::thread;
use std::time::{Duration, Instant};

use flume::{Receiver, TryRecvError};

use rumqttc::{
    Client, ConnectReturnCode, Connection, Event, LastWill, MqttOptions, Packet, QoS,
    RecvTimeoutError,
};

use tracing::{debug, info, trace, warn};

use reservoir::connectivity::{BusSession, ConnectRequest};
use reservoir::error::Result as EngineResult;

use crate::config::BrokerConfig;
use crate::error::{Error, ErrorKind, Result};

// Capacity of the request channel between client and event loop.
const CHANNEL_CAPACITY: usize = 32;
// Longest time a single service call waits for an event.
const SERVICE_SLICE: Duration = Duration::from_millis(5);
// Events handled at most per service call.
const MAX_EVENTS_PER_SERVICE: usize = 32;

struct Session {
    client: Client,
    connection: Connection,
}

enum State {
    Idle,
    // The handshake runs on its own thread, since a connection attempt
    // cannot be resumed across short event-loop slices.
    Pending(Receiver<Result<Session>>),
    Open(Session),
}

/// A [`BusSession`] over an MQTT 3.1.1 broker.
///
/// Opening a session never blocks: the handshake runs in the background,
/// bounded by the configured connection timeout, and its outcome is picked
/// up by the following [`BusSession::service`] calls. Publishing only queues
/// the message, which is written out while the session is serviced.
pub struct MqttSession {
    broker: BrokerConfig,
    state: State,
}

impl MqttSession {
    /// Creates a [`MqttSession`] towards the given broker, without
    /// connecting.
    #[must_use]
    pub const fn new(broker: BrokerConfig) -> Self {
        Self {
            broker,
            state: State::Idle,
        }
    }

    /// Drives the session for `duration`, so that queued messages reach the
    /// broker before the process ends.
    pub fn flush(&mut self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while self.is_connected() && Instant::now() < deadline {
            self.service();
        }
    }

    fn options(&self, request: &ConnectRequest<'_>) -> MqttOptions {
        let mut options = MqttOptions::new(request.client_id, &self.broker.host, self.broker.port);

        let last_will = LastWill::new(
            &request.last_will.topic,
            request.last_will.payload,
            QoS::AtLeastOnce,
            request.last_will.retained,
        );

        let _ = options
            .set_keep_alive(self.broker.keep_alive())
            .set_clean_session(true)
            .set_last_will(last_will);

        if let Some(credentials) = request.credentials {
            let _ = options.set_credentials(&credentials.username, &credentials.password);
        }

        options
    }

    fn close(&mut self) {
        match std::mem::replace(&mut self.state, State::Idle) {
            State::Open(_) => info!("MQTT session closed"),
            State::Pending(_) => debug!("Pending MQTT session abandoned"),
            State::Idle => {}
        }
    }

    fn poll_handshake(&mut self) {
        let State::Pending(receiver) = &self.state else {
            return;
        };

        match receiver.try_recv() {
            Err(TryRecvError::Empty) => {}
            Ok(Ok(session)) => {
                info!("MQTT session accepted");
                self.state = State::Open(session);
            }
            Ok(Err(e)) => {
                warn!("MQTT session not opened: {e}");
                self.state = State::Idle;
            }
            Err(TryRecvError::Disconnected) => {
                warn!("MQTT handshake ended without an outcome");
                self.state = State::Idle;
            }
        }
    }

    fn drain_events(&mut self) {
        let State::Open(session) = &mut self.state else {
            return;
        };

        let mut lost = false;
        for _ in 0..MAX_EVENTS_PER_SERVICE {
            match session.connection.recv_timeout(SERVICE_SLICE) {
                Ok(Ok(Event::Incoming(Packet::Disconnect))) => {
                    warn!("The broker closed the MQTT session");
                    lost = true;
                    break;
                }
                Ok(Ok(event)) => trace!("MQTT event: {event:?}"),
                Ok(Err(e)) => {
                    warn!("MQTT session lost: {e}");
                    lost = true;
                    break;
                }
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => {
                    lost = true;
                    break;
                }
            }
        }

        if lost {
            self.close();
        }
    }
}

impl BusSession for MqttSession {
    fn is_connected(&self) -> bool {
        matches!(self.state, State::Open(_))
    }

    fn is_connecting(&self) -> bool {
        matches!(self.state, State::Pending(_))
    }

    fn connect(&mut self, request: &ConnectRequest<'_>) -> EngineResult<()> {
        self.close();

        info!(
            "Opening MQTT session with {}:{} as `{}`",
            self.broker.host, self.broker.port, request.client_id
        );

        let options = self.options(request);
        let timeout = self.broker.connect_timeout();
        let (sender, receiver) = flume::bounded(1);

        let _ = thread::Builder::new()
            .name("mqtt-handshake".into())
            .spawn(move || {
                let (client, mut connection) = Client::new(options, CHANNEL_CAPACITY);
                let outcome = wait_for_connack(&mut connection, timeout)
                    .map(|()| Session { client, connection });
                // The node may have given up on this attempt already.
                let _ = sender.send(outcome);
            })
            .map_err(Error::from)?;

        self.state = State::Pending(receiver);
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &str, retained: bool) -> EngineResult<()> {
        let State::Open(session) = &self.state else {
            return Err(Error::new(ErrorKind::Mqtt, "No MQTT session").into());
        };

        session
            .client
            .try_publish(topic, QoS::AtLeastOnce, retained, payload.as_bytes().to_vec())
            .map_err(|e| Error::from(e).into())
    }

    fn service(&mut self) {
        self.poll_handshake();
        self.drain_events();
    }
}

fn wait_for_connack(connection: &mut Connection, timeout: Duration) -> Result<()> {
    let deadline = Instant::now() + timeout;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }

        match connection.recv_timeout(remaining) {
            Ok(Ok(Event::Incoming(Packet::ConnAck(ack)))) => {
                if ack.code == ConnectReturnCode::Success {
                    debug!("MQTT session acknowledged");
                    return Ok(());
                }
                return Err(Error::new(
                    ErrorKind::Mqtt,
                    format!("Session refused by the broker: {:?}", ack.code),
                ));
            }
            Ok(Ok(event)) => trace!("MQTT event while connecting: {event:?}"),
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => break,
        }
    }

    Err(Error::new(
        ErrorKind::Mqtt,
        "The broker did not acknowledge the session in time",
    ))
}
