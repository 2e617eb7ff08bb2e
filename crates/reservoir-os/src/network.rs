use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use tracing::{debug, warn};

use reservoir::connectivity::NetworkLink;

/// A [`NetworkLink`] that is up while the operating system has a route to
/// the broker.
///
/// The operating system owns the actual interfaces, so starting an attempt
/// only resolves the broker address again. Checking the link never sends a
/// packet.
#[derive(Debug, Clone)]
pub struct RouteProbe {
    host: String,
    port: u16,
    target: Option<SocketAddr>,
}

impl RouteProbe {
    /// Creates a [`RouteProbe`] towards the given host and port.
    #[must_use]
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_owned(),
            port,
            target: None,
        }
    }

    /// Returns the resolved broker address, if any.
    #[must_use]
    pub const fn target(&self) -> Option<SocketAddr> {
        self.target
    }
}

impl NetworkLink for RouteProbe {
    fn is_connected(&self) -> bool {
        let Some(target) = self.target else {
            return false;
        };

        let local = if target.is_ipv4() {
            "0.0.0.0:0"
        } else {
            "[::]:0"
        };

        // Connecting a datagram socket only selects a route.
        UdpSocket::bind(local)
            .and_then(|socket| socket.connect(target))
            .is_ok()
    }

    fn begin(&mut self) {
        match (self.host.as_str(), self.port).to_socket_addrs() {
            Ok(mut addresses) => {
                self.target = addresses.next();
                debug!("Broker {} resolved to {:?}", self.host, self.target);
            }
            Err(e) => {
                warn!("Impossible to resolve {}: {e}", self.host);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use reservoir::connectivity::NetworkLink;

    use super::RouteProbe;

    #[test]
    fn loopback_route() {
        let mut probe = RouteProbe::new("127.0.0.1", 1883);
        assert!(!probe.is_connected());

        probe.begin();

        assert_eq!(probe.target().map(|addr| addr.port()), Some(1883));
        assert!(probe.is_connected());
    }

    #[test]
    fn unresolvable_host_stays_down() {
        let mut probe = RouteProbe::new("invalid host name", 1883);
        probe.begin();

        assert!(probe.target().is_none());
        assert!(!probe.is_connected());
    }
}
