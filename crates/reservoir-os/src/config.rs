use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use tracing::info;

use reservoir::config::NodeConfig;
use reservoir::connectivity::Credentials;

use crate::error::Result;

/// Default MQTT broker port.
pub const DEFAULT_BROKER_PORT: u16 = 1883;

/// Connection parameters of the MQTT broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Broker host name or address.
    pub host: String,
    /// Broker port.
    pub port: u16,
    /// User name, if the broker requires authentication.
    pub username: Option<String>,
    /// Password, if the broker requires authentication.
    pub password: Option<String>,
    /// Keep-alive interval, in seconds.
    pub keep_alive_secs: u64,
    /// Maximum time to wait for the broker to accept a session, in
    /// milliseconds.
    pub connect_timeout_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: String::from("localhost"),
            port: DEFAULT_BROKER_PORT,
            username: None,
            password: None,
            keep_alive_secs: 15,
            connect_timeout_ms: 2000,
        }
    }
}

impl BrokerConfig {
    /// Returns the broker credentials, if both parts are set.
    #[must_use]
    pub fn credentials(&self) -> Option<Credentials> {
        Credentials::from_parts(self.username.clone(), self.password.clone())
    }

    /// Returns the keep-alive interval.
    #[must_use]
    pub const fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    /// Returns the connection timeout.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// The configuration file of a hosted node.
///
/// ```toml
/// [broker]
/// host = "broker.local"
/// username = "tank"
/// password = "secret"
///
/// [node]
/// base_topic = "home/tank"
///
/// [node.calibration]
/// empty_distance_mm = 1650.0
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Broker connection.
    pub broker: BrokerConfig,
    /// Node behavior.
    pub node: NodeConfig,
}

impl HostConfig {
    /// Parses and validates a TOML configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is malformed or describes an
    /// inconsistent configuration.
    pub fn from_toml(document: &str) -> Result<Self> {
        let config: Self = toml::from_str(document)?;
        config.node.validate()?;
        Ok(config)
    }

    /// Loads a configuration file.
    ///
    /// A missing file yields the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is malformed, or
    /// describes an inconsistent configuration.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("No configuration at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let document = std::fs::read_to_string(path)?;
        Self::from_toml(&document)
    }
}
