use std::borrow::Cow;

use reservoir::error::{Error as EngineError, ErrorKind as EngineErrorKind};

/// All possible error kinds of the hosted platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Input/output error.
    Io,
    /// Invalid configuration.
    Config,
    /// A document cannot be serialized or deserialized.
    Serialization,
    /// The MQTT client failed.
    Mqtt,
    /// The key-value store is corrupted.
    Store,
}

impl ErrorKind {
    const fn description(self) -> &'static str {
        match self {
            Self::Io => "Input/Output",
            Self::Config => "Configuration",
            Self::Serialization => "Serialization",
            Self::Mqtt => "MQTT",
            Self::Store => "Store",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.description().fmt(f)
    }
}

/// A hosted platform error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    description: Cow<'static, str>,
}

impl Error {
    /// Creates an [`Error`] from an [`ErrorKind`] and a description.
    pub fn new(kind: ErrorKind, description: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind,
            description: description.into(),
        }
    }

    /// Returns the [`ErrorKind`].
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.description)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::new(ErrorKind::Io, e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::new(ErrorKind::Serialization, e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Self::new(ErrorKind::Config, e.to_string())
    }
}

impl From<rumqttc::ClientError> for Error {
    fn from(e: rumqttc::ClientError) -> Self {
        Self::new(ErrorKind::Mqtt, e.to_string())
    }
}

impl From<rumqttc::ConnectionError> for Error {
    fn from(e: rumqttc::ConnectionError) -> Self {
        Self::new(ErrorKind::Mqtt, e.to_string())
    }
}

impl From<EngineError> for Error {
    fn from(e: EngineError) -> Self {
        let kind = match e.kind() {
            EngineErrorKind::Config => ErrorKind::Config,
            EngineErrorKind::Store => ErrorKind::Store,
            EngineErrorKind::Bus | EngineErrorKind::Network | EngineErrorKind::Timeout => {
                ErrorKind::Mqtt
            }
            EngineErrorKind::Sensor => ErrorKind::Io,
        };
        Self::new(kind, e.description().to_owned())
    }
}

impl From<Error> for EngineError {
    fn from(e: Error) -> Self {
        let kind = match e.kind {
            ErrorKind::Io | ErrorKind::Serialization | ErrorKind::Store => EngineErrorKind::Store,
            ErrorKind::Config => EngineErrorKind::Config,
            ErrorKind::Mqtt => EngineErrorKind::Bus,
        };
        EngineError::new(kind, e.to_string())
    }
}

/// A specialized [`Result`] type for hosted platform operations.
pub type Result<T> = std::result::Result<T, Error>;
