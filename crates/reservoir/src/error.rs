use alloc::borrow::Cow;

use core::fmt;

/// All possible error kinds raised by the engine collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The configuration is inconsistent.
    Config,
    /// The persistent key-value store failed.
    Store,
    /// The message-bus session failed.
    Bus,
    /// The network link failed.
    Network,
    /// The ranging sensor failed.
    Sensor,
    /// An operation did not complete in time.
    Timeout,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config => "Config",
            Self::Store => "Store",
            Self::Bus => "Bus",
            Self::Network => "Network",
            Self::Sensor => "Sensor",
            Self::Timeout => "Timeout",
        }
        .fmt(f)
    }
}

/// An engine error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    description: Cow<'static, str>,
}

impl Error {
    /// Creates an [`Error`] from an [`ErrorKind`] and a description.
    #[must_use]
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

    /// Returns the error description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.description)
    }
}

impl core::error::Error for Error {}

/// A specialized [`Result`] type for engine operations.
pub type Result<T> = core::result::Result<T, Error>;
