//! Error types shared across the harness.

use std::fmt::{Display, Formatter};

/// Shared harness result type.
pub type Result<T> = std::result::Result<T, HarnessError>;

/// Harness error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum HarnessError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Serial protocol violation: malformed frame or dead stream.
    Protocol(String),
    /// Entry file scanning or directive validation failure.
    Entries(String),
    /// Ephemeral work-area provisioning failure (disk image tooling).
    Resource(String),
    /// Emulator process spawn or rendezvous failure.
    Emulator(String),
    /// Fixture script failure; aborts the whole suite.
    Fixture(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for HarnessError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol: {msg}"),
            Self::Entries(msg) => write!(f, "entries: {msg}"),
            Self::Resource(msg) => write!(f, "resource: {msg}"),
            Self::Emulator(msg) => write!(f, "emulator: {msg}"),
            Self::Fixture(msg) => write!(f, "fixture: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for HarnessError {}

impl From<toml::de::Error> for HarnessError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for HarnessError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
