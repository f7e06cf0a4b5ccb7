//! Error types shared across the proxy.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all proxy failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// File-system or I/O operation failure, including the editor stream.
    Io(String),
    /// ACP stream framing or agent channel failure.
    Acp(String),
    /// Malformed JSON-RPC envelope or payload.
    Protocol(String),
    /// Agent process could not be started.
    Spawn(String),
    /// Workspace root could not be resolved for a path.
    Workspace(String),
    /// Agent returned an error or an unusable reply during session setup.
    Session(String),
    /// A bounded wait elapsed before the agent replied.
    Timeout(String),
    /// Requested entity does not exist.
    NotFound(String),
    /// The operation was aborted by proxy-wide cancellation.
    Cancelled(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::Acp(msg) => write!(f, "acp: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol: {msg}"),
            Self::Spawn(msg) => write!(f, "spawn: {msg}"),
            Self::Workspace(msg) => write!(f, "workspace: {msg}"),
            Self::Session(msg) => write!(f, "session: {msg}"),
            Self::Timeout(msg) => write!(f, "timeout: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Cancelled(msg) => write!(f, "cancelled: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
