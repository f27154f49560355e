//! Error types shared by the messaging layer

use thiserror::Error;

/// Failure to decode a datagram into a [`crate::Message`]
///
/// The dispatch loop treats every variant the same way: the datagram is
/// logged and dropped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("expected at least 3 '|'-separated segments, found {found}")]
    MissingSegments { found: usize },

    #[error("malformed message body: {0}")]
    MalformedMain(String),

    #[error("message type is empty")]
    EmptyType,

    #[error("payload is not valid UTF-8")]
    InvalidUtf8,
}

/// Configuration and wiring errors, fatal at startup
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("ACK processor is already bound to a send queue")]
    AlreadyBound,

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}
