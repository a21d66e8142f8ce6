use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while talking to an RCON server.
#[derive(Debug, Error)]
pub enum Error {
    #[error("name resolution of {host}:{port} failed: {source}")]
    ResolutionFailed {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("failed to connect to {host}:{port}: {source}")]
    ConnectFailed {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("authentication rejected by {host}:{port}")]
    AuthFailed { host: String, port: u16 },

    /// The server answered a command with id -1, which some implementations
    /// use for "not authenticated".
    #[error("server rejected the command (id -1)")]
    ServerRejected,

    #[error("connection lost")]
    ConnectionLost,

    #[error("{0}")]
    Io(#[from] io::Error),

    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    #[error("no response from the server within {0} ms")]
    ResponseTimeout(u64),

    #[error("config error: {0}")]
    ConfigError(String),

    #[error("{0}")]
    BadArgument(String),
}

impl Error {
    /// Raised when the interrupt flag is observed at a suspension point.
    pub(crate) fn interrupted() -> Error {
        Error::Io(io::Error::new(
            io::ErrorKind::Interrupted,
            "interrupted by signal",
        ))
    }

    /// True when the error is the signal-interrupt marker, which unwinds to
    /// an orderly shutdown rather than a failure exit.
    pub fn is_interrupt(&self) -> bool {
        matches!(self, Error::Io(e) if e.kind() == io::ErrorKind::Interrupted)
    }

    /// Errors the interactive loop reports and survives.
    pub fn recoverable_in_repl(&self) -> bool {
        matches!(self, Error::ResponseTimeout(_) | Error::ServerRejected)
    }
}
