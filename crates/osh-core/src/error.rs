//! Error types for osh-core.

use thiserror::Error;

/// Main error type for osh operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from underlying system calls.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Short or malformed control-message payload.
    #[error("decode error: {message}")]
    Decode { message: String },

    /// Protocol violation or unexpected control message.
    #[error("protocol error: {message}")]
    Protocol { message: String },

    /// Channel open refused.
    #[error("channel rejected ({channel_type}): {message}")]
    ChannelRejected {
        channel_type: String,
        message: String,
    },

    /// Input line with unbalanced quoting. Shown to the user as is.
    #[error("Unable to parse {line:?}: unbalanced quoting")]
    CommandParse { line: String },

    /// No built-in command with that name. Shown to the user as is.
    #[error("Unknown command {0:?}")]
    CommandNotFound(String),

    /// A command name was registered twice.
    #[error("command {0:?} already registered")]
    DuplicateRegistration(String),

    /// Public key authentication failed.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Stream or connection reached end-of-stream.
    #[error("connection closed")]
    ConnectionClosed,

    /// Transport layer error.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// Startup configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl Error {
    /// Returns true if this error is a clean end-of-stream rather than a failure.
    ///
    /// The interactive loop and the connection supervisor treat these as a
    /// normal way for a session to finish.
    pub fn is_end_of_stream(&self) -> bool {
        match self {
            Error::ConnectionClosed => true,
            Error::Io(e) => e.kind() == std::io::ErrorKind::UnexpectedEof,
            _ => false,
        }
    }

    /// Build a decode error from anything printable.
    pub fn decode(message: impl Into<String>) -> Self {
        Error::Decode {
            message: message.into(),
        }
    }
}

/// Convenience result type for osh operations.
pub type Result<T> = std::result::Result<T, Error>;
