//! Error types for feedbridge
//!
//! Every collaborator call returns a tagged error instead of unwinding, and the
//! supervisor decides what to do by matching on [`Error::class`]:
//! - [`FailureClass::TransientUpstream`]: the feed API failed, chat is healthy
//! - [`FailureClass::TransportLevel`]: the chat connection is gone, reconnect
//! - [`FailureClass::Fatal`]: anything unrecognized, surface it and stop

use thiserror::Error;

/// Result type alias for feedbridge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for feedbridge
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "irc.channels")
        key: Option<String>,
    },

    /// The social-feed API failed
    #[error("upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    /// The chat transport failed
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Failures originating from the social-feed API
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The HTTP request itself failed (DNS, connect, timeout, body read)
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status
    #[error("{endpoint} returned HTTP {status}")]
    Status {
        /// Endpoint path that was called
        endpoint: String,
        /// HTTP status code
        status: u16,
    },

    /// The API refused a subscription change (unknown or protected account)
    #[error("subscription change for {target} was rejected")]
    Rejected {
        /// The account name the change was attempted for
        target: String,
    },

    /// The payload could not be decoded
    #[error("malformed payload: {0}")]
    Decode(String),
}

/// Failures of the chat transport
#[derive(Debug, Error)]
pub enum TransportError {
    /// The connection was dropped or became unusable
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// Establishing the connection failed
    #[error("failed to connect to {server}:{port}: {reason}")]
    ConnectFailed {
        /// Server host name
        server: String,
        /// Server port
        port: u16,
        /// Underlying cause
        reason: String,
    },

    /// The server refused registration (nickname in use, banned, ...)
    #[error("registration refused: {0}")]
    Registration(String),

    /// A single message could not be delivered; the connection itself is fine
    #[error("could not deliver to {target}: {reason}")]
    SendFailed {
        /// Channel or nickname the message was addressed to
        target: String,
        /// Underlying cause
        reason: String,
    },

    /// An operation was attempted before `connect`
    #[error("not connected")]
    NotConnected,
}

/// How the supervisor reacts to a failure
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureClass {
    /// Feed API unavailable: skip the cycle, keep running
    TransientUpstream,
    /// Chat connection unusable: reconnect and resume
    TransportLevel,
    /// Unrecognized: propagate and terminate
    Fatal,
}

impl Error {
    /// Classify this error for the supervisor loop
    pub fn class(&self) -> FailureClass {
        match self {
            Error::Upstream(_) => FailureClass::TransientUpstream,
            Error::Transport(TransportError::Registration(_)) => FailureClass::Fatal,
            Error::Transport(_) => FailureClass::TransportLevel,
            Error::Config { .. } | Error::Io(_) | Error::Other(_) => FailureClass::Fatal,
        }
    }

    /// Shorthand for a configuration error tied to a key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }
}

impl TransportError {
    /// Build a `ConnectionLost` from an I/O error on an established connection
    pub fn lost(err: &std::io::Error) -> Self {
        TransportError::ConnectionLost(err.to_string())
    }

    /// Whether the connection is unusable and nothing further can be sent
    pub fn is_connection_loss(&self) -> bool {
        matches!(
            self,
            TransportError::ConnectionLost(_) | TransportError::NotConnected
        )
    }
}
