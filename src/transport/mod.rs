//! Chat-side collaborator.
//!
//! [`ChatTransport`] is the connection the bridge talks through. The concrete
//! network implementation is [`IrcConnection`]; tests use
//! `testing::FakeTransport`.

use crate::error::TransportError;
use async_trait::async_trait;

pub mod irc;

pub use irc::IrcConnection;

/// An event received from the chat network, already decoded
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundEvent {
    /// A private message addressed to the bot
    PrivateMessage {
        /// Full sender prefix (`nick!user@host`)
        source: String,
        /// Message text
        text: String,
    },
    /// A CTCP request addressed to the bot, such as `VERSION`
    Ctcp {
        /// Full sender prefix
        source: String,
        /// CTCP command and arguments, without the `\x01` delimiters
        command: String,
    },
    /// The server changed the bot's own user modes
    UserMode {
        /// Mode string, e.g. `+i`
        modes: String,
    },
    /// Anything the bridge does not act on
    Other(String),
}

/// Connection to a chat network
///
/// Every method reports failures as a [`TransportError`]. Errors for which
/// [`TransportError::is_connection_loss`] holds mean the connection is gone
/// and must be re-established with [`connect`](ChatTransport::connect).
#[async_trait]
pub trait ChatTransport: Send {
    /// Open a connection and register under `nick`. Drops any previous connection.
    async fn connect(&mut self, server: &str, port: u16, nick: &str) -> Result<(), TransportError>;

    /// Join a channel
    async fn join(&mut self, channel: &str) -> Result<(), TransportError>;

    /// Send a message to a channel or a nickname
    async fn send_message(&mut self, target: &str, text: &str) -> Result<(), TransportError>;

    /// Send a notice to a channel or a nickname
    async fn send_notice(&mut self, target: &str, text: &str) -> Result<(), TransportError>;

    /// Collect the events that arrived since the last call, waiting briefly
    /// for more. Protocol keepalives are handled internally.
    async fn drain_events_once(&mut self) -> Result<Vec<InboundEvent>, TransportError>;
}

/// The nickname part of a `nick!user@host` source
pub fn nick_of(source: &str) -> &str {
    source.split('!').next().unwrap_or(source)
}
