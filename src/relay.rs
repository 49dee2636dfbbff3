//! Broadcast to every configured destination channel.

use crate::error::TransportError;
use crate::format::PrefixStyle;
use crate::sync_filter::RelayEntry;
use crate::transport::ChatTransport;
use tracing::{debug, warn};

/// Fan-out of one message to all destination channels
#[derive(Clone, Debug)]
pub struct ChannelRelay {
    channels: Vec<String>,
    style: PrefixStyle,
}

impl ChannelRelay {
    /// Relay to `channels`, decorating entries with `style`
    pub fn new(channels: Vec<String>, style: PrefixStyle) -> Self {
        Self { channels, style }
    }

    /// Destination channels
    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    /// Prefix style used for every message this relay formats
    pub fn style(&self) -> PrefixStyle {
        self.style
    }

    /// Send `message` to every channel.
    ///
    /// Each destination is attempted even if an earlier one failed. A
    /// per-destination delivery failure is logged and skipped. If the
    /// connection itself was lost, the first such error is returned once all
    /// destinations have been attempted. Returns the number of channels the
    /// message reached.
    pub async fn broadcast<T>(&self, transport: &mut T, message: &str) -> Result<usize, TransportError>
    where
        T: ChatTransport + ?Sized,
    {
        let mut delivered = 0;
        let mut lost = None;

        for channel in &self.channels {
            match transport.send_message(channel, message).await {
                Ok(()) => delivered += 1,
                Err(e) if e.is_connection_loss() => {
                    warn!(channel = %channel, error = %e, "Broadcast failed, connection lost");
                    lost.get_or_insert(e);
                }
                Err(e) => {
                    warn!(channel = %channel, error = %e, "Broadcast to channel failed");
                }
            }
        }

        match lost {
            Some(e) => Err(e),
            None => Ok(delivered),
        }
    }

    /// Format and broadcast one feed entry
    pub async fn relay_entry<T>(&self, transport: &mut T, entry: &RelayEntry) -> Result<usize, TransportError>
    where
        T: ChatTransport + ?Sized,
    {
        debug!(author = %entry.author, created_at = %entry.created_at, "Relaying entry");
        let line = self.style.entry_line(&entry.author, &entry.text);
        self.broadcast(transport, &line).await
    }
}
