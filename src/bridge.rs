//! The two periodic jobs of the bot and the state they share.
//!
//! [`Bridge`] owns the transport, the feed client and the watermark. It is
//! the [`TaskHandler`] the scheduler drives, so the jobs never run
//! concurrently and none of this state needs a lock.

use crate::commands::SubscriptionCommands;
use crate::config::{Config, ScheduleConfig};
use crate::error::{Result, TransportError};
use crate::feed::FeedClient;
use crate::relay::ChannelRelay;
use crate::scheduler::{Task, TaskHandler};
use crate::sync_filter::{self, Watermark};
use crate::transport::{ChatTransport, InboundEvent, nick_of};
use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

/// Version string sent in CTCP VERSION replies
pub const BOT_VERSION: &str = concat!("feedbridge ", env!("CARGO_PKG_VERSION"));

const CTCP_DELIM: char = '\u{01}';

/// The bridge's periodic jobs
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BridgeTask {
    /// Read and dispatch inbound chat events
    DrainEvents,
    /// Fetch the timeline and relay new entries
    PollFeed,
}

/// Chat connection, feed client and relay state
pub struct Bridge<T, F> {
    transport: T,
    feed: F,
    relay: ChannelRelay,
    commands: SubscriptionCommands,
    watermark: Watermark,
    server: String,
    port: u16,
    nick: String,
}

impl<T: ChatTransport, F: FeedClient> Bridge<T, F> {
    /// Bridge for `config`; the watermark starts `schedule.watermark_grace` in the past
    pub fn new(config: &Config, transport: T, feed: F) -> Self {
        let relay = ChannelRelay::new(config.irc.channels.clone(), config.irc.prefixes);
        Self {
            transport,
            feed,
            commands: SubscriptionCommands::new(relay.clone()),
            relay,
            watermark: Watermark::starting_at(Utc::now(), config.schedule.watermark_grace),
            server: config.irc.server.clone(),
            port: config.irc.port,
            nick: config.irc.nick.clone(),
        }
    }

    /// Replace the starting watermark
    pub fn with_watermark(mut self, watermark: Watermark) -> Self {
        self.watermark = watermark;
        self
    }

    /// The task set the scheduler runs: a fast event drain and a slow feed poll
    pub fn tasks(schedule: &ScheduleConfig) -> Vec<Task<BridgeTask>> {
        vec![
            Task::new("drain-events", BridgeTask::DrainEvents, schedule.events_interval),
            Task::new("poll-feed", BridgeTask::PollFeed, schedule.poll_interval),
        ]
    }

    /// Connect, register and join every destination channel
    pub async fn connect_and_join(&mut self) -> std::result::Result<(), TransportError> {
        self.transport
            .connect(&self.server, self.port, &self.nick)
            .await?;
        self.join_all().await?;
        info!(
            server = %self.server,
            channels = ?self.relay.channels(),
            "Connected and joined"
        );
        Ok(())
    }

    async fn join_all(&mut self) -> std::result::Result<(), TransportError> {
        for channel in self.relay.channels() {
            self.transport.join(channel).await?;
        }
        Ok(())
    }

    /// Drain pending inbound events and act on each. Returns how many were drained.
    pub async fn drain_events(&mut self) -> std::result::Result<usize, TransportError> {
        let events = self.transport.drain_events_once().await?;
        let count = events.len();
        for event in events {
            self.handle_event(event).await?;
        }
        Ok(count)
    }

    /// Act on one inbound event
    pub async fn handle_event(&mut self, event: InboundEvent) -> std::result::Result<(), TransportError> {
        match event {
            InboundEvent::PrivateMessage { source, text } => {
                debug!(source = %source, text = %text, "Private message");
                self.commands
                    .handle(&mut self.transport, &self.feed, &source, &text)
                    .await?;
            }
            InboundEvent::Ctcp { source, command } => {
                self.answer_ctcp(&source, &command).await?;
            }
            InboundEvent::UserMode { modes } if modes.starts_with("+i") => {
                // Some networks ignore JOIN until registration has fully settled
                info!(modes = %modes, "User mode set, re-joining channels");
                self.join_all().await?;
            }
            InboundEvent::UserMode { .. } | InboundEvent::Other(_) => {}
        }
        Ok(())
    }

    async fn answer_ctcp(&mut self, source: &str, command: &str) -> std::result::Result<(), TransportError> {
        let verb = command.split(' ').next().unwrap_or("").to_ascii_uppercase();
        let reply = match verb.as_str() {
            "VERSION" => format!("VERSION {BOT_VERSION}"),
            "PING" => command.to_string(),
            "CLIENTINFO" => "CLIENTINFO PING VERSION CLIENTINFO".to_string(),
            _ => {
                debug!(source = %source, command = %command, "Ignoring CTCP request");
                return Ok(());
            }
        };

        let to = nick_of(source);
        match self
            .transport
            .send_notice(to, &format!("{CTCP_DELIM}{reply}{CTCP_DELIM}"))
            .await
        {
            Err(e) if !e.is_connection_loss() => {
                warn!(to = %to, error = %e, "CTCP reply not delivered");
                Ok(())
            }
            other => other,
        }
    }

    /// Fetch the timeline and relay every entry newer than the watermark.
    ///
    /// A failed fetch is logged and skipped with the watermark untouched. The
    /// watermark advances after each relayed entry, so if the connection is
    /// lost mid-batch only the entries not yet relayed are sent again later.
    /// Returns the number of entries relayed.
    pub async fn poll_feed(&mut self) -> std::result::Result<usize, TransportError> {
        let batch = match self.feed.fetch_timeline().await {
            Ok(batch) => batch,
            Err(e) => {
                warn!(error = %e, "Feed fetch failed, skipping cycle");
                return Ok(0);
            }
        };

        let outcome = sync_filter::filter(&batch, self.watermark);
        debug!(
            fetched = batch.len(),
            new = outcome.emit.len(),
            watermark = %self.watermark.timestamp(),
            "Polled feed"
        );

        for entry in &outcome.emit {
            self.relay.relay_entry(&mut self.transport, entry).await?;
            self.watermark.advance(entry.created_at);
        }
        Ok(outcome.emit.len())
    }

    /// Creation time of the newest relayed entry
    pub fn watermark(&self) -> Watermark {
        self.watermark
    }

    /// The chat transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutable access to the chat transport
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// The feed client
    pub fn feed(&self) -> &F {
        &self.feed
    }

    /// The channel relay
    pub fn relay(&self) -> &ChannelRelay {
        &self.relay
    }
}

#[async_trait]
impl<T: ChatTransport, F: FeedClient> TaskHandler<BridgeTask> for Bridge<T, F> {
    async fn run_task(&mut self, task: &BridgeTask) -> Result<()> {
        match task {
            BridgeTask::DrainEvents => {
                self.drain_events().await?;
            }
            BridgeTask::PollFeed => {
                self.poll_feed().await?;
            }
        }
        Ok(())
    }
}
