//! Follow/unfollow commands sent to the bot in private.
//!
//! Replies go to the requester only. The channels hear about a command only
//! when it actually changed the subscription set.

use crate::error::TransportError;
use crate::feed::FeedClient;
use crate::format::MessageKind;
use crate::relay::ChannelRelay;
use crate::transport::{ChatTransport, nick_of};
use tracing::{info, warn};

const HELP: &str = "Hi! I'm FeedBridge! you can (follow <name>) to make me follow a user or (unfollow <name>) to make me stop.";

/// A parsed private message
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// `follow <name>`
    Follow(String),
    /// `unfollow <name>`
    Unfollow(String),
    /// Anything else
    Help,
}

impl Command {
    /// Interpret a private message. Words after the name are ignored.
    pub fn parse(text: &str) -> Self {
        let mut words = text.split_whitespace();
        match (words.next(), words.next()) {
            (Some(verb), Some(name)) if verb.eq_ignore_ascii_case("follow") => {
                Command::Follow(name.to_string())
            }
            (Some(verb), Some(name)) if verb.eq_ignore_ascii_case("unfollow") => {
                Command::Unfollow(name.to_string())
            }
            _ => Command::Help,
        }
    }
}

/// What a command did
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The help text was sent
    Help,
    /// `follow` for a name already subscribed to
    AlreadyFollowing,
    /// Subscription added and announced
    Followed,
    /// The feed refused the subscription
    FollowRejected,
    /// `unfollow` for a name not subscribed to
    NotFollowing,
    /// Subscription removed and announced
    Unfollowed,
    /// The feed refused the removal
    UnfollowRejected,
    /// The subscription set could not be read; nothing was sent
    Unavailable,
}

/// Handles follow/unfollow requests
#[derive(Clone, Debug)]
pub struct SubscriptionCommands {
    relay: ChannelRelay,
}

impl SubscriptionCommands {
    /// Commands that announce through `relay` and decorate replies with its style
    pub fn new(relay: ChannelRelay) -> Self {
        Self { relay }
    }

    /// Act on a private message from `source` (`nick!user@host`)
    pub async fn handle<T, F>(
        &self,
        transport: &mut T,
        feed: &F,
        source: &str,
        text: &str,
    ) -> Result<CommandOutcome, TransportError>
    where
        T: ChatTransport + ?Sized,
        F: FeedClient + ?Sized,
    {
        let requester = nick_of(source);
        match Command::parse(text) {
            Command::Follow(name) => self.follow(transport, feed, requester, &name).await,
            Command::Unfollow(name) => self.unfollow(transport, feed, requester, &name).await,
            Command::Help => {
                self.reply(transport, requester, MessageKind::Help, HELP).await?;
                Ok(CommandOutcome::Help)
            }
        }
    }

    /// Subscribe to `target` on behalf of `requester`
    pub async fn follow<T, F>(
        &self,
        transport: &mut T,
        feed: &F,
        requester: &str,
        target: &str,
    ) -> Result<CommandOutcome, TransportError>
    where
        T: ChatTransport + ?Sized,
        F: FeedClient + ?Sized,
    {
        let Some(existing) = find_subscription(feed, target).await else {
            return Ok(CommandOutcome::Unavailable);
        };

        if let Some(name) = existing {
            self.reply(
                transport,
                requester,
                MessageKind::Error,
                &format!("I'm already following {name}."),
            )
            .await?;
            return Ok(CommandOutcome::AlreadyFollowing);
        }

        if let Err(e) = feed.add_subscription(target).await {
            warn!(requester = %requester, target = %target, error = %e, "Follow failed");
            self.reply(
                transport,
                requester,
                MessageKind::Error,
                "I can't follow that user. Are you sure the name is correct?",
            )
            .await?;
            return Ok(CommandOutcome::FollowRejected);
        }

        info!(requester = %requester, target = %target, "Now following");
        self.reply(
            transport,
            requester,
            MessageKind::Followed,
            &format!("Okay! I'm now following {target}."),
        )
        .await?;
        self.announce(transport, &format!("{requester} has asked me to start following {target}"))
            .await?;
        Ok(CommandOutcome::Followed)
    }

    /// Unsubscribe from `target` on behalf of `requester`
    pub async fn unfollow<T, F>(
        &self,
        transport: &mut T,
        feed: &F,
        requester: &str,
        target: &str,
    ) -> Result<CommandOutcome, TransportError>
    where
        T: ChatTransport + ?Sized,
        F: FeedClient + ?Sized,
    {
        let Some(existing) = find_subscription(feed, target).await else {
            return Ok(CommandOutcome::Unavailable);
        };

        let Some(target) = existing else {
            self.reply(
                transport,
                requester,
                MessageKind::Error,
                &format!("I'm not following {target}."),
            )
            .await?;
            return Ok(CommandOutcome::NotFollowing);
        };
        // Use the spelling from the subscription set
        let target = target.as_str();

        if let Err(e) = feed.remove_subscription(target).await {
            warn!(requester = %requester, target = %target, error = %e, "Unfollow failed");
            self.reply(
                transport,
                requester,
                MessageKind::Error,
                &format!("I couldn't stop following {target}."),
            )
            .await?;
            return Ok(CommandOutcome::UnfollowRejected);
        }

        info!(requester = %requester, target = %target, "Stopped following");
        self.reply(
            transport,
            requester,
            MessageKind::StoppedFollowing,
            &format!("Okay! I've stopped following {target}."),
        )
        .await?;
        self.announce(transport, &format!("{requester} has asked me to stop following {target}"))
            .await?;
        Ok(CommandOutcome::Unfollowed)
    }

    async fn reply<T>(
        &self,
        transport: &mut T,
        to: &str,
        kind: MessageKind,
        text: &str,
    ) -> Result<(), TransportError>
    where
        T: ChatTransport + ?Sized,
    {
        let message = format!("{}{}", self.relay.style().prefix(kind), text);
        match transport.send_message(to, &message).await {
            Err(e) if !e.is_connection_loss() => {
                warn!(to = %to, error = %e, "Reply not delivered");
                Ok(())
            }
            other => other,
        }
    }

    async fn announce<T>(&self, transport: &mut T, text: &str) -> Result<(), TransportError>
    where
        T: ChatTransport + ?Sized,
    {
        let message = format!("{}{}", self.relay.style().prefix(MessageKind::Inform), text);
        self.relay.broadcast(transport, &message).await.map(|_| ())
    }
}

/// The subscribed name matching `target` (ASCII case-insensitively).
/// The outer `None` means the set could not be read.
async fn find_subscription<F>(feed: &F, target: &str) -> Option<Option<String>>
where
    F: FeedClient + ?Sized,
{
    match feed.list_subscriptions().await {
        Ok(subscriptions) => Some(
            subscriptions
                .into_iter()
                .find(|name| name.eq_ignore_ascii_case(target)),
        ),
        Err(e) => {
            warn!(target = %target, error = %e, "Could not list subscriptions");
            None
        }
    }
}
