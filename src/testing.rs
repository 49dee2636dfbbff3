//! In-memory collaborators for tests.
//!
//! [`FakeTransport`] records everything sent through it and can be told to
//! fail. [`FakeFeed`] serves a canned timeline and keeps a real subscription
//! set, so follow/unfollow round trips can be checked.

use crate::config::{Config, FeedConfig, IrcConfig, RetryConfig, ScheduleConfig};
use crate::error::{TransportError, UpstreamError};
use crate::feed::{FeedClient, FeedEntry};
use crate::format::PrefixStyle;
use crate::transport::{ChatTransport, InboundEvent};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Configuration with two channels (`#news`, `#lobby`), cat prefixes and a
/// fast, jitter-free reconnect schedule
pub fn test_config() -> Config {
    Config {
        irc: IrcConfig {
            server: "irc.test".to_string(),
            port: 6667,
            nick: "feedbridge".to_string(),
            channels: vec!["#news".to_string(), "#lobby".to_string()],
            prefixes: PrefixStyle::Cats,
            drain_wait_ms: 10,
        },
        feed: FeedConfig {
            base_url: "http://feed.test/1.1/".to_string(),
            timeline_path: "statuses/home_timeline.json".to_string(),
            friends_path: "statuses/friends.json".to_string(),
            follow_path: "friendships/create.json".to_string(),
            unfollow_path: "friendships/destroy.json".to_string(),
            bearer_token: None,
            request_timeout: Duration::from_secs(5),
        },
        schedule: ScheduleConfig::default(),
        reconnect: RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter: false,
        },
    }
}

/// Something [`FakeTransport`] delivered
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Sent {
    /// `send_message`
    Message {
        /// Channel or nickname
        target: String,
        /// Text as given
        text: String,
    },
    /// `send_notice`
    Notice {
        /// Channel or nickname
        target: String,
        /// Text as given
        text: String,
    },
}

/// Scriptable [`ChatTransport`]
#[derive(Debug, Default)]
pub struct FakeTransport {
    connected: bool,
    connects: usize,
    joins: Vec<String>,
    sent: Vec<Sent>,
    send_attempts: usize,
    inbound: VecDeque<Vec<InboundEvent>>,
    connect_errors: VecDeque<TransportError>,
    lose_on_send: Option<usize>,
    lose_on_drain: bool,
    rejected_targets: HashSet<String>,
}

impl FakeTransport {
    /// Disconnected transport
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport that behaves as if `connect` already succeeded
    pub fn connected() -> Self {
        Self {
            connected: true,
            ..Self::default()
        }
    }

    /// Whether the fake connection is up
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Successful `connect` calls
    pub fn connects(&self) -> usize {
        self.connects
    }

    /// Every channel joined, in order, across connections
    pub fn joins(&self) -> &[String] {
        &self.joins
    }

    /// Everything delivered, in order
    pub fn sent(&self) -> &[Sent] {
        &self.sent
    }

    /// Calls to `send_message`/`send_notice`, delivered or not
    pub fn send_attempts(&self) -> usize {
        self.send_attempts
    }

    /// Texts delivered to `target` with `send_message`
    pub fn messages_to(&self, target: &str) -> Vec<String> {
        self.sent
            .iter()
            .filter_map(|sent| match sent {
                Sent::Message { target: t, text } if t == target => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// Texts delivered to `target` with `send_notice`
    pub fn notices_to(&self, target: &str) -> Vec<String> {
        self.sent
            .iter()
            .filter_map(|sent| match sent {
                Sent::Notice { target: t, text } if t == target => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// Queue one batch for a later `drain_events_once`
    pub fn push_inbound(&mut self, events: Vec<InboundEvent>) {
        self.inbound.push_back(events);
    }

    /// Make the next `connect` fail with `err`. Calls stack up.
    pub fn fail_next_connect(&mut self, err: TransportError) {
        self.connect_errors.push_back(err);
    }

    /// Drop the connection on the `n`th send attempt, counted from the start
    pub fn lose_connection_on_send(&mut self, n: usize) {
        self.lose_on_send = Some(n);
    }

    /// Drop the connection on the next drain
    pub fn lose_connection_on_next_drain(&mut self) {
        self.lose_on_drain = true;
    }

    /// Make every send to `target` fail without affecting the connection
    pub fn reject_target(&mut self, target: &str) {
        self.rejected_targets.insert(target.to_string());
    }

    fn deliver(&mut self, sent: Sent) -> Result<(), TransportError> {
        self.send_attempts += 1;
        if self.lose_on_send == Some(self.send_attempts) {
            self.lose_on_send = None;
            self.connected = false;
            return Err(TransportError::ConnectionLost("connection reset by peer".to_string()));
        }
        if !self.connected {
            return Err(TransportError::NotConnected);
        }

        let target = match &sent {
            Sent::Message { target, .. } | Sent::Notice { target, .. } => target,
        };
        if self.rejected_targets.contains(target) {
            return Err(TransportError::SendFailed {
                target: target.clone(),
                reason: "cannot send to target".to_string(),
            });
        }
        self.sent.push(sent);
        Ok(())
    }
}

#[async_trait]
impl ChatTransport for FakeTransport {
    async fn connect(&mut self, _server: &str, _port: u16, _nick: &str) -> Result<(), TransportError> {
        self.connected = false;
        if let Some(err) = self.connect_errors.pop_front() {
            return Err(err);
        }
        self.connected = true;
        self.connects += 1;
        Ok(())
    }

    async fn join(&mut self, channel: &str) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        self.joins.push(channel.to_string());
        Ok(())
    }

    async fn send_message(&mut self, target: &str, text: &str) -> Result<(), TransportError> {
        self.deliver(Sent::Message {
            target: target.to_string(),
            text: text.to_string(),
        })
    }

    async fn send_notice(&mut self, target: &str, text: &str) -> Result<(), TransportError> {
        self.deliver(Sent::Notice {
            target: target.to_string(),
            text: text.to_string(),
        })
    }

    async fn drain_events_once(&mut self) -> Result<Vec<InboundEvent>, TransportError> {
        if self.lose_on_drain {
            self.lose_on_drain = false;
            self.connected = false;
            return Err(TransportError::ConnectionLost("read: connection reset".to_string()));
        }
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        Ok(self.inbound.pop_front().unwrap_or_default())
    }
}

#[derive(Debug, Default)]
struct FeedState {
    timeline: Vec<FeedEntry>,
    subscriptions: BTreeSet<String>,
    rejected: HashSet<String>,
    unavailable: bool,
    fetches: usize,
}

/// In-memory [`FeedClient`]
///
/// Methods take `&self` so a feed owned by a running bridge can still be
/// scripted between steps.
#[derive(Debug, Default)]
pub struct FakeFeed {
    state: Mutex<FeedState>,
}

impl FakeFeed {
    /// Empty timeline, no subscriptions
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed already subscribed to `names`
    pub fn with_subscriptions<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let feed = Self::new();
        feed.state().subscriptions = names.into_iter().map(Into::into).collect();
        feed
    }

    fn state(&self) -> MutexGuard<'_, FeedState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace the timeline; newest entry first, as a real feed returns it
    pub fn set_timeline(&self, entries: Vec<FeedEntry>) {
        self.state().timeline = entries;
    }

    /// Add an entry at the top of the timeline
    pub fn push_entry(&self, entry: FeedEntry) {
        self.state().timeline.insert(0, entry);
    }

    /// Make every call fail with a 503 until reset
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state().unavailable = unavailable;
    }

    /// Refuse subscription changes for `name`
    pub fn reject(&self, name: &str) {
        self.state().rejected.insert(name.to_string());
    }

    /// Current subscription set
    pub fn subscriptions(&self) -> BTreeSet<String> {
        self.state().subscriptions.clone()
    }

    /// Timeline fetches attempted
    pub fn fetches(&self) -> usize {
        self.state().fetches
    }

    fn check_available(state: &FeedState, endpoint: &str) -> Result<(), UpstreamError> {
        if state.unavailable {
            return Err(UpstreamError::Status {
                endpoint: endpoint.to_string(),
                status: 503,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl FeedClient for FakeFeed {
    async fn fetch_timeline(&self) -> Result<Vec<FeedEntry>, UpstreamError> {
        let mut state = self.state();
        state.fetches += 1;
        Self::check_available(&state, "timeline")?;
        Ok(state.timeline.clone())
    }

    async fn list_subscriptions(&self) -> Result<BTreeSet<String>, UpstreamError> {
        let state = self.state();
        Self::check_available(&state, "friends")?;
        Ok(state.subscriptions.clone())
    }

    async fn add_subscription(&self, id: &str) -> Result<(), UpstreamError> {
        let mut state = self.state();
        Self::check_available(&state, "follow")?;
        if state.rejected.contains(id) {
            return Err(UpstreamError::Rejected {
                target: id.to_string(),
            });
        }
        state.subscriptions.insert(id.to_string());
        Ok(())
    }

    async fn remove_subscription(&self, id: &str) -> Result<(), UpstreamError> {
        let mut state = self.state();
        Self::check_available(&state, "unfollow")?;
        if state.rejected.contains(id) {
            return Err(UpstreamError::Rejected {
                target: id.to_string(),
            });
        }
        state.subscriptions.remove(id);
        Ok(())
    }
}
