//! Configuration types for feedbridge
//!
//! The configuration is a TOML file with four tables:
//!
//! ```toml
//! [irc]
//! server = "irc.example.net"
//! port = 6667
//! nick = "feedbridge"
//! channels = ["#news", "#lobby"]   # or "#news,#lobby"
//! prefixes = "cats"
//!
//! [feed]
//! base_url = "https://api.example.com/1.1/"
//!
//! [schedule]
//! poll_interval = 60
//!
//! [reconnect]
//! max_attempts = 10
//! ```
//!
//! Only `irc.server`, `irc.channels` and `feed.base_url` are required.

use crate::error::{Error, Result};
use crate::format::PrefixStyle;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration for the bridge
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Chat network settings
    pub irc: IrcConfig,

    /// Social-feed API settings
    pub feed: FeedConfig,

    /// Task intervals and watermark grace window
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Backoff between connect-and-join attempts
    #[serde(default)]
    pub reconnect: RetryConfig,
}

/// Chat network configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IrcConfig {
    /// Server hostname
    pub server: String,

    /// Server port (default: 6667)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Nickname to register with (default: "feedbridge")
    #[serde(default = "default_nick")]
    pub nick: String,

    /// Destination channels, joined on connect and used for every broadcast
    #[serde(deserialize_with = "channel_list::deserialize")]
    pub channels: Vec<String>,

    /// Message prefix style (default: cats)
    #[serde(default)]
    pub prefixes: PrefixStyle,

    /// How long one event drain waits for inbound lines, in milliseconds (default: 100)
    #[serde(default = "default_drain_wait_ms")]
    pub drain_wait_ms: u64,
}

/// Social-feed API configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Base URL every endpoint path is resolved against
    pub base_url: String,

    /// Timeline endpoint (default: "statuses/home_timeline.json")
    #[serde(default = "default_timeline_path")]
    pub timeline_path: String,

    /// Subscription listing endpoint (default: "statuses/friends.json")
    #[serde(default = "default_friends_path")]
    pub friends_path: String,

    /// Subscription creation endpoint (default: "friendships/create.json")
    #[serde(default = "default_follow_path")]
    pub follow_path: String,

    /// Subscription removal endpoint (default: "friendships/destroy.json")
    #[serde(default = "default_unfollow_path")]
    pub unfollow_path: String,

    /// Static bearer token sent verbatim on every request
    #[serde(default)]
    pub bearer_token: Option<String>,

    /// Per-request timeout (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,
}

/// Task intervals
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Interval of the inbound-event drain task (default: 1 second)
    #[serde(default = "default_events_interval", with = "duration_serde")]
    pub events_interval: Duration,

    /// Interval of the feed poll task (default: 60 seconds)
    #[serde(default = "default_poll_interval", with = "duration_serde")]
    pub poll_interval: Duration,

    /// How far back the initial watermark reaches (default: 10 minutes)
    #[serde(default = "default_watermark_grace", with = "duration_serde")]
    pub watermark_grace: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            events_interval: default_events_interval(),
            poll_interval: default_poll_interval(),
            watermark_grace: default_watermark_grace(),
        }
    }
}

/// Retry behavior for transient transport failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 10)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 2 seconds)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 300 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

impl Config {
    /// Read, parse and validate a TOML configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("cannot read {}: {}", path.display(), e),
            key: None,
        })?;
        Self::from_toml(&raw)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: Config = toml::from_str(raw).map_err(|e| Error::Config {
            message: e.to_string(),
            key: None,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.irc.server.trim().is_empty() {
            return Err(Error::config("irc.server", "server must not be empty"));
        }
        if self.irc.nick.is_empty() || self.irc.nick.contains(char::is_whitespace) {
            return Err(Error::config(
                "irc.nick",
                format!("invalid nickname {:?}", self.irc.nick),
            ));
        }
        if self.irc.channels.is_empty() {
            return Err(Error::config(
                "irc.channels",
                "at least one destination channel is required",
            ));
        }
        if let Some(bad) = self
            .irc
            .channels
            .iter()
            .find(|c| c.is_empty() || c.contains(char::is_whitespace) || c.contains(','))
        {
            return Err(Error::config(
                "irc.channels",
                format!("invalid channel name {bad:?}"),
            ));
        }
        if let Err(e) = url::Url::parse(&self.feed.base_url) {
            return Err(Error::config(
                "feed.base_url",
                format!("invalid URL {:?}: {}", self.feed.base_url, e),
            ));
        }
        let multiplier = self.reconnect.backoff_multiplier;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(Error::config(
                "reconnect.backoff_multiplier",
                "backoff multiplier must be a finite number of at least 1.0",
            ));
        }
        Ok(())
    }
}

fn default_port() -> u16 {
    6667
}

fn default_nick() -> String {
    "feedbridge".to_string()
}

fn default_drain_wait_ms() -> u64 {
    100
}

fn default_timeline_path() -> String {
    "statuses/home_timeline.json".to_string()
}

fn default_friends_path() -> String {
    "statuses/friends.json".to_string()
}

fn default_follow_path() -> String {
    "friendships/create.json".to_string()
}

fn default_unfollow_path() -> String {
    "friendships/destroy.json".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_events_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_watermark_grace() -> Duration {
    Duration::from_secs(10 * 60)
}

fn default_max_attempts() -> u32 {
    10
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(300)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Accepts either a list of channels or a single comma-separated string
mod channel_list {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        List(Vec<String>),
        Joined(String),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let names = match Raw::deserialize(deserializer)? {
            Raw::List(list) => list,
            Raw::Joined(joined) => joined.split(',').map(str::to_string).collect(),
        };
        Ok(names
            .into_iter()
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect())
    }
}
