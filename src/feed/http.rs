//! HTTP/JSON implementation of [`FeedClient`].

use super::{FeedClient, FeedEntry, Reshare};
use crate::config::FeedConfig;
use crate::error::{Error, Result, UpstreamError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeSet;
use tracing::{debug, warn};
use url::Url;

/// Timestamp layout used by classic timeline APIs: `Wed Oct 10 20:19:24 +0000 2018`
const TIMELINE_DATE_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

/// Feed client speaking a twitter-style REST API
pub struct HttpFeedClient {
    /// HTTP client for all API calls
    http_client: reqwest::Client,

    /// Optional static bearer token
    bearer_token: Option<String>,

    timeline_url: Url,
    friends_url: Url,
    follow_url: Url,
    unfollow_url: Url,
}

#[derive(Deserialize)]
struct WireStatus {
    user: WireUser,
    created_at: String,
    text: String,
    #[serde(default)]
    retweeted_status: Option<Box<WireStatus>>,
}

#[derive(Deserialize)]
struct WireUser {
    screen_name: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireUserList {
    Bare(Vec<WireUser>),
    Wrapped { users: Vec<WireUser> },
}

impl HttpFeedClient {
    /// Create a client for the endpoints in `config`
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created or an endpoint path
    /// does not resolve against the base URL
    pub fn new(config: &FeedConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("feedbridge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        let base = base_url(&config.base_url)?;
        let endpoint = |key: &str, path: &str| {
            base.join(path)
                .map_err(|e| Error::config(key, format!("invalid endpoint {path:?}: {e}")))
        };

        Ok(Self {
            http_client,
            bearer_token: config.bearer_token.clone(),
            timeline_url: endpoint("feed.timeline_path", &config.timeline_path)?,
            friends_url: endpoint("feed.friends_path", &config.friends_path)?,
            follow_url: endpoint("feed.follow_path", &config.follow_path)?,
            unfollow_url: endpoint("feed.unfollow_path", &config.unfollow_path)?,
        })
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        url: &Url,
    ) -> std::result::Result<reqwest::Response, UpstreamError> {
        let request = match &self.bearer_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Status {
                endpoint: url.path().to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    async fn change_subscription(&self, url: &Url, id: &str) -> std::result::Result<(), UpstreamError> {
        let request = self
            .http_client
            .post(url.clone())
            .form(&[("screen_name", id)]);

        match self.send(request, url).await {
            Ok(_) => Ok(()),
            Err(UpstreamError::Status { status: 403 | 404, .. }) => Err(UpstreamError::Rejected {
                target: id.to_string(),
            }),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl FeedClient for HttpFeedClient {
    async fn fetch_timeline(&self) -> std::result::Result<Vec<FeedEntry>, UpstreamError> {
        let request = self.http_client.get(self.timeline_url.clone());
        let body = self.send(request, &self.timeline_url).await?.bytes().await?;

        let statuses: Vec<WireStatus> =
            serde_json::from_slice(&body).map_err(|e| UpstreamError::Decode(e.to_string()))?;
        debug!(count = statuses.len(), "Fetched timeline");

        Ok(statuses
            .into_iter()
            .filter_map(|status| match status.into_entry() {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(error = %e, "Skipping undecodable timeline entry");
                    None
                }
            })
            .collect())
    }

    async fn list_subscriptions(&self) -> std::result::Result<BTreeSet<String>, UpstreamError> {
        let request = self.http_client.get(self.friends_url.clone());
        let body = self.send(request, &self.friends_url).await?.bytes().await?;

        let users = match serde_json::from_slice(&body)
            .map_err(|e| UpstreamError::Decode(e.to_string()))?
        {
            WireUserList::Bare(users) | WireUserList::Wrapped { users } => users,
        };
        Ok(users.into_iter().map(|user| user.screen_name).collect())
    }

    async fn add_subscription(&self, id: &str) -> std::result::Result<(), UpstreamError> {
        self.change_subscription(&self.follow_url, id).await
    }

    async fn remove_subscription(&self, id: &str) -> std::result::Result<(), UpstreamError> {
        self.change_subscription(&self.unfollow_url, id).await
    }
}

impl WireStatus {
    fn into_entry(self) -> std::result::Result<FeedEntry, UpstreamError> {
        let created_at = parse_timestamp(&self.created_at).ok_or_else(|| {
            UpstreamError::Decode(format!("unrecognized created_at {:?}", self.created_at))
        })?;
        Ok(FeedEntry {
            author: self.user.screen_name,
            created_at,
            text: self.text,
            reshared_from: self.retweeted_status.map(|original| Reshare {
                author: original.user.screen_name,
                text: original.text,
            }),
        })
    }
}

/// Parse the timestamp formats feed APIs use
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(raw, TIMELINE_DATE_FORMAT)
        .or_else(|_| DateTime::parse_from_rfc2822(raw))
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Base URL with a trailing slash, so relative endpoint paths extend it
fn base_url(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw)
        .map_err(|e| Error::config("feed.base_url", format!("invalid URL {raw:?}: {e}")))?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
