//! Social-feed collaborator: the timeline entries the bridge relays and the
//! subscription set channel members can change.

use crate::error::UpstreamError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;

mod http;

pub use http::HttpFeedClient;

/// One timeline entry, as fetched
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeedEntry {
    /// Author identifier
    pub author: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Entry text, possibly containing HTML entities and newlines
    pub text: String,
    /// Present when this entry reshares someone else's
    pub reshared_from: Option<Reshare>,
}

/// The original author and text of a reshared entry
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reshare {
    /// Original author identifier
    pub author: String,
    /// Original text
    pub text: String,
}

/// Access to the social-feed API
///
/// Every method fails with an [`UpstreamError`], which callers treat as
/// transient: the chat side is unaffected.
#[async_trait]
pub trait FeedClient: Send + Sync {
    /// Latest timeline entries, newest first
    async fn fetch_timeline(&self) -> Result<Vec<FeedEntry>, UpstreamError>;

    /// Identifiers currently subscribed to
    async fn list_subscriptions(&self) -> Result<BTreeSet<String>, UpstreamError>;

    /// Subscribe to `id`
    async fn add_subscription(&self, id: &str) -> Result<(), UpstreamError>;

    /// Unsubscribe from `id`
    async fn remove_subscription(&self, id: &str) -> Result<(), UpstreamError>;
}

#[async_trait]
impl<F: FeedClient + ?Sized> FeedClient for Arc<F> {
    async fn fetch_timeline(&self) -> Result<Vec<FeedEntry>, UpstreamError> {
        (**self).fetch_timeline().await
    }

    async fn list_subscriptions(&self) -> Result<BTreeSet<String>, UpstreamError> {
        (**self).list_subscriptions().await
    }

    async fn add_subscription(&self, id: &str) -> Result<(), UpstreamError> {
        (**self).add_subscription(id).await
    }

    async fn remove_subscription(&self, id: &str) -> Result<(), UpstreamError> {
        (**self).remove_subscription(id).await
    }
}

#[cfg(test)]
mod tests;
