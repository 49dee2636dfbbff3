//! Watermark-based incremental sync.
//!
//! Turns "fetch the latest batch" into "emit each entry exactly once". The
//! feed returns newest-first; entries are emitted oldest-first, and only those
//! strictly newer than the watermark. The watermark only ever moves forward,
//! and only past entries that were actually emitted.

use crate::feed::FeedEntry;
use crate::format::{collapse_newlines, decode_entities};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Creation time of the most recently relayed entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Watermark(DateTime<Utc>);

impl Watermark {
    /// Watermark at an explicit instant
    pub fn at(timestamp: DateTime<Utc>) -> Self {
        Self(timestamp)
    }

    /// Initial watermark: `now - grace`, so a fresh start neither floods the
    /// channel with history nor misses entries created while starting up
    pub fn starting_at(now: DateTime<Utc>, grace: Duration) -> Self {
        let grace = chrono::Duration::from_std(grace).unwrap_or(chrono::Duration::zero());
        Self(now - grace)
    }

    /// The timestamp itself
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.0
    }

    /// Move forward to `timestamp`; never moves backwards
    pub fn advance(&mut self, timestamp: DateTime<Utc>) {
        if timestamp > self.0 {
            self.0 = timestamp;
        }
    }

    /// Whether an entry created at `timestamp` has not been relayed yet
    pub fn is_new(&self, timestamp: DateTime<Utc>) -> bool {
        timestamp > self.0
    }
}

/// An entry selected for relay, with its display text already derived
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelayEntry {
    /// Author of the entry
    pub author: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Single-line display text
    pub text: String,
}

/// Result of one filter pass
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncOutcome {
    /// New entries, oldest first
    pub emit: Vec<RelayEntry>,
    /// Watermark after relaying everything in `emit`
    pub watermark: Watermark,
}

/// Select the entries of `batch` newer than `watermark`.
///
/// `batch` is in the feed's native newest-first order. The whole batch is
/// scanned, so an out-of-order batch still yields every new entry, sorted by
/// creation time.
pub fn filter(batch: &[FeedEntry], watermark: Watermark) -> SyncOutcome {
    let mut highest_seen = watermark;
    let mut emit: Vec<RelayEntry> = Vec::new();

    for entry in batch.iter().rev() {
        if watermark.is_new(entry.created_at) {
            emit.push(RelayEntry {
                author: entry.author.clone(),
                created_at: entry.created_at,
                text: display_text(entry),
            });
            highest_seen.advance(entry.created_at);
        }
    }

    // Stable: equal timestamps keep their oldest-first scan order
    emit.sort_by_key(|entry| entry.created_at);

    SyncOutcome {
        emit,
        watermark: highest_seen,
    }
}

/// Text shown in the channel for an entry: reshares become `RT @author: text`
pub fn display_text(entry: &FeedEntry) -> String {
    let raw = match &entry.reshared_from {
        Some(original) => format!("RT @{}: {}", original.author, original.text),
        None => entry.text.clone(),
    };
    collapse_newlines(&decode_entities(&raw))
}
