//! # feedbridge
//!
//! Relays a polled social-feed timeline into IRC channels and lets channel
//! members change what the feed follows.
//!
//! ## Architecture
//!
//! - [`scheduler`] runs a fixed set of periodic tasks one at a time
//! - [`sync_filter`] turns "fetch the latest batch" into "emit each entry once"
//! - [`relay`] broadcasts to every destination channel
//! - [`commands`] handles `follow <name>` / `unfollow <name>` private messages
//! - [`bridge`] ties those together as the scheduler's task handler
//! - [`supervisor`] connects, runs the scheduler, and reconnects after
//!   transport failures
//!
//! The chat and feed sides are traits ([`ChatTransport`], [`FeedClient`]) with
//! network implementations ([`IrcConnection`], [`HttpFeedClient`]) and
//! in-memory fakes in `testing` (enabled by the `testing` feature).
//!
//! ## Quick Start
//!
//! ```no_run
//! use feedbridge::{Config, HttpFeedClient, IrcConnection, Supervisor, run_with_shutdown};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("feedbridge.toml")?;
//!     let transport = IrcConnection::from_config(&config.irc);
//!     let feed = HttpFeedClient::new(&config.feed)?;
//!
//!     let mut supervisor = Supervisor::new(&config, transport, feed)?;
//!     run_with_shutdown(&mut supervisor).await?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// The bridge's periodic jobs and shared state
pub mod bridge;
/// Follow/unfollow command handling
pub mod commands;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Social-feed client
pub mod feed;
/// Chat text decoration
pub mod format;
/// Channel broadcast
pub mod relay;
/// Retry logic with exponential backoff
pub mod retry;
/// Cooperative periodic-task scheduler
pub mod scheduler;
/// Top-level reconnecting control loop
pub mod supervisor;
/// Watermark-based incremental sync
pub mod sync_filter;
/// In-memory collaborators for tests
#[cfg(any(test, feature = "testing"))]
pub mod testing;
/// Chat transport
pub mod transport;

// Re-export commonly used types
pub use bridge::{Bridge, BridgeTask};
pub use config::Config;
pub use error::{Error, FailureClass, Result, TransportError, UpstreamError};
pub use feed::{FeedClient, FeedEntry, HttpFeedClient};
pub use format::PrefixStyle;
pub use supervisor::{Supervisor, SupervisorState};
pub use sync_filter::Watermark;
pub use transport::{ChatTransport, InboundEvent, IrcConnection};

use tokio_util::sync::CancellationToken;

/// Run a supervisor until the process receives a termination signal.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// Returns `Ok(())` after a signal, or the error that stopped the supervisor.
pub async fn run_with_shutdown<T, F>(supervisor: &mut Supervisor<T, F>) -> Result<()>
where
    T: ChatTransport,
    F: FeedClient,
{
    let stop = CancellationToken::new();
    let signal_stop = stop.clone();
    let watcher = tokio::spawn(async move {
        wait_for_signal().await;
        signal_stop.cancel();
    });

    let result = supervisor.run(&stop).await;
    watcher.abort();
    result
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration can fail in restricted environments; fall back to ctrl_c
    let (mut sigterm, mut sigint) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(term), Ok(int)) => (term, int),
        (Err(e), _) | (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register signal handlers, using ctrl_c");
            tokio::signal::ctrl_c().await.ok();
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down"),
        _ = sigint.recv() => tracing::info!("Received SIGINT, shutting down"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C, shutting down"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C"),
    }
}
