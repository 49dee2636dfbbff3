//! Top-level control loop.
//!
//! ```text
//!   Disconnected ──connect+join ok──▶ Running ──stop──▶ Terminated
//!        ▲                              │  ▲
//!        └──── transport-level error ───┘  └── transient upstream error
//! ```
//!
//! Task state lives in the [`Scheduler`], which outlives every connection:
//! a reconnect resumes the same tasks with their deadlines untouched.

use crate::bridge::{Bridge, BridgeTask};
use crate::config::{Config, RetryConfig};
use crate::error::{FailureClass, Result};
use crate::feed::FeedClient;
use crate::retry::{Backoff, IsRetryable};
use crate::scheduler::Scheduler;
use crate::transport::ChatTransport;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Where the supervisor is in its lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SupervisorState {
    /// No usable chat connection; the next step connects
    Disconnected,
    /// Connected; the next step runs the scheduler
    Running,
    /// Stopped for good
    Terminated,
}

/// Keeps the bridge connected and its tasks running
pub struct Supervisor<T, F> {
    scheduler: Scheduler<BridgeTask>,
    bridge: Bridge<T, F>,
    reconnect: RetryConfig,
    state: SupervisorState,
    reconnects: u64,
}

impl<T: ChatTransport, F: FeedClient> Supervisor<T, F> {
    /// Supervisor for `config` over the given collaborators
    pub fn new(config: &Config, transport: T, feed: F) -> Result<Self> {
        let bridge = Bridge::new(config, transport, feed);
        let scheduler = Scheduler::new(Bridge::<T, F>::tasks(&config.schedule))?;
        Ok(Self::from_parts(scheduler, bridge, config.reconnect.clone()))
    }

    /// Supervisor over an already-built scheduler and bridge
    pub fn from_parts(
        scheduler: Scheduler<BridgeTask>,
        bridge: Bridge<T, F>,
        reconnect: RetryConfig,
    ) -> Self {
        Self {
            scheduler,
            bridge,
            reconnect,
            state: SupervisorState::Disconnected,
            reconnects: 0,
        }
    }

    /// Current state
    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// The task scheduler
    pub fn scheduler(&self) -> &Scheduler<BridgeTask> {
        &self.scheduler
    }

    /// The bridge the tasks run against
    pub fn bridge(&self) -> &Bridge<T, F> {
        &self.bridge
    }

    /// Mutable access to the bridge
    pub fn bridge_mut(&mut self) -> &mut Bridge<T, F> {
        &mut self.bridge
    }

    /// Connections lost and re-established so far
    pub fn reconnects(&self) -> u64 {
        self.reconnects
    }

    /// Run until `stop` is cancelled.
    ///
    /// # Errors
    /// Returns the error that terminated the loop: a fatal failure or a
    /// refused registration. Connect failures are retried until `stop`.
    pub async fn run(&mut self, stop: &CancellationToken) -> Result<()> {
        while self.step(stop).await? != SupervisorState::Terminated {}
        info!(reconnects = self.reconnects, "Supervisor stopped");
        Ok(())
    }

    /// Perform one state transition and return the new state
    pub async fn step(&mut self, stop: &CancellationToken) -> Result<SupervisorState> {
        let outcome = match self.state {
            SupervisorState::Disconnected => self.connect(stop).await,
            SupervisorState::Running => self.run_tasks(stop).await,
            SupervisorState::Terminated => Ok(SupervisorState::Terminated),
        };

        match outcome {
            Ok(next) => {
                self.state = next;
                Ok(next)
            }
            Err(e) => {
                error!(error = %e, "Supervisor terminating");
                self.state = SupervisorState::Terminated;
                Err(e)
            }
        }
    }

    async fn connect(&mut self, stop: &CancellationToken) -> Result<SupervisorState> {
        let mut backoff = Backoff::new(&self.reconnect);
        loop {
            let attempt = tokio::select! {
                _ = stop.cancelled() => return Ok(SupervisorState::Terminated),
                attempt = self.bridge.connect_and_join() => attempt,
            };

            let e = match attempt {
                Ok(()) => return Ok(SupervisorState::Running),
                Err(e) if e.is_retryable() => e,
                Err(e) => return Err(e.into()),
            };

            let delay = match backoff.next_delay() {
                Some(delay) => {
                    warn!(
                        error = %e,
                        attempt = backoff.attempts(),
                        max_attempts = backoff.max_attempts(),
                        delay_ms = delay.as_millis() as u64,
                        "Connect failed, retrying"
                    );
                    delay
                }
                None => {
                    let delay = backoff.ceiling();
                    error!(
                        error = %e,
                        attempts = backoff.attempts(),
                        delay_ms = delay.as_millis() as u64,
                        "Reconnect budget exhausted, still retrying"
                    );
                    delay
                }
            };

            tokio::select! {
                _ = stop.cancelled() => return Ok(SupervisorState::Terminated),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn run_tasks(&mut self, stop: &CancellationToken) -> Result<SupervisorState> {
        let Err(e) = self.scheduler.run_forever(&mut self.bridge, stop).await else {
            info!("Stop requested");
            return Ok(SupervisorState::Terminated);
        };

        match e.class() {
            FailureClass::TransportLevel => {
                warn!(error = %e, "Chat connection lost, reconnecting");
                self.reconnects += 1;
                Ok(SupervisorState::Disconnected)
            }
            FailureClass::TransientUpstream => {
                warn!(error = %e, "Feed unavailable, continuing");
                Ok(SupervisorState::Running)
            }
            FailureClass::Fatal => Err(e),
        }
    }
}
