//! Cooperative periodic-task scheduler.
//!
//! A fixed set of [`Task`]s is registered once. [`Scheduler::run_forever`]
//! repeatedly takes the task with the earliest deadline, sleeps until that
//! deadline if it is in the future, runs it through a [`TaskHandler`], and
//! reschedules it at `completion time + interval`. Exactly one task body runs
//! at a time; a slow task delays every other task. Missed ticks are never
//! caught up.
//!
//! # Example
//!
//! ```no_run
//! use async_trait::async_trait;
//! use feedbridge::scheduler::{Scheduler, Task, TaskHandler};
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! enum Job {
//!     Heartbeat,
//! }
//!
//! struct Worker;
//!
//! #[async_trait]
//! impl TaskHandler<Job> for Worker {
//!     async fn run_task(&mut self, job: &Job) -> feedbridge::Result<()> {
//!         match job {
//!             Job::Heartbeat => tracing::info!("tick"),
//!         }
//!         Ok(())
//!     }
//! }
//!
//! # async fn example() -> feedbridge::Result<()> {
//! let mut scheduler = Scheduler::new(vec![Task::new(
//!     "heartbeat",
//!     Job::Heartbeat,
//!     Duration::from_secs(5),
//! )])?;
//! let stop = CancellationToken::new();
//! scheduler.run_forever(&mut Worker, &stop).await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// A named unit of periodic work
#[derive(Debug)]
pub struct Task<K> {
    name: String,
    kind: K,
    interval: Duration,
    next_run_at: Instant,
    runs: u64,
}

impl<K> Task<K> {
    /// Create a task that is due immediately
    pub fn new(name: impl Into<String>, kind: K, interval: Duration) -> Self {
        Self {
            name: name.into(),
            kind,
            interval,
            next_run_at: Instant::now(),
            runs: 0,
        }
    }

    /// Diagnostic name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// What the handler should do when this task fires
    pub fn kind(&self) -> &K {
        &self.kind
    }

    /// Repeat interval
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Earliest instant the scheduler may run this task again
    pub fn next_run_at(&self) -> Instant {
        self.next_run_at
    }

    /// How many times the task has been run
    pub fn runs(&self) -> u64 {
        self.runs
    }
}

/// Performs the work behind a task kind
#[async_trait]
pub trait TaskHandler<K>: Send {
    /// Run one invocation of `kind`.
    ///
    /// An `Err` stops [`Scheduler::run_forever`] and is returned to its caller;
    /// failures the handler can absorb must be absorbed here.
    async fn run_task(&mut self, kind: &K) -> Result<()>;
}

/// Point-in-time view of one registered task
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskSnapshot {
    /// Task name
    pub name: String,
    /// Repeat interval
    pub interval: Duration,
    /// Next deadline
    pub next_run_at: Instant,
    /// Completed invocations
    pub runs: u64,
}

struct QueueEntry<K> {
    task: Task<K>,
    seq: u64,
}

impl<K> QueueEntry<K> {
    fn key(&self) -> (Instant, u64) {
        (self.task.next_run_at, self.seq)
    }
}

impl<K> PartialEq for QueueEntry<K> {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl<K> Eq for QueueEntry<K> {}

// BinaryHeap is a max-heap; reverse so the earliest deadline is on top.
// Equal deadlines pop in insertion order.
impl<K> Ord for QueueEntry<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        other.key().cmp(&self.key())
    }
}

impl<K> PartialOrd for QueueEntry<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Min-priority container of tasks keyed by `next_run_at`
pub struct TaskQueue<K> {
    heap: BinaryHeap<QueueEntry<K>>,
    next_seq: u64,
}

impl<K> Default for TaskQueue<K> {
    fn default() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }
}

impl<K> TaskQueue<K> {
    /// Empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task
    pub fn insert(&mut self, task: Task<K>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(QueueEntry { task, seq });
    }

    /// The task with the earliest deadline
    pub fn peek_min(&self) -> Option<&Task<K>> {
        self.heap.peek().map(|entry| &entry.task)
    }

    /// Remove and return the task with the earliest deadline
    pub fn pop_min(&mut self) -> Option<Task<K>> {
        self.heap.pop().map(|entry| entry.task)
    }

    /// Number of tasks held
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Whether the queue holds no tasks
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Tasks in pop order
    pub fn ordered(&self) -> Vec<&Task<K>> {
        let mut entries: Vec<&QueueEntry<K>> = self.heap.iter().collect();
        entries.sort_by_key(|entry| entry.key());
        entries.into_iter().map(|entry| &entry.task).collect()
    }
}

/// Runs a fixed set of tasks forever, one at a time
pub struct Scheduler<K> {
    queue: TaskQueue<K>,
}

impl<K: Send + Sync> Scheduler<K> {
    /// Register the task set. The set is fixed for the scheduler's lifetime.
    pub fn new(tasks: Vec<Task<K>>) -> Result<Self> {
        if tasks.is_empty() {
            return Err(Error::Other(
                "scheduler needs at least one task".to_string(),
            ));
        }
        let mut queue = TaskQueue::new();
        for task in tasks {
            queue.insert(task);
        }
        Ok(Self { queue })
    }

    /// Number of registered tasks
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Always false: construction rejects an empty task set
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Current state of every task, in pop order
    pub fn snapshot(&self) -> Vec<TaskSnapshot> {
        self.queue
            .ordered()
            .into_iter()
            .map(|task| TaskSnapshot {
                name: task.name.clone(),
                interval: task.interval,
                next_run_at: task.next_run_at,
                runs: task.runs,
            })
            .collect()
    }

    /// Run tasks until `stop` is cancelled or a task fails.
    ///
    /// Returns `Ok(())` only on stop. A task error is returned after the task
    /// has been rescheduled, so calling `run_forever` again resumes from the
    /// same task state.
    pub async fn run_forever<H>(&mut self, handler: &mut H, stop: &CancellationToken) -> Result<()>
    where
        H: TaskHandler<K> + ?Sized,
    {
        loop {
            if stop.is_cancelled() {
                return Ok(());
            }

            let due = match self.queue.peek_min() {
                Some(task) => task.next_run_at,
                None => return Ok(()),
            };

            if due > Instant::now() {
                tokio::select! {
                    _ = stop.cancelled() => return Ok(()),
                    _ = tokio::time::sleep_until(due) => {}
                }
            }

            let Some(mut task) = self.queue.pop_min() else {
                return Ok(());
            };

            tracing::trace!(task = %task.name, "Running scheduled task");
            let outcome = handler.run_task(&task.kind).await;

            task.runs += 1;
            task.next_run_at = Instant::now() + task.interval;
            let name = task.name.clone();
            self.queue.insert(task);

            if let Err(e) = outcome {
                tracing::debug!(task = %name, error = %e, "Scheduled task failed");
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests;
