//! Cooperative scheduling for long-running purge work.
//!
//! Tasks never get preempted: each [`ResumableTask::resume`] call must bound
//! its own work and return, and the queue resumes it again on the next round.

use std::collections::VecDeque;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{PurgeError, Result};

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    fn now_epoch_seconds(&self) -> u64;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn now_epoch_seconds(&self) -> u64 {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_else(|_| std::time::Duration::from_secs(0));
        now.as_secs()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Done,
}

pub trait ResumableTask: Send {
    fn name(&self) -> &str;

    /// Runs one bounded slice of work.
    fn resume(&mut self) -> TaskStatus;
}

/// Round-robin queue of resumable tasks.
#[derive(Default)]
pub struct TaskQueue {
    tasks: VecDeque<Box<dyn ResumableTask>>,
    rounds: u64,
}

impl TaskQueue {
    pub fn push(&mut self, task: Box<dyn ResumableTask>) {
        self.tasks.push_back(task);
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn rounds(&self) -> u64 {
        self.rounds
    }

    /// Resumes every queued task once; finished tasks are dropped. Returns
    /// how many tasks are still pending.
    pub fn run_round(&mut self) -> usize {
        self.rounds = self.rounds.saturating_add(1);
        for _ in 0..self.tasks.len() {
            let Some(mut task) = self.tasks.pop_front() else {
                break;
            };
            match task.resume() {
                TaskStatus::Pending => self.tasks.push_back(task),
                TaskStatus::Done => tracing::debug!(task = task.name(), "task finished"),
            }
        }
        self.tasks.len()
    }

    pub fn run_until_idle(&mut self) {
        while self.run_round() > 0 {}
    }
}

/// Registration side of the background driver. Cheap to clone.
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<Box<dyn ResumableTask>>,
}

impl std::fmt::Debug for SchedulerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerHandle")
            .field("capacity", &self.tx.capacity())
            .finish()
    }
}

impl SchedulerHandle {
    /// Hands `task` to the driver. Fails when the driver is gone or already
    /// has its maximum number of pending registrations.
    pub fn register(&self, task: Box<dyn ResumableTask>) -> Result<()> {
        self.tx.try_send(task).map_err(|err| {
            let reason = match err {
                mpsc::error::TrySendError::Full(task) => {
                    format!("scheduler queue full, dropping {}", task.name())
                }
                mpsc::error::TrySendError::Closed(task) => {
                    format!("scheduler stopped, dropping {}", task.name())
                }
            };
            tracing::warn!(%reason, "task registration failed");
            PurgeError::internal(reason)
        })
    }
}

/// Background driver that owns a [`TaskQueue`] on the tokio runtime.
pub struct SweepScheduler {
    rx: mpsc::Receiver<Box<dyn ResumableTask>>,
    queue: TaskQueue,
}

impl SweepScheduler {
    pub fn new(max_pending: usize) -> (Self, SchedulerHandle) {
        let (tx, rx) = mpsc::channel(max_pending.max(1));
        (
            Self {
                rx,
                queue: TaskQueue::default(),
            },
            SchedulerHandle { tx },
        )
    }

    /// Takes every registered task into the queue and resumes each once.
    /// Returns how many tasks are still pending.
    pub fn run_round(&mut self) -> usize {
        self.drain_registrations();
        self.queue.run_round()
    }

    fn drain_registrations(&mut self) {
        while let Ok(task) = self.rx.try_recv() {
            self.queue.push(task);
        }
    }

    /// Runs until every handle is dropped and all queued tasks have finished.
    pub async fn run(mut self) {
        loop {
            self.drain_registrations();

            if self.queue.is_empty() {
                match self.rx.recv().await {
                    Some(task) => self.queue.push(task),
                    None => return,
                }
                continue;
            }

            self.queue.run_round();
            tokio::task::yield_now().await;
        }
    }

    pub fn spawn(self) -> AbortOnDrop {
        AbortOnDrop::new(tokio::spawn(self.run()))
    }
}

/// Aborts the wrapped task when dropped.
#[derive(Debug)]
pub struct AbortOnDrop(JoinHandle<()>);

impl AbortOnDrop {
    pub fn new(handle: JoinHandle<()>) -> Self {
        Self(handle)
    }
}

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}
