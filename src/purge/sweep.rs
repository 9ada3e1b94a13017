use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::cache::{CacheTable, Retirement};
use crate::observability::PurgeStats;
use crate::reply::PurgeReply;
use crate::sched::{Clock, ResumableTask, TaskStatus};

use super::criteria::PurgeCriteria;

/// Per-tick limits for a sweep.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SweepBudget {
    /// Buckets visited per tick, regardless of chain length.
    pub max_buckets_per_tick: usize,
    /// Wall-clock slice per tick, checked after every bucket.
    pub tick_slice_micros: u64,
}

impl Default for SweepBudget {
    fn default() -> Self {
        Self {
            max_buckets_per_tick: 1000,
            tick_slice_micros: 1000,
        }
    }
}

impl SweepBudget {
    pub fn tick_slice(&self) -> Duration {
        Duration::from_micros(self.tick_slice_micros)
    }
}

/// Resumable walk over the whole table that retires every VALID entry the
/// criteria match. Holds one shard lock per bucket, never more.
pub struct PurgeSweep {
    table: Arc<CacheTable>,
    criteria: PurgeCriteria,
    budget: SweepBudget,
    clock: Arc<dyn Clock>,
    cursor: usize,
    ticks: u64,
    invalidated: u64,
    stats: Option<Arc<PurgeStats>>,
    reply: Option<oneshot::Sender<PurgeReply>>,
}

impl PurgeSweep {
    pub fn new(
        table: Arc<CacheTable>,
        criteria: PurgeCriteria,
        budget: SweepBudget,
        clock: Arc<dyn Clock>,
    ) -> Self {
        // A zero ceiling would never advance the cursor.
        let budget = SweepBudget {
            max_buckets_per_tick: budget.max_buckets_per_tick.max(1),
            ..budget
        };
        Self {
            table,
            criteria,
            budget,
            clock,
            cursor: 0,
            ticks: 0,
            invalidated: 0,
            stats: None,
            reply: None,
        }
    }

    pub fn with_stats(mut self, stats: Arc<PurgeStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Receiver resolves to the success reply once the whole table is visited.
    pub fn reply_channel(&mut self) -> oneshot::Receiver<PurgeReply> {
        let (tx, rx) = oneshot::channel();
        self.reply = Some(tx);
        rx
    }

    pub fn criteria(&self) -> &PurgeCriteria {
        &self.criteria
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn invalidated(&self) -> u64 {
        self.invalidated
    }

    pub fn is_complete(&self) -> bool {
        self.cursor >= self.table.bucket_count()
    }

    /// One scheduler tick.
    pub fn tick(&mut self) -> TaskStatus {
        if self.ticks == 0 {
            tracing::info!(
                mode = %self.criteria.mode(),
                buckets = self.table.bucket_count(),
                "purge sweep started"
            );
        }
        self.ticks = self.ticks.saturating_add(1);

        let started = self.clock.now();
        let slice = self.budget.tick_slice();
        let bucket_count = self.table.bucket_count();
        let mut visited = 0usize;

        while self.cursor < bucket_count && visited < self.budget.max_buckets_per_tick {
            let criteria = &self.criteria;
            let mut retired = 0u64;
            {
                let Some(mut guard) = self.table.lock_bucket(self.cursor) else {
                    break;
                };
                guard.for_each_entry(|entry| {
                    if entry.is_valid()
                        && criteria.matches(entry)
                        && entry.retire(Retirement::Invalid)
                    {
                        retired += 1;
                    }
                });
            }
            self.invalidated = self.invalidated.saturating_add(retired);
            if let Some(stats) = self.stats.as_ref() {
                stats.record_invalidated(retired);
            }
            self.cursor += 1;
            visited += 1;

            // Chains are walked in full before the slice is checked.
            if self.clock.now().saturating_duration_since(started) > slice {
                break;
            }
        }

        if !self.is_complete() {
            return TaskStatus::Pending;
        }

        tracing::info!(
            mode = %self.criteria.mode(),
            invalidated = self.invalidated,
            ticks = self.ticks,
            "purge sweep finished"
        );
        if let Some(stats) = self.stats.as_ref() {
            stats.record_sweep_completed();
        }
        if let Some(reply) = self.reply.take() {
            // The requester may have gone away; the purge still stands.
            let _ = reply.send(PurgeReply::Ok);
        }
        TaskStatus::Done
    }
}

impl ResumableTask for PurgeSweep {
    fn name(&self) -> &str {
        "purge-sweep"
    }

    fn resume(&mut self) -> TaskStatus {
        self.tick()
    }
}
