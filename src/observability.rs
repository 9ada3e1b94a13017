use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeStatsSnapshot {
    pub requests: u64,
    pub rejected: u64,
    pub key_purges: u64,
    pub key_misses: u64,
    pub sweeps_scheduled: u64,
    pub sweeps_completed: u64,
    pub entries_invalidated: u64,
    pub rule_updates: u64,
    pub stored: u64,
}

/// Counters shared by the manager and the sweeps it schedules.
#[derive(Debug, Default)]
pub struct PurgeStats {
    requests: AtomicU64,
    rejected: AtomicU64,
    key_purges: AtomicU64,
    key_misses: AtomicU64,
    sweeps_scheduled: AtomicU64,
    sweeps_completed: AtomicU64,
    entries_invalidated: AtomicU64,
    rule_updates: AtomicU64,
    stored: AtomicU64,
}

impl PurgeStats {
    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_key_purge(&self, found: bool) {
        if found {
            self.key_purges.fetch_add(1, Ordering::Relaxed);
        } else {
            self.key_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_sweep_scheduled(&self) {
        self.sweeps_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sweep_completed(&self) {
        self.sweeps_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalidated(&self, entries: u64) {
        if entries > 0 {
            self.entries_invalidated.fetch_add(entries, Ordering::Relaxed);
        }
    }

    pub fn record_rule_updates(&self, rules: u64) {
        self.rule_updates.fetch_add(rules, Ordering::Relaxed);
    }

    pub fn record_store(&self) {
        self.stored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PurgeStatsSnapshot {
        PurgeStatsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            key_purges: self.key_purges.load(Ordering::Relaxed),
            key_misses: self.key_misses.load(Ordering::Relaxed),
            sweeps_scheduled: self.sweeps_scheduled.load(Ordering::Relaxed),
            sweeps_completed: self.sweeps_completed.load(Ordering::Relaxed),
            entries_invalidated: self.entries_invalidated.load(Ordering::Relaxed),
            rule_updates: self.rule_updates.load(Ordering::Relaxed),
            stored: self.stored.load(Ordering::Relaxed),
        }
    }
}
