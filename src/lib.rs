//! Purge and management front end for a shared HTTP response cache.
//!
//! Purges either retire one entry by key or classify a request into
//! [`PurgeCriteria`] and sweep the whole table incrementally on a
//! cooperative [`sched::SweepScheduler`].

pub mod cache;
pub mod config;
mod error;
pub mod manager;
pub mod observability;
pub mod purge;
pub mod reply;
pub mod sched;

#[cfg(feature = "http")]
pub mod http;

pub use cache::{CacheTable, CachedPayload, EntryIdentity, EntryState, MemoryPool, ProxyRegistry};
pub use config::{ConfigError, PurgeConfig};
pub use error::{PurgeError, Result};
pub use manager::{CacheManager, ManagerOutcome, ManagerRequest, SweepHandle};
pub use observability::{PurgeStats, PurgeStatsSnapshot};
pub use purge::{PurgeAttributes, PurgeCriteria, PurgeMode, PurgeSweep, SweepBudget};
pub use reply::PurgeReply;
pub use sched::{Clock, SystemClock, TaskQueue, TaskStatus};
