//! Cache table, its entries, and the collaborators the purge paths consume.

pub mod entry;
pub mod pool;
pub mod registry;
pub mod table;

pub use entry::{CacheEntry, CachedPayload, EntryIdentity, EntryState, Retirement};
pub use pool::{MemoryPool, PoolBuffer};
pub use registry::{CacheRule, Proxy, ProxyRegistry};
pub use table::{BucketGuard, CacheTable, EntryId, hash_key};
