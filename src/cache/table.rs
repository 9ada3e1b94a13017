use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use super::entry::{CacheEntry, CachedPayload, EntryIdentity, EntryState};

/// Stable position of an entry: its shard and its slot inside that shard.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EntryId {
    pub shard: usize,
    pub slot: usize,
}

#[derive(Debug, Default)]
struct Shard {
    // Entries are never removed here, so slot indices stay valid for the
    // lifetime of the table.
    slots: Vec<CacheEntry>,
    // Local bucket -> collision chain in insertion order.
    buckets: Vec<Vec<usize>>,
}

/// Sharded, index-based hash table of cached responses.
///
/// Bucket `b` lives in shard `b % shard_count`. Every access goes through a
/// [`BucketGuard`], which holds exactly one shard lock.
#[derive(Debug)]
pub struct CacheTable {
    bucket_count: usize,
    shards: Vec<Mutex<Shard>>,
}

impl CacheTable {
    pub fn new(bucket_count: usize, shard_count: usize) -> Self {
        let bucket_count = bucket_count.max(1);
        let shard_count = shard_count.clamp(1, bucket_count);
        let shards = (0..shard_count)
            .map(|shard| {
                let local = (bucket_count - shard).div_ceil(shard_count);
                Mutex::new(Shard {
                    slots: Vec::new(),
                    buckets: vec![Vec::new(); local],
                })
            })
            .collect();
        Self {
            bucket_count,
            shards,
        }
    }

    pub fn bucket_count(&self) -> usize {
        self.bucket_count
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub fn bucket_for_hash(&self, hash: u64) -> usize {
        (hash % self.bucket_count as u64) as usize
    }

    pub fn shard_for_bucket(&self, bucket: usize) -> usize {
        bucket % self.shards.len()
    }

    /// Locks the shard owning `bucket`; `None` past `bucket_count()`.
    pub fn lock_bucket(&self, bucket: usize) -> Option<BucketGuard<'_>> {
        (bucket < self.bucket_count).then(|| self.guard_for(bucket))
    }

    pub fn lock_hash(&self, hash: u64) -> BucketGuard<'_> {
        self.guard_for(self.bucket_for_hash(hash))
    }

    fn guard_for(&self, bucket: usize) -> BucketGuard<'_> {
        let shard = self.shard_for_bucket(bucket);
        BucketGuard {
            shard: self.shards[shard].lock(),
            shard_index: shard,
            local: bucket / self.shards.len(),
        }
    }

    /// Cache-write path. Appends a VALID entry to its bucket chain, or
    /// refreshes the entry already stored under the same key.
    pub fn insert(
        &self,
        identity: EntryIdentity,
        payload: Arc<CachedPayload>,
        expires_at: u64,
    ) -> EntryId {
        let hash = hash_key(&identity.key);
        let mut guard = self.lock_hash(hash);
        let shard_index = guard.shard_index;
        let local = guard.local;
        let shard = &mut *guard.shard;

        let existing = shard.buckets[local]
            .iter()
            .copied()
            .find(|&slot| shard.slots[slot].hash == hash && shard.slots[slot].key() == &identity.key[..]);
        if let Some(slot) = existing {
            shard.slots[slot].refresh(identity, payload, expires_at);
            return EntryId {
                shard: shard_index,
                slot,
            };
        }

        let slot = shard.slots.len();
        shard
            .slots
            .push(CacheEntry::new(identity, hash, payload, expires_at));
        shard.buckets[local].push(slot);
        EntryId {
            shard: shard_index,
            slot,
        }
    }

    /// Reader path: the payload of a servable entry, cloned under the lock.
    pub fn get(&self, key: &[u8], now: u64) -> Option<Arc<CachedPayload>> {
        let hash = hash_key(key);
        let mut guard = self.lock_hash(hash);
        let entry = guard.lookup(key, hash)?;
        if !entry.is_servable(now) {
            return None;
        }
        entry.payload().cloned()
    }

    pub fn state_of(&self, key: &[u8]) -> Option<EntryState> {
        let hash = hash_key(key);
        let mut guard = self.lock_hash(hash);
        let state = guard.lookup(key, hash).map(|entry| entry.state());
        state
    }

    /// Total entries in any state. Locks each shard in turn.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.lock().slots.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn count_in_state(&self, state: EntryState) -> usize {
        self.shards
            .iter()
            .map(|shard| {
                shard
                    .lock()
                    .slots
                    .iter()
                    .filter(|entry| entry.state() == state)
                    .count()
            })
            .sum()
    }
}

/// One shard lock, scoped to a single bucket of that shard.
pub struct BucketGuard<'a> {
    shard: MutexGuard<'a, Shard>,
    shard_index: usize,
    local: usize,
}

impl BucketGuard<'_> {
    pub fn shard_index(&self) -> usize {
        self.shard_index
    }

    pub fn chain_len(&self) -> usize {
        self.shard.buckets[self.local].len()
    }

    /// Finds the entry stored under exactly `key` in this bucket.
    pub fn lookup(&mut self, key: &[u8], hash: u64) -> Option<&mut CacheEntry> {
        let Shard { slots, buckets } = &mut *self.shard;
        let slot = buckets[self.local]
            .iter()
            .copied()
            .find(|&slot| slots[slot].hash == hash && slots[slot].key() == key)?;
        slots.get_mut(slot)
    }

    /// Visits the bucket's chain in order.
    pub fn for_each_entry(&mut self, mut visit: impl FnMut(&mut CacheEntry)) {
        let Shard { slots, buckets } = &mut *self.shard;
        for &slot in &buckets[self.local] {
            visit(&mut slots[slot]);
        }
    }
}

/// 64-bit FNV-1a over the key bytes.
pub fn hash_key(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn identity(key: &str) -> EntryIdentity {
        EntryIdentity {
            key: Bytes::copy_from_slice(key.as_bytes()),
            proxy_uuid: 1,
            rule_id: 1,
            host: Bytes::from_static(b"h"),
            path: Bytes::copy_from_slice(key.as_bytes()),
        }
    }

    fn payload() -> Arc<CachedPayload> {
        Arc::new(CachedPayload::new(200, Vec::new(), Bytes::from_static(b"ok")))
    }

    #[test]
    fn shards_partition_all_buckets() {
        let table = CacheTable::new(10, 3);
        let total: usize = table
            .shards
            .iter()
            .map(|shard| shard.lock().buckets.len())
            .sum();
        assert_eq!(total, 10);
        for bucket in 0..10 {
            let guard = table.lock_bucket(bucket).unwrap();
            assert_eq!(guard.shard_index(), bucket % 3);
        }
    }

    #[test]
    fn out_of_range_bucket_is_not_locked() {
        let table = CacheTable::new(10, 3);
        assert!(table.lock_bucket(9).is_some());
        assert!(table.lock_bucket(10).is_none());
    }

    #[test]
    fn shard_count_is_clamped_to_bucket_count() {
        let table = CacheTable::new(2, 8);
        assert_eq!(table.shard_count(), 2);
        let table = CacheTable::new(0, 0);
        assert_eq!(table.bucket_count(), 1);
        assert_eq!(table.shard_count(), 1);
    }

    #[test]
    fn insert_then_get_round_trips_and_reinsert_reuses_slot() {
        let table = CacheTable::new(8, 2);
        let first = table.insert(identity("/a"), payload(), 0);
        assert!(table.get(b"/a", 0).is_some());

        let second = table.insert(identity("/a"), payload(), 0);
        assert_eq!(first, second);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn collisions_share_a_chain() {
        let table = CacheTable::new(1, 1);
        table.insert(identity("/a"), payload(), 0);
        table.insert(identity("/b"), payload(), 0);
        let guard = table.lock_bucket(0).unwrap();
        assert_eq!(guard.chain_len(), 2);
    }

    #[test]
    fn get_skips_expired_entries() {
        let table = CacheTable::new(8, 2);
        table.insert(identity("/a"), payload(), 10);
        assert!(table.get(b"/a", 9).is_some());
        assert!(table.get(b"/a", 10).is_none());
    }

    #[test]
    fn fnv1a_matches_reference_vectors() {
        assert_eq!(hash_key(b""), 0xcbf29ce484222325);
        assert_eq!(hash_key(b"a"), 0xaf63dc4c8601ec8c);
    }
}
