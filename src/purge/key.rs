use bytes::Bytes;

use crate::cache::{CacheTable, Retirement};
use crate::error::{PurgeError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyPurgeOutcome {
    FoundAndPurged,
    NotFound,
}

/// Invalidates the single entry stored under `key`, under one shard lock.
pub fn purge_by_key(table: &CacheTable, key: &[u8], hash: u64) -> KeyPurgeOutcome {
    let mut guard = table.lock_hash(hash);
    let purged = guard
        .lookup(key, hash)
        .is_some_and(|entry| entry.retire(Retirement::Expired));
    if purged {
        KeyPurgeOutcome::FoundAndPurged
    } else {
        KeyPurgeOutcome::NotFound
    }
}

/// Key a request for `uri` on `host` is cached under.
pub fn build_purge_key(host: Option<&[u8]>, uri: &[u8]) -> Result<Bytes> {
    let host = host
        .filter(|host| !host.is_empty())
        .ok_or_else(|| PurgeError::internal("cannot build purge key without a host"))?;
    let mut key = Vec::with_capacity(host.len() + uri.len());
    key.extend_from_slice(host);
    key.extend_from_slice(uri);
    Ok(Bytes::from(key))
}
