use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;

/// Stored response shared between the table and readers that are serving it.
#[derive(Debug)]
pub struct CachedPayload {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    invalid: AtomicBool,
}

impl CachedPayload {
    pub fn new(status: u16, headers: Vec<(String, String)>, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
            invalid: AtomicBool::new(false),
        }
    }

    /// Set once the owning entry has been purged; a reader still holding the
    /// handle must stop trusting it.
    pub fn is_invalid(&self) -> bool {
        self.invalid.load(Ordering::Acquire)
    }

    fn mark_invalid(&self) {
        self.invalid.store(true, Ordering::Release);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryState {
    Valid,
    Expired,
    Invalid,
}

/// Terminal state an entry is retired into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Retirement {
    /// Single-key purge.
    Expired,
    /// Sweep purge.
    Invalid,
}

impl From<Retirement> for EntryState {
    fn from(value: Retirement) -> Self {
        match value {
            Retirement::Expired => EntryState::Expired,
            Retirement::Invalid => EntryState::Invalid,
        }
    }
}

/// Identity of a cached response, as recorded by the cache-write path.
#[derive(Clone, Debug)]
pub struct EntryIdentity {
    pub key: Bytes,
    pub proxy_uuid: u32,
    pub rule_id: u32,
    pub host: Bytes,
    pub path: Bytes,
}

#[derive(Debug)]
pub struct CacheEntry {
    pub(crate) identity: EntryIdentity,
    pub(crate) hash: u64,
    state: EntryState,
    payload: Option<Arc<CachedPayload>>,
    expires_at: u64,
}

impl CacheEntry {
    pub fn new(
        identity: EntryIdentity,
        hash: u64,
        payload: Arc<CachedPayload>,
        expires_at: u64,
    ) -> Self {
        Self {
            identity,
            hash,
            state: EntryState::Valid,
            payload: Some(payload),
            expires_at,
        }
    }

    pub fn key(&self) -> &[u8] {
        &self.identity.key
    }

    pub fn hash(&self) -> u64 {
        self.hash
    }

    pub fn proxy_uuid(&self) -> u32 {
        self.identity.proxy_uuid
    }

    pub fn rule_id(&self) -> u32 {
        self.identity.rule_id
    }

    pub fn host(&self) -> &[u8] {
        &self.identity.host
    }

    pub fn path(&self) -> &[u8] {
        &self.identity.path
    }

    pub fn state(&self) -> EntryState {
        self.state
    }

    pub fn is_valid(&self) -> bool {
        self.state == EntryState::Valid
    }

    pub fn payload(&self) -> Option<&Arc<CachedPayload>> {
        self.payload.as_ref()
    }

    /// Epoch seconds; zero means no expiry (or a retired entry).
    pub fn expires_at(&self) -> u64 {
        self.expires_at
    }

    pub fn is_servable(&self, now: u64) -> bool {
        self.is_valid() && (self.expires_at == 0 || now < self.expires_at)
    }

    /// Moves a VALID entry into a terminal state. The caller holds the shard
    /// lock, so readers see either the whole transition or none of it.
    ///
    /// Returns `false` (and changes nothing) when the entry is not VALID.
    pub fn retire(&mut self, to: Retirement) -> bool {
        if self.state != EntryState::Valid {
            return false;
        }
        if let Some(payload) = self.payload.take() {
            payload.mark_invalid();
        }
        self.state = to.into();
        self.expires_at = 0;
        true
    }

    /// Cache-write path: swap in a fresh payload and make the entry servable again.
    pub(crate) fn refresh(&mut self, identity: EntryIdentity, payload: Arc<CachedPayload>, expires_at: u64) {
        if let Some(old) = self.payload.replace(payload) {
            old.mark_invalid();
        }
        self.identity = identity;
        self.state = EntryState::Valid;
        self.expires_at = expires_at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> CacheEntry {
        CacheEntry::new(
            EntryIdentity {
                key: Bytes::from_static(b"example.com/a"),
                proxy_uuid: 1,
                rule_id: 2,
                host: Bytes::from_static(b"example.com"),
                path: Bytes::from_static(b"/a"),
            },
            7,
            Arc::new(CachedPayload::new(200, Vec::new(), Bytes::from_static(b"ok"))),
            100,
        )
    }

    #[test]
    fn retire_detaches_payload_and_clears_expiry() {
        let mut entry = entry();
        let reader = entry.payload().cloned().unwrap();

        assert!(entry.retire(Retirement::Invalid));
        assert_eq!(entry.state(), EntryState::Invalid);
        assert!(entry.payload().is_none());
        assert_eq!(entry.expires_at(), 0);
        assert!(reader.is_invalid());
    }

    #[test]
    fn retire_is_refused_for_non_valid_entries() {
        let mut entry = entry();
        assert!(entry.retire(Retirement::Expired));
        assert!(!entry.retire(Retirement::Invalid));
        assert_eq!(entry.state(), EntryState::Expired);
    }

    #[test]
    fn servable_respects_expiry() {
        let entry = entry();
        assert!(entry.is_servable(99));
        assert!(!entry.is_servable(100));
    }
}
