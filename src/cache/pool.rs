use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{PurgeError, Result};

/// Byte-budgeted pool for buffers owned by purge criteria.
#[derive(Debug)]
pub struct MemoryPool {
    capacity: usize,
    used: AtomicUsize,
}

impl MemoryPool {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            capacity,
            used: AtomicUsize::new(0),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn used(&self) -> usize {
        self.used.load(Ordering::Acquire)
    }

    /// Reserves `bytes.len()` bytes and copies `bytes` into the new buffer.
    /// The reservation is returned to the pool when the buffer is dropped.
    pub fn alloc_copy(self: &Arc<Self>, bytes: &[u8]) -> Result<PoolBuffer> {
        let requested = bytes.len();
        let mut used = self.used.load(Ordering::Acquire);
        loop {
            let available = self.capacity.saturating_sub(used);
            if requested > available {
                return Err(PurgeError::ResourceExhausted {
                    requested,
                    available,
                });
            }
            match self.used.compare_exchange_weak(
                used,
                used + requested,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => used = actual,
            }
        }

        Ok(PoolBuffer {
            pool: Arc::clone(self),
            bytes: bytes.into(),
        })
    }

    fn release(&self, bytes: usize) {
        self.used.fetch_sub(bytes, Ordering::AcqRel);
    }
}

/// Buffer carved out of a [`MemoryPool`]; freed exactly once, on drop.
pub struct PoolBuffer {
    pool: Arc<MemoryPool>,
    bytes: Box<[u8]>,
}

impl Deref for PoolBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.bytes
    }
}

impl std::fmt::Debug for PoolBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PoolBuffer")
            .field(&String::from_utf8_lossy(&self.bytes))
            .finish()
    }
}

impl Drop for PoolBuffer {
    fn drop(&mut self) {
        self.pool.release(self.bytes.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffers_return_their_bytes_on_drop() {
        let pool = MemoryPool::new(8);
        let a = pool.alloc_copy(b"abcd").unwrap();
        let b = pool.alloc_copy(b"efgh").unwrap();
        assert_eq!(pool.used(), 8);
        assert_eq!(&*a, b"abcd");

        drop(a);
        assert_eq!(pool.used(), 4);
        drop(b);
        assert_eq!(pool.used(), 0);
    }

    #[test]
    fn alloc_past_capacity_is_resource_exhausted() {
        let pool = MemoryPool::new(3);
        let err = pool.alloc_copy(b"abcd").unwrap_err();
        assert!(matches!(
            err,
            PurgeError::ResourceExhausted {
                requested: 4,
                available: 3
            }
        ));
        assert_eq!(pool.used(), 0);
    }
}
