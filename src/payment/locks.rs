//! Per-reference advisory locks.
//!
//! Two confirmations of the same invoice reference must not interleave
//! between reading the latest payment and writing it back. Each reference
//! maps to an async mutex held for the whole confirmation; confirmations of
//! different references never contend.
//!
//! The map is LRU-ordered and bounded: once it grows past its capacity, the
//! least recently used entries that nobody holds or waits on are dropped. An
//! entry in use is never dropped, so the bound is soft under heavy load.

use lru::LruCache;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

/// Default number of idle locks kept.
const DEFAULT_LOCK_CAPACITY: usize = 1024;

/// Guard held for the duration of a confirmation.
pub type ReferenceGuard = OwnedMutexGuard<()>;

/// Lock statistics for monitoring.
#[derive(Debug, Default, Clone)]
pub struct LockStats {
    /// Number of locks handed out.
    pub acquisitions: u64,
    /// Number of acquisitions that had to wait for another holder.
    pub contended: u64,
    /// Number of idle entries dropped to respect the capacity.
    pub pruned: u64,
}

/// Async mutexes keyed by invoice reference.
#[derive(Clone)]
pub struct ReferenceLocks {
    inner: Arc<Mutex<LruCache<String, Arc<AsyncMutex<()>>>>>,
    stats: Arc<Mutex<LockStats>>,
    capacity: usize,
}

impl ReferenceLocks {
    /// Create a lock map with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_LOCK_CAPACITY)
    }

    /// Create a lock map keeping at most `capacity` idle entries.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LruCache::unbounded())),
            stats: Arc::new(Mutex::new(LockStats::default())),
            capacity: capacity.max(1),
        }
    }

    /// Wait for exclusive access to `reference`.
    pub async fn acquire(&self, reference: &str) -> ReferenceGuard {
        let lock = self.lock_for(reference);
        let guard = match Arc::clone(&lock).try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                debug!("Waiting for in-flight confirmation of {}", reference);
                self.stats.lock().contended += 1;
                lock.lock_owned().await
            }
        };
        self.stats.lock().acquisitions += 1;
        guard
    }

    fn lock_for(&self, reference: &str) -> Arc<AsyncMutex<()>> {
        let mut map = self.inner.lock();
        let lock = if let Some(lock) = map.get(reference) {
            Arc::clone(lock)
        } else {
            let lock = Arc::new(AsyncMutex::new(()));
            map.put(reference.to_string(), Arc::clone(&lock));
            lock
        };

        let excess = map.len().saturating_sub(self.capacity);
        if excess > 0 {
            // Only the map holds an idle entry.
            let idle: Vec<String> = map
                .iter()
                .rev()
                .filter(|(_, entry)| Arc::strong_count(entry) == 1)
                .map(|(key, _)| key.clone())
                .take(excess)
                .collect();
            for key in &idle {
                map.pop(key);
            }
            self.stats.lock().pruned += idle.len() as u64;
        }
        lock
    }

    /// Get current lock statistics.
    #[must_use]
    pub fn stats(&self) -> LockStats {
        self.stats.lock().clone()
    }

    /// Number of references currently tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Check if no reference is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl Default for ReferenceLocks {
    fn default() -> Self {
        Self::new()
    }
}
