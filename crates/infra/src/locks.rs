//! Per-key lock registry with bounded acquisition.
//!
//! Serializes writers that target the same aggregate key (a material, a
//! shelf) while letting disjoint keys proceed fully in parallel. Acquisition
//! is bounded: a lock not obtained within the timeout surfaces a retryable
//! contention error instead of deadlocking.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;

/// Bounded lock acquisition failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("lock not acquired within {waited_ms} ms")]
pub struct LockTimeout {
    pub waited_ms: u64,
}

/// Registry of one mutex per key.
///
/// Lock handles are created lazily and never evicted; the key space is the
/// set of materials/shelves a tenant actually touches.
#[derive(Debug, Default)]
pub struct KeyLocks<K> {
    registry: Mutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K> KeyLocks<K>
where
    K: Clone + Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(HashMap::new()),
        }
    }

    fn handle(&self, key: &K) -> Arc<Mutex<()>> {
        let mut registry = self.registry.lock();
        registry.entry(key.clone()).or_default().clone()
    }

    /// Run `f` while holding the key's lock, waiting at most `timeout` to
    /// acquire it.
    pub fn with_lock<T>(
        &self,
        key: &K,
        timeout: Duration,
        f: impl FnOnce() -> T,
    ) -> Result<T, LockTimeout> {
        let handle = self.handle(key);
        let guard = handle.try_lock_for(timeout).ok_or(LockTimeout {
            waited_ms: timeout.as_millis() as u64,
        })?;

        let out = f();
        drop(guard);
        Ok(out)
    }
}
