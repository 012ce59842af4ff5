//! Per-key serialization for band and session state
//!
//! Reconciliation is order-sensitive, so updates for one key must apply
//! in arrival order while different keys proceed in parallel. When both
//! a band lock and a session lock are needed, the band lock is acquired
//! first.

use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// A map of lazily created per-key mutexes
#[derive(Debug)]
pub struct KeyedLocks<K: Eq + Hash + Clone> {
    locks: DashMap<K, Arc<Mutex<()>>>,
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    /// Acquire the lock for `key`, creating it on first use
    pub async fn acquire(&self, key: &K) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }
}

impl<K: Eq + Hash + Clone> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}
