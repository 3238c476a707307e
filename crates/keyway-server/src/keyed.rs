//! Per-key mutual exclusion within one process.

use std::{
    collections::HashMap,
    hash::Hash,
    ops::Deref,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

/// A mutex per key, created on first use and dropped with its last handle.
///
/// Guards protect no data of their own; they only order critical sections
/// that share a key. A poisoned slot is recovered since there is no state to
/// corrupt.
#[derive(Debug)]
pub struct KeyedLocks<K> {
    slots: Mutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K: Hash + Eq + Clone> KeyedLocks<K> {
    /// No keys yet.
    pub fn new() -> Self {
        Self { slots: Mutex::new(HashMap::new()) }
    }

    /// Mutex for `key`.
    ///
    /// Lock the returned handle with [`hold`] for the duration of the
    /// critical section. The entry lives as long as some handle does.
    pub fn slot(&self, key: &K) -> Slot<'_, K> {
        let mutex = Arc::clone(self.map().entry(key.clone()).or_default());
        Slot { owner: self, key: key.clone(), mutex }
    }

    /// Keys with a live handle.
    pub fn len(&self) -> usize {
        self.map().len()
    }

    /// True when no handle is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn map(&self) -> MutexGuard<'_, HashMap<K, Arc<Mutex<()>>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K: Hash + Eq + Clone> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle on one key's mutex.
#[derive(Debug)]
pub struct Slot<'a, K: Hash + Eq + Clone> {
    owner: &'a KeyedLocks<K>,
    key: K,
    mutex: Arc<Mutex<()>>,
}

impl<K: Hash + Eq + Clone> Deref for Slot<'_, K> {
    type Target = Mutex<()>;

    fn deref(&self) -> &Mutex<()> {
        &self.mutex
    }
}

impl<K: Hash + Eq + Clone> Drop for Slot<'_, K> {
    fn drop(&mut self) {
        // Handles are cloned and released only under the map lock, so the
        // count is exact
        let mut slots = self.owner.map();
        let mutex = std::mem::take(&mut self.mutex);
        if Arc::strong_count(&mutex) == 2 {
            slots.remove(&self.key);
        }
        drop(mutex);
    }
}

/// Lock a slot, recovering from poison.
pub fn hold(slot: &Mutex<()>) -> MutexGuard<'_, ()> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}
