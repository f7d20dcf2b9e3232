//! Keyed mutual exclusion
//!
//! Blocks callers that hold the same key while letting distinct keys
//! proceed in parallel. Keys are dropped from the set as soon as they are
//! released, so the set never grows with the number of keys ever used.

use parking_lot::{Condvar, Mutex};
use std::collections::HashSet;
use std::hash::Hash;

/// Set of currently held keys
pub struct KeyedLocks<K> {
    held: Mutex<HashSet<K>>,
    released: Condvar,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            held: Mutex::new(HashSet::new()),
            released: Condvar::new(),
        }
    }
}

impl<K: Clone + Eq + Hash> KeyedLocks<K> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until `key` is free, then hold it until the guard drops
    pub fn lock(&self, key: K) -> KeyGuard<'_, K> {
        let mut held = self.held.lock();
        while held.contains(&key) {
            self.released.wait(&mut held);
        }
        held.insert(key.clone());
        KeyGuard { locks: self, key }
    }

    /// Number of keys currently held
    pub fn held_count(&self) -> usize {
        self.held.lock().len()
    }
}

/// Releases its key on drop
#[must_use = "the key is released as soon as the guard is dropped"]
pub struct KeyGuard<'a, K: Eq + Hash> {
    locks: &'a KeyedLocks<K>,
    key: K,
}

impl<K: Eq + Hash> Drop for KeyGuard<'_, K> {
    fn drop(&mut self) {
        self.locks.held.lock().remove(&self.key);
        self.locks.released.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_guard_releases_key() {
        let locks = KeyedLocks::new();
        {
            let _guard = locks.lock("a");
            assert_eq!(locks.held_count(), 1);
        }
        assert_eq!(locks.held_count(), 0);
    }

    #[test]
    fn test_distinct_keys_do_not_block() {
        let locks = KeyedLocks::new();
        let _a = locks.lock("a");
        let _b = locks.lock("b");
        assert_eq!(locks.held_count(), 2);
    }

    #[test]
    fn test_same_key_is_exclusive() {
        let locks = KeyedLocks::new();
        let inside = AtomicBool::new(false);
        let overlaps = AtomicUsize::new(0);

        thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..10 {
                        let _guard = locks.lock("hello".to_string());
                        if inside.swap(true, Ordering::SeqCst) {
                            overlaps.fetch_add(1, Ordering::SeqCst);
                        }
                        thread::sleep(Duration::from_millis(1));
                        inside.store(false, Ordering::SeqCst);
                    }
                });
            }
        });

        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
        assert_eq!(locks.held_count(), 0);
    }
}
