//! Size- and age-bounded resolve cache.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::error::Result;

#[derive(Debug)]
struct Entry<V> {
    value: V,
    inserted: Instant,
    last_used: u64,
}

#[derive(Debug)]
struct CacheState<K, V> {
    entries: HashMap<K, Entry<V>>,
    clock: u64,
}

/// LRU map whose entries also expire `ttl` after insertion.
///
/// Concurrent misses on the same key may each populate it; the last
/// writer wins.
#[derive(Debug)]
pub struct ResolveCache<K, V> {
    capacity: usize,
    ttl: Duration,
    state: Mutex<CacheState<K, V>>,
}

impl<K: Eq + Hash + Clone, V: Clone> ResolveCache<K, V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity,
            ttl,
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                clock: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState<K, V>> {
        // Entries are plain values, so a panic while holding the lock
        // cannot leave one half-written.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Fresh cached value for `key`, marking it recently used.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut state = self.lock();
        state.clock += 1;
        let clock = state.clock;
        let ttl = self.ttl;
        let expired = match state.entries.get_mut(key) {
            Some(entry) if entry.inserted.elapsed() < ttl => {
                entry.last_used = clock;
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            state.entries.remove(key);
        }
        None
    }

    pub fn insert(&self, key: K, value: V) {
        if self.capacity == 0 {
            return;
        }
        let mut state = self.lock();
        state.clock += 1;
        let clock = state.clock;
        if !state.entries.contains_key(&key) && state.entries.len() >= self.capacity {
            let ttl = self.ttl;
            state.entries.retain(|_, e| e.inserted.elapsed() < ttl);
            if state.entries.len() >= self.capacity {
                let oldest = state
                    .entries
                    .iter()
                    .min_by_key(|(_, e)| e.last_used)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    state.entries.remove(&oldest);
                }
            }
        }
        state.entries.insert(
            key,
            Entry {
                value,
                inserted: Instant::now(),
                last_used: clock,
            },
        );
    }

    /// Return the cached value or populate it with `load`.
    ///
    /// Failures are not cached.
    pub fn get_or_try_insert_with<F>(&self, key: K, load: F) -> Result<V>
    where
        F: FnOnce() -> Result<V>,
    {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }
        let value = load()?;
        self.insert(key, value.clone());
        Ok(value)
    }

    pub fn invalidate(&self, key: &K) {
        self.lock().entries.remove(key);
    }

    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
