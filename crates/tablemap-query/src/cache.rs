//! Statement caching for rendered SQL.
//!
//! Rendering is deterministic per type and operation, so the engine renders
//! each statement shape once and shares it. Entries are insert-once: when
//! two callers race on a miss, the first insertion wins and both get the
//! same shared value.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug)]
struct CachedStatement<V> {
    value: Arc<V>,
    /// Access sequence number of the last hit
    last_used: u64,
    hit_count: u64,
}

#[derive(Debug)]
struct CacheState<K, V> {
    entries: HashMap<K, CachedStatement<V>>,
    clock: u64,
}

/// LRU-style cache of rendered statements shared across threads.
///
/// When the cache exceeds `max_size`, the least-recently-used entry is
/// evicted. A `max_size` of zero disables caching.
///
/// # Example
///
/// ```
/// use tablemap_query::cache::StatementCache;
///
/// let cache: StatementCache<&str, String> = StatementCache::new(100);
/// let sql = cache
///     .get_or_try_insert("cat.select", || Ok::<_, ()>("SELECT 1".to_string()))
///     .unwrap();
/// assert_eq!(*sql, "SELECT 1");
/// assert!(cache.contains(&"cat.select"));
/// ```
#[derive(Debug)]
pub struct StatementCache<K, V> {
    state: Mutex<CacheState<K, V>>,
    max_size: usize,
}

impl<K: Eq + Hash + Clone, V> StatementCache<K, V> {
    pub fn new(max_size: usize) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::with_capacity(max_size.min(256)),
                clock: 0,
            }),
            max_size,
        }
    }

    /// Get a cached value or build and insert it.
    ///
    /// The builder runs outside the lock and only on a miss.
    pub fn get_or_try_insert<E>(
        &self,
        key: K,
        builder: impl FnOnce() -> Result<V, E>,
    ) -> Result<Arc<V>, E> {
        if let Some(hit) = self.get(&key) {
            return Ok(hit);
        }
        let value = Arc::new(builder()?);
        if self.max_size == 0 {
            return Ok(value);
        }

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.clock += 1;
        let now = state.clock;
        if !state.entries.contains_key(&key) && state.entries.len() >= self.max_size {
            evict_lru(&mut state.entries);
        }
        let entry = state.entries.entry(key).or_insert_with(|| CachedStatement {
            value,
            last_used: now,
            hit_count: 0,
        });
        Ok(Arc::clone(&entry.value))
    }

    /// Get a cached value, marking it used.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.clock += 1;
        let now = state.clock;
        let entry = state.entries.get_mut(key)?;
        entry.last_used = now;
        entry.hit_count += 1;
        Some(Arc::clone(&entry.value))
    }

    pub fn contains(&self, key: &K) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .contains_key(key)
    }

    /// Number of hits recorded for a key.
    pub fn hit_count(&self, key: &K) -> u64 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .get(key)
            .map_or(0, |e| e.hit_count)
    }

    pub fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .clear();
    }
}

fn evict_lru<K: Eq + Hash + Clone, V>(entries: &mut HashMap<K, CachedStatement<V>>) {
    if let Some(lru) = entries
        .iter()
        .min_by_key(|(_, entry)| entry.last_used)
        .map(|(key, _)| key.clone())
    {
        entries.remove(&lru);
    }
}

/// Compute a hash key for caching from any hashable value.
pub fn cache_key(value: &impl Hash) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

impl<K: Eq + Hash + Clone, V> Default for StatementCache<K, V> {
    fn default() -> Self {
        Self::new(1024)
    }
}
