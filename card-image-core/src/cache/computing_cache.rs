//! Self-populating LRU cache
//!
//! [`ComputingCache`] memoizes a loader function. On a miss exactly one caller runs the
//! loader for a given key while every other caller asking for that key waits for its
//! result; different keys load in parallel. A loader answer of `None` ("nothing to
//! show") is cached like any other value, loader errors are handed to every waiting
//! caller but never cached.
//!
//! Memory is bounded by entry count and/or total weight. When a limit is hit, the least
//! recently used entries are dropped; a dropped entry is simply loaded again on its next
//! request.

use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use time::OffsetDateTime;
use tracing::{debug, info};

/// Weight charged for a cached absence (key and bookkeeping only)
const ABSENT_ENTRY_WEIGHT: u64 = 64;

/// Approximate in-memory size of a cached value
pub trait CacheWeight {
    fn weight_bytes(&self) -> u64;
}

impl CacheWeight for String {
    fn weight_bytes(&self) -> u64 {
        self.len() as u64
    }
}

/// A cached loader result with access tracking for LRU eviction
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// `None` records that the loader found nothing for the key
    pub value: Option<V>,
    pub created_at: OffsetDateTime,
    pub last_accessed: OffsetDateTime,
    weight: u64,
    /// Monotonic access tick; orders entries for eviction even when timestamps tie
    last_used: u64,
}

impl<V: CacheWeight> CacheEntry<V> {
    fn new(value: Option<V>, tick: u64) -> Self {
        let now = OffsetDateTime::now_utc();
        let weight = value
            .as_ref()
            .map_or(ABSENT_ENTRY_WEIGHT, |v| v.weight_bytes().max(1));
        Self {
            value,
            created_at: now,
            last_accessed: now,
            weight,
            last_used: tick,
        }
    }
}

impl<V> CacheEntry<V> {
    fn touch(&mut self, tick: u64) {
        self.last_accessed = OffsetDateTime::now_utc();
        self.last_used = tick;
    }

    pub fn weight(&self) -> u64 {
        self.weight
    }
}

/// Configuration for cache limits
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries (None = unlimited)
    pub max_entries: Option<usize>,
    /// Maximum total weight in bytes (None = unlimited)
    pub max_size_bytes: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: None,
            max_size_bytes: Some(256 * 1024 * 1024),
        }
    }
}

/// Result slot shared by every caller waiting on one computation
struct InFlight<V, E> {
    state: Mutex<FlightState<V, E>>,
    cv: Condvar,
}

enum FlightState<V, E> {
    Running,
    Done(Result<Option<V>, E>),
    /// The computing caller unwound before publishing a result
    Abandoned,
}

impl<V: Clone, E: Clone> InFlight<V, E> {
    fn new() -> Self {
        Self {
            state: Mutex::new(FlightState::Running),
            cv: Condvar::new(),
        }
    }

    fn publish(&self, state: FlightState<V, E>) {
        let mut slot = lock(&self.state);
        *slot = state;
        self.cv.notify_all();
    }

    /// Block until the computation ends. `None` if it was abandoned.
    fn wait(&self) -> Option<Result<Option<V>, E>> {
        let mut state = lock(&self.state);
        loop {
            match &*state {
                FlightState::Running => {
                    state = self.cv.wait(state).unwrap_or_else(PoisonError::into_inner);
                }
                FlightState::Done(result) => return Some(result.clone()),
                FlightState::Abandoned => return None,
            }
        }
    }
}

type Loader<K, V, E> = Box<dyn Fn(&K) -> Result<Option<V>, E> + Send + Sync>;

pub struct ComputingCache<K, V, E = Infallible> {
    name: &'static str,
    entries: Mutex<HashMap<K, CacheEntry<V>>>,
    in_flight: Mutex<HashMap<K, Arc<InFlight<V, E>>>>,
    loader: Loader<K, V, E>,
    config: CacheConfig,
    tick: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    computations: AtomicU64,
}

impl<K, V, E> fmt::Debug for ComputingCache<K, V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputingCache")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("computations", &self.computations.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl<K, V, E> ComputingCache<K, V, E>
where
    K: Hash + Eq + Clone + fmt::Display,
    V: Clone + CacheWeight,
    E: Clone,
{
    /// Create a cache that fills itself with `loader`. `name` is used for logging.
    pub fn new<F>(name: &'static str, config: CacheConfig, loader: F) -> Self
    where
        F: Fn(&K) -> Result<Option<V>, E> + Send + Sync + 'static,
    {
        Self {
            name,
            entries: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            loader: Box::new(loader),
            config,
            tick: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            computations: AtomicU64::new(0),
        }
    }

    /// Get the value for `key`, computing it on a miss.
    ///
    /// Blocks while another caller computes the same key and then returns that caller's
    /// result. `Ok(None)` is a cached absence.
    pub fn get(&self, key: &K) -> Result<Option<V>, E> {
        if let Some(value) = self.lookup(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(cache = %self.name, key = %key, "Cache HIT");
            return Ok(value);
        }

        loop {
            let (flight, is_owner) = self.join_in_flight(key);
            if !is_owner {
                debug!(cache = %self.name, key = %key, "Waiting for in-flight computation");
                match flight.wait() {
                    Some(result) => return result,
                    // the computing caller panicked; take over
                    None => continue,
                }
            }

            let mut guard = FlightGuard {
                cache: self,
                key,
                flight: &flight,
                finished: false,
            };

            // an earlier owner may have published between our lookup and joining
            if let Some(value) = self.lookup(key) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                guard.finish(Ok(value.clone()));
                return Ok(value);
            }

            self.misses.fetch_add(1, Ordering::Relaxed);
            self.computations.fetch_add(1, Ordering::Relaxed);
            debug!(cache = %self.name, key = %key, "Cache MISS, computing");

            let result = (self.loader)(key);
            if let Ok(value) = &result {
                self.insert(key.clone(), value.clone());
            }
            guard.finish(result.clone());
            return result;
        }
    }

    /// Get the value only if it is already cached. Never computes and never waits for an
    /// in-flight computation.
    pub fn try_get(&self, key: &K) -> Option<V> {
        self.lookup(key).flatten()
    }

    /// Check if a result (value or absence) is cached for `key`
    pub fn contains(&self, key: &K) -> bool {
        lock(&self.entries).contains_key(key)
    }

    /// Get the number of cached results
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }

    /// Total weight of the cached results in bytes
    pub fn size_bytes(&self) -> u64 {
        lock(&self.entries).values().map(|entry| entry.weight).sum()
    }

    /// Number of times the loader has run
    pub fn computations(&self) -> u64 {
        self.computations.load(Ordering::Relaxed)
    }

    /// Force evict a specific entry
    pub fn evict(&self, key: &K) -> bool {
        let removed = lock(&self.entries).remove(key).is_some();
        if removed {
            debug!(cache = %self.name, key = %key, "Force evicted cache entry");
        }
        removed
    }

    /// Clear all entries from the cache
    pub fn clear(&self) {
        lock(&self.entries).clear();
        info!(cache = %self.name, "Cleared all cache entries");
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let entries = lock(&self.entries);
        CacheStats {
            entry_count: entries.len(),
            absent_count: entries.values().filter(|entry| entry.value.is_none()).count(),
            size_bytes: entries.values().map(|entry| entry.weight).sum(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            computations: self.computations.load(Ordering::Relaxed),
            oldest_entry: entries.values().map(|entry| entry.created_at).min(),
            most_recent_access: entries.values().map(|entry| entry.last_accessed).max(),
        }
    }

    /// Look up a cached result, refreshing its access time.
    /// Outer `None` = not cached, `Some(None)` = cached absence.
    fn lookup(&self, key: &K) -> Option<Option<V>> {
        let tick = self.next_tick();
        let mut entries = lock(&self.entries);
        let entry = entries.get_mut(key)?;
        entry.touch(tick);
        Some(entry.value.clone())
    }

    fn insert(&self, key: K, value: Option<V>) {
        let entry = CacheEntry::new(value, self.next_tick());
        let mut entries = lock(&self.entries);
        self.ensure_space_for_new_entry(&mut entries, &key, entry.weight);
        entries.insert(key, entry);

        debug!(cache = %self.name, entries = entries.len(), "Inserted cache entry");
    }

    fn next_tick(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::Relaxed)
    }

    fn join_in_flight(&self, key: &K) -> (Arc<InFlight<V, E>>, bool) {
        let mut map = lock(&self.in_flight);
        if let Some(existing) = map.get(key) {
            return (Arc::clone(existing), false);
        }

        let flight = Arc::new(InFlight::new());
        map.insert(key.clone(), Arc::clone(&flight));
        (flight, true)
    }

    fn finish_in_flight(&self, key: &K, flight: &InFlight<V, E>, state: FlightState<V, E>) {
        flight.publish(state);
        lock(&self.in_flight).remove(key);
    }

    /// Ensure there's space for a new entry, evicting old ones if necessary
    fn ensure_space_for_new_entry(&self, entries: &mut HashMap<K, CacheEntry<V>>, new_key: &K, new_weight: u64) {
        // a replaced entry frees its own slot and weight
        let replaced_weight = entries.get(new_key).map_or(0, |entry| entry.weight);
        let replacing = replaced_weight > 0;

        let mut min_count = 0;
        if let Some(max_entries) = self.config.max_entries {
            if !replacing && entries.len() >= max_entries {
                min_count = entries.len() + 1 - max_entries;
            }
        }

        let mut min_size = 0u64;
        if let Some(max_size) = self.config.max_size_bytes {
            let current_size: u64 = entries.values().map(|entry| entry.weight).sum::<u64>() - replaced_weight;
            if current_size + new_weight > max_size {
                min_size = current_size + new_weight - max_size;
            }
        }

        if min_count > 0 || min_size > 0 {
            self.evict_lru_entries(entries, new_key, min_count, min_size);
        }
    }

    /// Evict least recently used entries until both targets are met
    fn evict_lru_entries(
        &self,
        entries: &mut HashMap<K, CacheEntry<V>>,
        protected: &K,
        min_count: usize,
        min_size: u64,
    ) {
        let mut entries_by_access: Vec<_> = entries
            .iter()
            .filter(|(key, _)| *key != protected)
            .map(|(key, entry)| (key.clone(), entry.last_used, entry.weight))
            .collect();
        entries_by_access.sort_by_key(|(_, last_used, _)| *last_used);

        let mut evicted_count = 0;
        let mut size_freed = 0u64;
        for (key, _, weight) in entries_by_access {
            if evicted_count >= min_count && size_freed >= min_size {
                break;
            }
            entries.remove(&key);
            evicted_count += 1;
            size_freed += weight;
        }

        if evicted_count > 0 {
            info!(
                cache = %self.name,
                evicted_count = evicted_count,
                size_freed_kb = size_freed / 1024,
                "Evicted LRU entries"
            );
        }
    }
}

/// Publishes the flight result exactly once, marking it abandoned if the loader unwinds
struct FlightGuard<'a, K, V, E>
where
    K: Hash + Eq + Clone + fmt::Display,
    V: Clone + CacheWeight,
    E: Clone,
{
    cache: &'a ComputingCache<K, V, E>,
    key: &'a K,
    flight: &'a InFlight<V, E>,
    finished: bool,
}

impl<K, V, E> FlightGuard<'_, K, V, E>
where
    K: Hash + Eq + Clone + fmt::Display,
    V: Clone + CacheWeight,
    E: Clone,
{
    fn finish(&mut self, result: Result<Option<V>, E>) {
        self.finished = true;
        self.cache
            .finish_in_flight(self.key, self.flight, FlightState::Done(result));
    }
}

impl<K, V, E> Drop for FlightGuard<'_, K, V, E>
where
    K: Hash + Eq + Clone + fmt::Display,
    V: Clone + CacheWeight,
    E: Clone,
{
    fn drop(&mut self) {
        if !self.finished {
            self.cache
                .finish_in_flight(self.key, self.flight, FlightState::Abandoned);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cache statistics for monitoring and debugging
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub entry_count: usize,
    /// Entries recording that no image exists
    pub absent_count: usize,
    pub size_bytes: u64,
    pub hits: u64,
    pub misses: u64,
    pub computations: u64,
    pub oldest_entry: Option<OffsetDateTime>,
    pub most_recent_access: Option<OffsetDateTime>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upper_cache(config: CacheConfig) -> ComputingCache<String, String> {
        ComputingCache::new("test", config, |key: &String| {
            if key.is_empty() {
                Ok(None)
            } else {
                Ok(Some(key.to_uppercase()))
            }
        })
    }

    #[test]
    fn test_basic_cache_operations() {
        let cache = upper_cache(CacheConfig::default());

        // Initially empty
        assert!(cache.is_empty());
        assert_eq!(cache.try_get(&"key1".to_string()), None);

        let Ok(value) = cache.get(&"key1".to_string());
        assert_eq!(value, Some("KEY1".to_string()));
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&"key1".to_string()));
        assert_eq!(cache.try_get(&"key1".to_string()), Some("KEY1".to_string()));

        let Ok(_) = cache.get(&"key1".to_string());
        assert_eq!(cache.computations(), 1);
    }

    #[test]
    fn test_absence_is_cached() {
        let cache = upper_cache(CacheConfig::default());

        let Ok(first) = cache.get(&String::new());
        let Ok(second) = cache.get(&String::new());
        assert_eq!(first, None);
        assert_eq!(second, None);
        assert_eq!(cache.computations(), 1);
        assert!(cache.contains(&String::new()));
        assert_eq!(cache.try_get(&String::new()), None);
        assert_eq!(cache.stats().absent_count, 1);
    }

    #[test]
    fn test_errors_are_not_cached() {
        let cache: ComputingCache<String, String, String> =
            ComputingCache::new("failing", CacheConfig::default(), |key: &String| {
                Err(format!("bad key {}", key))
            });

        assert_eq!(cache.get(&"x".to_string()), Err("bad key x".to_string()));
        assert_eq!(cache.get(&"x".to_string()), Err("bad key x".to_string()));
        assert!(!cache.contains(&"x".to_string()));
        assert_eq!(cache.computations(), 2);
    }

    #[test]
    fn test_evict_and_clear() {
        let cache = upper_cache(CacheConfig::default());
        let Ok(_) = cache.get(&"a".to_string());
        let Ok(_) = cache.get(&"b".to_string());

        assert!(cache.evict(&"a".to_string()));
        assert!(!cache.evict(&"a".to_string()));
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());

        // evicted entries are simply computed again
        let Ok(value) = cache.get(&"a".to_string());
        assert_eq!(value, Some("A".to_string()));
        assert_eq!(cache.computations(), 3);
    }

    #[test]
    fn test_cache_stats() {
        let cache = upper_cache(CacheConfig::default());
        let Ok(_) = cache.get(&"key1".to_string());
        let Ok(_) = cache.get(&"key1".to_string());

        let stats = cache.stats();
        assert_eq!(stats.entry_count, 1);
        assert_eq!(stats.size_bytes, 4);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!(stats.oldest_entry.is_some());
        assert!(stats.most_recent_access.is_some());
    }
}
