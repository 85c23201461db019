//! In-memory TTL + LRU cache for normalized quote series.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::clock::{Clock, SystemClock};
use crate::{FetchKey, QuoteResult};

/// Capacity and TTL of a [`QuoteCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of entries. Zero disables caching.
    pub capacity: usize,
    /// TTL applied by the dispatch pool to fresh results.
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 500,
            ttl: Duration::from_secs(300),
        }
    }
}

/// Immutable cached result with its insertion time and TTL.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    result: Arc<QuoteResult>,
    inserted_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    pub fn result(&self) -> &Arc<QuoteResult> {
        &self.result
    }

    pub fn inserted_at(&self) -> Instant {
        self.inserted_at
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// An entry is expired once `now - inserted_at >= ttl`.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.inserted_at) >= self.ttl
    }
}

#[derive(Debug)]
struct Slot {
    entry: Arc<CacheEntry>,
    stamp: u64,
}

/// Map plus recency index. `recency` maps a monotonically increasing stamp to
/// its key, so the first element is always the least recently used entry.
#[derive(Debug, Default)]
struct LruInner {
    map: HashMap<FetchKey, Slot>,
    recency: BTreeMap<u64, FetchKey>,
    next_stamp: u64,
}

impl LruInner {
    fn stamp(&mut self) -> u64 {
        let stamp = self.next_stamp;
        self.next_stamp += 1;
        stamp
    }

    fn touch(&mut self, key: &FetchKey) {
        let stamp = self.stamp();
        if let Some(slot) = self.map.get_mut(key) {
            self.recency.remove(&slot.stamp);
            slot.stamp = stamp;
            self.recency.insert(stamp, key.clone());
        }
    }

    fn evict_lru(&mut self) -> Option<FetchKey> {
        let (_, key) = self.recency.pop_first()?;
        self.map.remove(&key);
        Some(key)
    }

    fn remove(&mut self, key: &FetchKey) {
        if let Some(slot) = self.map.remove(key) {
            self.recency.remove(&slot.stamp);
        }
    }
}

/// Thread-safe quote cache with lazy TTL expiry and LRU eviction.
///
/// Recency is updated by both [`get`](Self::get) and [`put`](Self::put), so
/// lookups also mutate shared state; everything sits behind one mutex and no
/// caller ever sees a half-written entry.
#[derive(Debug)]
pub struct QuoteCache {
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    inner: Mutex<LruInner>,
}

impl Default for QuoteCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl QuoteCache {
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            inner: Mutex::new(LruInner::default()),
        }
    }

    /// Create a disabled cache: every `put` is dropped.
    pub fn disabled() -> Self {
        Self::new(CacheConfig {
            capacity: 0,
            ..CacheConfig::default()
        })
    }

    /// Returns the entry for `key` if present and not expired.
    ///
    /// A stale entry is reported as absent but left in place; it is replaced
    /// by the next `put` or dropped by [`purge_expired`](Self::purge_expired)
    /// or eviction.
    pub fn get(&self, key: &FetchKey) -> Option<Arc<CacheEntry>> {
        let now = self.clock.now();
        let mut inner = self.lock();

        let entry = inner.map.get(key).map(|slot| Arc::clone(&slot.entry))?;
        if entry.is_expired_at(now) {
            tracing::debug!(key = %key, "cache entry expired");
            return None;
        }

        inner.touch(key);
        Some(entry)
    }

    /// Inserts or replaces the entry for `key`.
    ///
    /// When inserting a new key into a full cache, the least recently used
    /// entry is evicted first. Replacing an existing key never evicts.
    pub fn put(&self, key: FetchKey, result: Arc<QuoteResult>, ttl: Duration) {
        if self.config.capacity == 0 {
            return;
        }

        let entry = Arc::new(CacheEntry {
            result,
            inserted_at: self.clock.now(),
            ttl,
        });

        let mut inner = self.lock();
        if inner.map.contains_key(&key) {
            inner.remove(&key);
        } else {
            while inner.map.len() >= self.config.capacity {
                match inner.evict_lru() {
                    Some(evicted) => tracing::debug!(key = %evicted, "evicted least recently used entry"),
                    None => break,
                }
            }
        }

        let stamp = inner.stamp();
        inner.recency.insert(stamp, key.clone());
        inner.map.insert(key, Slot { entry, stamp });
    }

    /// Remove expired entries.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut inner = self.lock();

        let expired: Vec<FetchKey> = inner
            .map
            .iter()
            .filter(|(_, slot)| slot.entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            inner.remove(key);
        }
        expired.len()
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.map.clear();
        inner.recency.clear();
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    pub fn default_ttl(&self) -> Duration {
        self.config.ttl
    }

    pub fn is_disabled(&self) -> bool {
        self.config.capacity == 0
    }

    // Every critical section leaves the map and recency index in agreement,
    // so a poisoned lock still guards consistent data.
    fn lock(&self) -> MutexGuard<'_, LruInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
