use crate::response::{CacheStats, CachedResponse};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Number of shards. Must be a power of two for fast modulo via bitmask.
const NUM_SHARDS: usize = 64;
const SHARD_MASK: u64 = (NUM_SHARDS as u64) - 1;

type Shard = RwLock<HashMap<String, Arc<CachedResponse>>>;

/// Thread-safe sharded key-value store for response snapshots.
///
/// Keys are spread across 64 independent shards, each behind its own
/// `RwLock`, so concurrent requests for different keys rarely contend.
/// Lookups take a read lock on one shard; inserts take a write lock on one
/// shard. A single insert is atomic: readers see either the old or the new
/// snapshot, never a partial one.
///
/// The store is unbounded. Entries are never expired or evicted; the whole
/// store is dropped when its cache version is retired.
pub struct ShardedStore {
    shards: Box<[Shard; NUM_SHARDS]>,
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
}

impl ShardedStore {
    pub fn new() -> Self {
        let shards: Vec<Shard> = (0..NUM_SHARDS)
            .map(|_| RwLock::new(HashMap::new()))
            .collect();

        let shards: Box<[Shard; NUM_SHARDS]> = shards
            .into_boxed_slice()
            .try_into()
            .unwrap_or_else(|_| unreachable!());

        Self {
            shards,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            inserts: AtomicU64::new(0),
        }
    }

    #[inline]
    fn shard_index(key: &str) -> usize {
        let hash = ahash::RandomState::with_seeds(1, 2, 3, 4).hash_one(key);
        (hash & SHARD_MASK) as usize
    }

    pub fn get(&self, key: &str) -> Option<Arc<CachedResponse>> {
        let idx = Self::shard_index(key);
        let found = self.shards[idx].read().get(key).cloned();
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    /// Membership test that does not count as a hit or miss.
    pub fn contains(&self, key: &str) -> bool {
        let idx = Self::shard_index(key);
        self.shards[idx].read().contains_key(key)
    }

    /// Insert or replace the snapshot stored under `key`.
    pub fn insert(&self, key: String, value: CachedResponse) {
        let idx = Self::shard_index(&key);
        self.shards[idx].write().insert(key, Arc::new(value));
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.read().is_empty())
    }

    /// All keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .shards
            .iter()
            .flat_map(|s| s.read().keys().cloned().collect::<Vec<_>>())
            .collect();
        keys.sort();
        keys
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            current_size: self.len(),
        }
    }
}

impl Default for ShardedStore {
    fn default() -> Self {
        Self::new()
    }
}
