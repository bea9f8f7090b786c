use crate::response::{CacheStats, CachedResponse};
use crate::sharded::ShardedStore;
use parking_lot::RwLock;
use std::sync::Arc;

/// A single named cache store: request key → response snapshot.
pub struct CacheStore {
    name: String,
    entries: ShardedStore,
}

impl CacheStore {
    fn new(name: String) -> Self {
        Self {
            name,
            entries: ShardedStore::new(),
        }
    }

    /// A store that belongs to no [`CacheStorage`]. It starts empty and
    /// whatever is written to it is dropped along with it.
    pub fn detached(name: &str) -> Self {
        Self::new(name.to_string())
    }

    /// Look up the snapshot stored for an exact request key.
    pub fn match_request(&self, key: &str) -> Option<Arc<CachedResponse>> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains(key)
    }

    pub fn put(&self, key: String, response: CachedResponse) {
        self.entries.insert(key, response);
    }

    /// Store a batch of entries. The caller resolves every response before
    /// calling, so a failed batch never reaches the store.
    pub fn put_all(&self, batch: Vec<(String, CachedResponse)>) {
        for (key, response) in batch {
            self.entries.insert(key, response);
        }
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.entries.stats()
    }
}

/// The set of named cache stores owned by the agent.
///
/// Store names are kept in creation order, which is the order `keys()`
/// reports them in.
#[derive(Default)]
pub struct CacheStorage {
    stores: RwLock<Vec<Arc<CacheStore>>>,
}

impl CacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the store called `name`, creating it if it does not exist.
    pub fn open(&self, name: &str) -> Arc<CacheStore> {
        if let Some(store) = self.get(name) {
            return store;
        }

        let mut stores = self.stores.write();
        // Re-check under the write lock: another task may have created it.
        if let Some(store) = stores.iter().find(|s| s.name == name) {
            return Arc::clone(store);
        }
        let store = Arc::new(CacheStore::new(name.to_string()));
        stores.push(Arc::clone(&store));
        tracing::debug!(cache = %name, "cache store created");
        store
    }

    /// Get an existing store without creating it.
    pub fn get(&self, name: &str) -> Option<Arc<CacheStore>> {
        self.stores
            .read()
            .iter()
            .find(|s| s.name == name)
            .map(Arc::clone)
    }

    /// Delete the store called `name`. Returns whether it existed.
    pub fn delete(&self, name: &str) -> bool {
        let mut stores = self.stores.write();
        let before = stores.len();
        stores.retain(|s| s.name != name);
        stores.len() != before
    }

    /// Names of all stores, in creation order.
    pub fn keys(&self) -> Vec<String> {
        self.stores.read().iter().map(|s| s.name.clone()).collect()
    }
}
