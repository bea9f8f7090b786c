//! Versioned response cache storage for the offline agent.
//!
//! A [`CacheStorage`] holds any number of named [`CacheStore`]s. Each store
//! maps an exact request identity to a [`CachedResponse`] snapshot and is
//! backed by a [`ShardedStore`]. Stores are unbounded; retiring a cache
//! version means deleting its store.

pub mod response;
pub mod sharded;
pub mod storage;

pub use response::{request_key, CacheStats, CachedResponse};
pub use sharded::ShardedStore;
pub use storage::{CacheStorage, CacheStore};
