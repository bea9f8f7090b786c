//! Worker lifecycle: install → activate → active.
//!
//! A browser drives these phases for a service worker. Here the agent drives
//! them itself at startup and again whenever the cache version changes.

use crate::config::CacheConfig;
use crate::network::{FetchRequest, Network, NetworkError};
use crate::router::origin_uri;
use axum::http::Uri;
use futures_util::future::try_join_all;
use offline_cache::{request_key, CacheStorage};
use serde::Serialize;
use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Installing,
    Activating,
    Active,
}

impl LifecycleState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => LifecycleState::Installing,
            1 => LifecycleState::Activating,
            _ => LifecycleState::Active,
        }
    }
}

/// Result of an install run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// Every core asset was fetched and stored.
    Installed { assets: usize },
    /// A fetch failed; nothing was stored.
    Failed { reason: String },
}

/// Current lifecycle phase, shared by the router and the admin API.
pub struct Lifecycle {
    state: AtomicU8,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(LifecycleState::Installing as u8),
        }
    }

    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Requests are intercepted only once clients have been claimed.
    pub fn is_active(&self) -> bool {
        self.state() == LifecycleState::Active
    }

    fn set(&self, state: LifecycleState) {
        let previous = self.state();
        self.state.store(state as u8, Ordering::Release);
        if previous != state {
            tracing::info!(from = ?previous, to = ?state, "lifecycle transition");
        }
    }

    /// Precache the core assets into the store named by `cache.name`.
    ///
    /// All-or-nothing: every asset is fetched before anything is stored, and
    /// one failed fetch (transport error or non-success status) aborts the
    /// batch. Failure is logged and reported, never retried. An active agent
    /// keeps serving while a new version installs alongside it.
    pub async fn install(
        &self,
        storage: &CacheStorage,
        network: &dyn Network,
        origin: &Uri,
        cache: &CacheConfig,
    ) -> InstallOutcome {
        if !self.is_active() {
            self.set(LifecycleState::Installing);
        }

        let store = storage.open(&cache.name);
        let fetches = cache.core_assets.iter().map(|asset| async move {
            let fetched = network
                .fetch(FetchRequest::get(origin_uri(origin, asset)))
                .await?;
            if !fetched.status.is_success() {
                return Err(NetworkError::Transport {
                    uri: asset.clone(),
                    reason: format!("unexpected status {}", fetched.status),
                });
            }
            Ok((request_key("GET", asset), fetched.to_snapshot()))
        });

        match try_join_all(fetches).await {
            Ok(batch) => {
                let assets = batch.len();
                store.put_all(batch);
                tracing::info!(cache = %cache.name, assets, "core assets cached");
                InstallOutcome::Installed { assets }
            }
            Err(err) => {
                tracing::error!(cache = %cache.name, error = %err, "failed to cache core assets");
                InstallOutcome::Failed {
                    reason: err.to_string(),
                }
            }
        }
    }

    /// Delete every cache store except `current`, then claim clients.
    /// Returns the names of the deleted stores.
    ///
    /// An already active agent stays `Active` throughout, so concurrent
    /// requests keep being intercepted during a version upgrade.
    pub fn activate(&self, storage: &CacheStorage, current: &str) -> Vec<String> {
        if !self.is_active() {
            self.set(LifecycleState::Activating);
        }

        let stale: Vec<String> = storage
            .keys()
            .into_iter()
            .filter(|name| name != current)
            .collect();
        for name in &stale {
            if storage.delete(name) {
                tracing::info!(cache = %name, "deleted old cache");
            }
        }

        self.set(LifecycleState::Active);
        stale
    }

    /// Install, then skip waiting and activate straight away.
    pub async fn start(
        &self,
        storage: &CacheStorage,
        network: &dyn Network,
        origin: &Uri,
        cache: &CacheConfig,
    ) -> InstallOutcome {
        let outcome = self.install(storage, network, origin, cache).await;
        self.activate(storage, &cache.name);
        outcome
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::testing::ScriptedNetwork;
    use bytes::Bytes;
    use offline_cache::CachedResponse;

    fn origin() -> Uri {
        "http://origin.test".parse().unwrap()
    }

    fn scripted_origin() -> ScriptedNetwork {
        let network = ScriptedNetwork::new();
        network
            .respond("/", 200, "<html>home</html>")
            .respond("/static/css/design-system.css", 200, "body{}")
            .respond("/static/js/app.js", 200, "app()")
            .respond("/manifest.json", 200, "{}")
            .respond("/offline", 200, "<html>offline</html>")
            .respond("/static/icons/logo-192.png", 200, "png");
        network
    }

    #[test]
    fn starts_installing() {
        let lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.state(), LifecycleState::Installing);
        assert!(!lifecycle.is_active());
    }

    #[tokio::test]
    async fn install_caches_every_core_asset() {
        let network = scripted_origin();
        let storage = CacheStorage::new();
        let lifecycle = Lifecycle::new();
        let cache = CacheConfig::default();

        let outcome = lifecycle.install(&storage, &network, &origin(), &cache).await;

        assert_eq!(outcome, InstallOutcome::Installed { assets: 6 });
        let store = storage.get("second-brain-v1").unwrap();
        for asset in &cache.core_assets {
            assert!(store.contains(&request_key("GET", asset)), "missing {asset}");
        }
        assert_eq!(lifecycle.state(), LifecycleState::Installing);
    }

    #[tokio::test]
    async fn install_failure_stores_nothing() {
        let network = scripted_origin();
        network.respond("/manifest.json", 500, "boom");
        let storage = CacheStorage::new();
        let lifecycle = Lifecycle::new();

        let outcome = lifecycle
            .install(&storage, &network, &origin(), &CacheConfig::default())
            .await;

        assert!(matches!(outcome, InstallOutcome::Failed { .. }));
        assert!(storage.get("second-brain-v1").unwrap().is_empty());
    }

    #[tokio::test]
    async fn install_offline_fails_without_retry() {
        let network = scripted_origin();
        network.set_offline(true);
        let storage = CacheStorage::new();
        let lifecycle = Lifecycle::new();

        let outcome = lifecycle
            .install(&storage, &network, &origin(), &CacheConfig::default())
            .await;

        assert!(matches!(outcome, InstallOutcome::Failed { .. }));
        assert!(network.call_count() <= 6);
    }

    #[test]
    fn activate_purges_other_versions() {
        let storage = CacheStorage::new();
        storage.open("second-brain-v0").put(
            "GET:/".into(),
            CachedResponse::new(200, vec![], Bytes::from_static(b"old")),
        );
        storage.open("unrelated");
        storage.open("second-brain-v1");
        let lifecycle = Lifecycle::new();

        let deleted = lifecycle.activate(&storage, "second-brain-v1");

        assert_eq!(deleted, vec!["second-brain-v0", "unrelated"]);
        assert_eq!(storage.keys(), vec!["second-brain-v1"]);
        assert!(lifecycle.is_active());
    }

    #[test]
    fn reactivation_never_leaves_active() {
        use std::sync::atomic::AtomicBool;

        let storage = CacheStorage::new();
        let lifecycle = Lifecycle::new();
        lifecycle.activate(&storage, "second-brain-v1");
        let done = AtomicBool::new(false);

        std::thread::scope(|s| {
            let observer = s.spawn(|| {
                let mut dropped_out = false;
                while !done.load(Ordering::Acquire) {
                    dropped_out |= !lifecycle.is_active();
                }
                dropped_out
            });

            for version in 2..500 {
                let name = format!("second-brain-v{version}");
                storage.open(&name);
                lifecycle.activate(&storage, &name);
            }
            done.store(true, Ordering::Release);

            assert!(!observer.join().unwrap());
        });
        assert_eq!(storage.keys(), vec!["second-brain-v499"]);
    }

    #[tokio::test]
    async fn start_leaves_only_current_cache_with_core_assets() {
        let network = scripted_origin();
        let storage = CacheStorage::new();
        storage.open("second-brain-v0");
        let lifecycle = Lifecycle::new();
        let cache = CacheConfig::default();

        let outcome = lifecycle.start(&storage, &network, &origin(), &cache).await;

        assert_eq!(outcome, InstallOutcome::Installed { assets: 6 });
        assert_eq!(storage.keys(), vec!["second-brain-v1"]);
        assert_eq!(storage.get("second-brain-v1").unwrap().len(), 6);
        assert_eq!(lifecycle.state(), LifecycleState::Active);
    }

    #[tokio::test]
    async fn failed_install_still_activates() {
        let network = ScriptedNetwork::new();
        network.set_offline(true);
        let storage = CacheStorage::new();
        let lifecycle = Lifecycle::new();

        let outcome = lifecycle
            .start(&storage, &network, &origin(), &CacheConfig::default())
            .await;

        assert!(matches!(outcome, InstallOutcome::Failed { .. }));
        assert!(lifecycle.is_active());
    }

    #[tokio::test]
    async fn reinstall_while_active_keeps_serving() {
        let network = scripted_origin();
        let storage = CacheStorage::new();
        let lifecycle = Lifecycle::new();
        let v1 = CacheConfig::default();
        lifecycle.start(&storage, &network, &origin(), &v1).await;

        let v2 = CacheConfig {
            name: "second-brain-v2".into(),
            ..CacheConfig::default()
        };
        lifecycle.install(&storage, &network, &origin(), &v2).await;
        assert!(lifecycle.is_active());
        assert_eq!(storage.keys(), vec!["second-brain-v1", "second-brain-v2"]);

        lifecycle.activate(&storage, &v2.name);
        assert_eq!(storage.keys(), vec!["second-brain-v2"]);
    }
}
