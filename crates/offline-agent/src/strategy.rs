use crate::error::AgentError;
use crate::network::{FetchRequest, Network, NetworkError};
use offline_cache::{CacheStore, CachedResponse};
use std::sync::Arc;

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServedFrom {
    Network,
    Cache,
    OfflinePage,
}

impl ServedFrom {
    /// Value of the `X-Cache` response header.
    pub fn as_header(&self) -> &'static str {
        match self {
            ServedFrom::Network => "MISS",
            ServedFrom::Cache => "HIT",
            ServedFrom::OfflinePage => "OFFLINE",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Served {
    pub response: Arc<CachedResponse>,
    pub source: ServedFrom,
}

/// Terminal fallback for page navigations.
#[derive(Debug, Clone, Copy)]
pub struct OfflineFallback<'a> {
    pub navigate: bool,
    /// Cache key of the offline page.
    pub offline_key: &'a str,
}

/// The three caching strategies, run against one cache store.
pub struct Strategies<'a> {
    pub network: &'a dyn Network,
    pub cache: &'a CacheStore,
}

impl Strategies<'_> {
    /// Serve from cache without touching the network; on a miss fetch and
    /// store a copy of a 200 response. No freshness check.
    pub async fn cache_first(&self, key: &str, request: FetchRequest) -> Result<Served, AgentError> {
        if let Some(cached) = self.cache.match_request(key) {
            tracing::debug!(key = %key, "cache HIT");
            metrics::counter!("agent_cache_hits_total").increment(1);
            return Ok(Served {
                response: cached,
                source: ServedFrom::Cache,
            });
        }

        metrics::counter!("agent_cache_misses_total").increment(1);
        let served = self.fetch_and_store(key, request).await?;
        tracing::debug!(key = %key, status = served.response.status, "cache MISS → network");
        Ok(served)
    }

    /// Try the network first; on failure fall back to the cache. No offline page.
    pub async fn network_first(&self, key: &str, request: FetchRequest) -> Result<Served, AgentError> {
        Ok(self.network_then_cache(key, request).await?)
    }

    /// Network, then cache, then the offline page for navigations.
    /// Non-navigations with nothing cached fail with [`AgentError::NoCachedVersion`].
    pub async fn network_first_with_fallback(
        &self,
        key: &str,
        request: FetchRequest,
        fallback: OfflineFallback<'_>,
    ) -> Result<Served, AgentError> {
        match self.network_then_cache(key, request).await {
            Ok(served) => Ok(served),
            Err(_) if fallback.navigate => {
                let offline = self
                    .cache
                    .match_request(fallback.offline_key)
                    .ok_or(AgentError::NoCachedVersion)?;
                tracing::info!(key = %key, "serving offline page");
                metrics::counter!("agent_offline_fallbacks_total").increment(1);
                Ok(Served {
                    response: offline,
                    source: ServedFrom::OfflinePage,
                })
            }
            Err(_) => Err(AgentError::NoCachedVersion),
        }
    }

    async fn network_then_cache(&self, key: &str, request: FetchRequest) -> Result<Served, NetworkError> {
        match self.fetch_and_store(key, request).await {
            Ok(served) => Ok(served),
            Err(err) => {
                tracing::debug!(key = %key, error = %err, "network failed, trying cache");
                match self.cache.match_request(key) {
                    Some(cached) => {
                        metrics::counter!("agent_cache_hits_total").increment(1);
                        Ok(Served {
                            response: cached,
                            source: ServedFrom::Cache,
                        })
                    }
                    None => {
                        metrics::counter!("agent_cache_misses_total").increment(1);
                        Err(err)
                    }
                }
            }
        }
    }

    /// One network attempt. Only status 200 is stored; other statuses are
    /// returned uncached.
    async fn fetch_and_store(&self, key: &str, request: FetchRequest) -> Result<Served, NetworkError> {
        let fetched = self.network.fetch(request).await.inspect_err(|err| {
            tracing::warn!(key = %key, error = %err, "network request failed");
            metrics::counter!("agent_network_failures_total").increment(1);
        })?;

        let snapshot = fetched.to_snapshot();
        if snapshot.status == 200 {
            self.cache.put(key.to_string(), snapshot.clone());
        }

        Ok(Served {
            response: Arc::new(snapshot),
            source: ServedFrom::Network,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::testing::ScriptedNetwork;
    use bytes::Bytes;
    use offline_cache::{request_key, CacheStorage};

    const OFFLINE_KEY: &str = "GET:/offline";

    fn get(path: &str) -> FetchRequest {
        FetchRequest::get(format!("http://origin.test{path}").parse().unwrap())
    }

    fn cached(body: &'static str) -> CachedResponse {
        CachedResponse::new(200, vec![], Bytes::from_static(body.as_bytes()))
    }

    fn navigate() -> OfflineFallback<'static> {
        OfflineFallback {
            navigate: true,
            offline_key: OFFLINE_KEY,
        }
    }

    fn subresource() -> OfflineFallback<'static> {
        OfflineFallback {
            navigate: false,
            offline_key: OFFLINE_KEY,
        }
    }

    #[tokio::test]
    async fn cache_first_hit_skips_network() {
        let network = ScriptedNetwork::new();
        network.respond("/static/css/design-system.css", 200, "fresh");
        let storage = CacheStorage::new();
        let cache = storage.open("second-brain-v1");
        let key = request_key("GET", "/static/css/design-system.css");
        cache.put(key.clone(), cached("cached-css"));

        let strategies = Strategies { network: &network, cache: &cache };
        let served = strategies
            .cache_first(&key, get("/static/css/design-system.css"))
            .await
            .unwrap();

        assert_eq!(served.source, ServedFrom::Cache);
        assert_eq!(served.response.body, Bytes::from_static(b"cached-css"));
        assert_eq!(network.call_count(), 0);
    }

    #[tokio::test]
    async fn cache_first_miss_fetches_and_stores() {
        let network = ScriptedNetwork::new();
        network.respond("/static/js/app.js", 200, "js");
        let storage = CacheStorage::new();
        let cache = storage.open("v1");
        let key = request_key("GET", "/static/js/app.js");

        let strategies = Strategies { network: &network, cache: &cache };
        let served = strategies.cache_first(&key, get("/static/js/app.js")).await.unwrap();

        assert_eq!(served.source, ServedFrom::Network);
        assert!(cache.contains(&key));

        // second request is served from cache
        let served = strategies.cache_first(&key, get("/static/js/app.js")).await.unwrap();
        assert_eq!(served.source, ServedFrom::Cache);
        assert_eq!(network.call_count(), 1);
    }

    #[tokio::test]
    async fn cache_first_does_not_store_non_200() {
        let network = ScriptedNetwork::new();
        network.respond("/static/missing.png", 404, "nope");
        let storage = CacheStorage::new();
        let cache = storage.open("v1");
        let key = request_key("GET", "/static/missing.png");

        let strategies = Strategies { network: &network, cache: &cache };
        let served = strategies.cache_first(&key, get("/static/missing.png")).await.unwrap();

        assert_eq!(served.response.status, 404);
        assert!(!cache.contains(&key));
    }

    #[tokio::test]
    async fn cache_first_offline_miss_is_network_error() {
        let network = ScriptedNetwork::new();
        network.set_offline(true);
        let storage = CacheStorage::new();
        let cache = storage.open("v1");

        let strategies = Strategies { network: &network, cache: &cache };
        let result = strategies
            .cache_first("GET:/static/x.css", get("/static/x.css"))
            .await;

        assert!(matches!(result, Err(AgentError::Network(_))));
    }

    #[tokio::test]
    async fn network_first_serves_and_stores() {
        let network = ScriptedNetwork::new();
        network.respond("/api/notes", 200, "[1,2]");
        let storage = CacheStorage::new();
        let cache = storage.open("v1");
        let key = request_key("GET", "/api/notes");
        cache.put(key.clone(), cached("[1]"));

        let strategies = Strategies { network: &network, cache: &cache };
        let served = strategies.network_first(&key, get("/api/notes")).await.unwrap();

        assert_eq!(served.source, ServedFrom::Network);
        assert_eq!(served.response.body, Bytes::from_static(b"[1,2]"));
        assert_eq!(
            cache.match_request(&key).unwrap().body,
            Bytes::from_static(b"[1,2]")
        );
    }

    #[tokio::test]
    async fn network_first_offline_uses_cache() {
        let network = ScriptedNetwork::new();
        network.set_offline(true);
        let storage = CacheStorage::new();
        let cache = storage.open("v1");
        let key = request_key("GET", "/api/notes");
        cache.put(key.clone(), cached("[1]"));

        let strategies = Strategies { network: &network, cache: &cache };
        let served = strategies.network_first(&key, get("/api/notes")).await.unwrap();

        assert_eq!(served.source, ServedFrom::Cache);
        assert_eq!(served.response.body, Bytes::from_static(b"[1]"));
    }

    #[tokio::test]
    async fn network_first_offline_uncached_rejects_without_offline_page() {
        let network = ScriptedNetwork::new();
        network.set_offline(true);
        let storage = CacheStorage::new();
        let cache = storage.open("v1");
        cache.put(OFFLINE_KEY.into(), cached("offline"));

        let strategies = Strategies { network: &network, cache: &cache };
        let result = strategies
            .network_first("GET:/search?q=x", get("/search?q=x"))
            .await;

        assert!(matches!(result, Err(AgentError::Network(_))));
    }

    #[tokio::test]
    async fn fallback_navigation_gets_offline_page() {
        let network = ScriptedNetwork::new();
        network.set_offline(true);
        let storage = CacheStorage::new();
        let cache = storage.open("v1");
        cache.put(OFFLINE_KEY.into(), cached("<h1>offline</h1>"));

        let strategies = Strategies { network: &network, cache: &cache };
        let served = strategies
            .network_first_with_fallback("GET:/notes/42", get("/notes/42"), navigate())
            .await
            .unwrap();

        assert_eq!(served.source, ServedFrom::OfflinePage);
        assert_eq!(served.response.body, Bytes::from_static(b"<h1>offline</h1>"));
    }

    #[tokio::test]
    async fn fallback_prefers_cached_page_over_offline_page() {
        let network = ScriptedNetwork::new();
        network.set_offline(true);
        let storage = CacheStorage::new();
        let cache = storage.open("v1");
        cache.put(OFFLINE_KEY.into(), cached("offline"));
        cache.put("GET:/notes/42".into(), cached("note 42"));

        let strategies = Strategies { network: &network, cache: &cache };
        let served = strategies
            .network_first_with_fallback("GET:/notes/42", get("/notes/42"), navigate())
            .await
            .unwrap();

        assert_eq!(served.source, ServedFrom::Cache);
        assert_eq!(served.response.body, Bytes::from_static(b"note 42"));
    }

    #[tokio::test]
    async fn fallback_subresource_rejects_with_fixed_error() {
        let network = ScriptedNetwork::new();
        network.set_offline(true);
        let storage = CacheStorage::new();
        let cache = storage.open("v1");
        cache.put(OFFLINE_KEY.into(), cached("offline"));

        let strategies = Strategies { network: &network, cache: &cache };
        let result = strategies
            .network_first_with_fallback("GET:/manifest.json", get("/manifest.json"), subresource())
            .await;

        match result {
            Err(err @ AgentError::NoCachedVersion) => {
                assert_eq!(err.to_string(), "No cached version available")
            }
            other => panic!("expected NoCachedVersion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn fallback_navigation_without_offline_page_rejects() {
        let network = ScriptedNetwork::new();
        network.set_offline(true);
        let storage = CacheStorage::new();
        let cache = storage.open("v1");

        let strategies = Strategies { network: &network, cache: &cache };
        let result = strategies
            .network_first_with_fallback("GET:/notes/1", get("/notes/1"), navigate())
            .await;

        assert!(matches!(result, Err(AgentError::NoCachedVersion)));
    }

    #[tokio::test]
    async fn non_200_network_response_is_served_not_stored() {
        let network = ScriptedNetwork::new();
        network.respond("/notes/404", 404, "missing");
        let storage = CacheStorage::new();
        let cache = storage.open("v1");

        let strategies = Strategies { network: &network, cache: &cache };
        let served = strategies
            .network_first_with_fallback("GET:/notes/404", get("/notes/404"), navigate())
            .await
            .unwrap();

        assert_eq!(served.response.status, 404);
        assert_eq!(served.source, ServedFrom::Network);
        assert!(!cache.contains("GET:/notes/404"));
    }
}
