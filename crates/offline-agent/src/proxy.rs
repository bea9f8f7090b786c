use crate::config::{CacheConfig, Config, ReloadPlan};
use crate::error::AgentError;
use crate::lifecycle::{InstallOutcome, Lifecycle};
use crate::network::{is_hop_by_hop, FetchRequest, Network};
use crate::push::NotificationCenter;
use crate::router::{self, PassReason, Route};
use crate::strategy::{OfflineFallback, Served, Strategies};
use crate::sync::queue::NoteQueue;
use arc_swap::ArcSwap;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderValue, Request, Response, StatusCode, Uri};
use axum::response::IntoResponse;
use http_body_util::BodyExt;
use offline_cache::{request_key, CacheStorage, CacheStore};
use std::sync::Arc;
use std::time::Instant;

/// Shared application state passed to all handlers.
pub struct AppState {
    pub config: ArcSwap<Config>,
    /// Parsed once at startup; changing the origin needs a restart.
    pub origin: Uri,
    pub storage: CacheStorage,
    pub network: Arc<dyn Network>,
    pub lifecycle: Lifecycle,
    pub queue: Arc<dyn NoteQueue>,
    pub notifications: NotificationCenter,
    pub sync_lock: tokio::sync::Mutex<()>,
}

impl AppState {
    pub fn new(
        config: Config,
        origin: Uri,
        network: Arc<dyn Network>,
        queue: Arc<dyn NoteQueue>,
    ) -> Self {
        Self {
            config: ArcSwap::from_pointee(config),
            origin,
            storage: CacheStorage::new(),
            network,
            lifecycle: Lifecycle::new(),
            queue,
            notifications: NotificationCenter::default(),
            sync_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Install the configured cache version and activate it.
    pub async fn start(&self) -> InstallOutcome {
        let config = self.config.load_full();
        self.lifecycle
            .start(&self.storage, self.network.as_ref(), &self.origin, &config.cache)
            .await
    }

    /// Apply a reloaded config. A new cache version is installed next to the
    /// running one, then activated: the new tables take effect and every
    /// other cache store is deleted.
    pub async fn apply_reload(&self, plan: ReloadPlan) {
        match plan {
            ReloadPlan::Unchanged => {}
            ReloadPlan::Swap(config) => self.config.store(Arc::new(config)),
            ReloadPlan::Reinstall(config) => {
                let outcome = self
                    .lifecycle
                    .install(&self.storage, self.network.as_ref(), &self.origin, &config.cache)
                    .await;
                let name = config.cache.name.clone();
                self.config.store(Arc::new(config));
                let deleted = self.lifecycle.activate(&self.storage, &name);
                tracing::info!(cache = %name, ?outcome, deleted = deleted.len(), "cache version upgraded");
            }
        }
    }

    fn cache_config(&self) -> CacheConfig {
        self.config.load().cache.clone()
    }
}

/// Main proxy handler. Classifies the request and runs the chosen strategy;
/// passthrough requests are relayed to the network untouched.
pub async fn proxy_handler(
    State(state): State<Arc<AppState>>,
    req: Request<Body>,
) -> Response<Body> {
    let start = Instant::now();
    let (parts, body) = req.into_parts();
    let tables = state.cache_config();

    let route = if state.lifecycle.is_active() {
        router::classify(&parts.method, &parts.uri, &state.origin, &tables)
    } else {
        Route::Passthrough(PassReason::NotControlled)
    };
    metrics::counter!("agent_requests_total", "route" => route.as_str()).increment(1);

    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            return AgentError::BadRequest(format!("failed to read request body: {e}"))
                .into_response();
        }
    };

    let request = FetchRequest {
        method: parts.method.clone(),
        uri: router::target_uri(&parts.uri, &state.origin),
        headers: parts.headers.clone(),
        body,
    };
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    if let Route::Passthrough(reason) = route {
        tracing::debug!(uri = %parts.uri, ?reason, "passthrough");
        return match state.network.fetch(request).await {
            Ok(fetched) => fetched.into_response(),
            Err(e) => AgentError::from(e).into_response(),
        };
    }

    let key = request_key(parts.method.as_str(), path_and_query);
    // The version may have been retired while the body was read; never
    // bring a purged store back.
    let cache = state
        .storage
        .get(&tables.name)
        .unwrap_or_else(|| Arc::new(CacheStore::detached(&tables.name)));
    let strategies = Strategies {
        network: state.network.as_ref(),
        cache: &cache,
    };

    let result = match route {
        Route::CacheFirst => strategies.cache_first(&key, request).await,
        Route::NetworkFirst => strategies.network_first(&key, request).await,
        _ => {
            let offline_key = request_key("GET", &tables.offline_page);
            let fallback = OfflineFallback {
                navigate: router::is_navigation(&parts.method, &parts.headers),
                offline_key: &offline_key,
            };
            strategies
                .network_first_with_fallback(&key, request, fallback)
                .await
        }
    };

    match result {
        Ok(served) => {
            tracing::debug!(
                key = %key,
                route = route.as_str(),
                source = served.source.as_header(),
                status = served.response.status,
                latency_us = start.elapsed().as_micros(),
                "served"
            );
            build_served_response(&served, route)
        }
        Err(e) => {
            tracing::warn!(key = %key, route = route.as_str(), error = %e, "request failed");
            e.into_response()
        }
    }
}

/// Build an HTTP response from a served snapshot.
fn build_served_response(served: &Served, route: Route) -> Response<Body> {
    let cached = &served.response;
    let mut response = Response::new(Body::from(cached.body.clone()));
    *response.status_mut() = StatusCode::from_u16(cached.status).unwrap_or(StatusCode::OK);

    let headers = response.headers_mut();
    for (key, value) in &cached.headers {
        if is_hop_by_hop(key) {
            continue;
        }
        if let (Ok(name), Ok(v)) = (
            axum::http::HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.append(name, v);
        }
    }

    headers.insert("x-cache", HeaderValue::from_static(served.source.as_header()));
    headers.insert("x-cache-strategy", HeaderValue::from_static(route.as_str()));
    response
}
