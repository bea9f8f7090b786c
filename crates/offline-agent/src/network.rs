use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, Response, StatusCode, Uri};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use offline_cache::CachedResponse;
use thiserror::Error;

pub type HttpClient = Client<HttpConnector, Full<Bytes>>;

/// A single network attempt failed before a response was available.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("failed to build request: {0}")]
    Build(String),

    #[error("request to {uri} failed: {reason}")]
    Transport { uri: String, reason: String },

    #[error("failed to read response body: {0}")]
    Body(String),
}

/// An outbound request, fully buffered.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl FetchRequest {
    pub fn get(uri: Uri) -> Self {
        Self {
            method: Method::GET,
            uri,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }
}

/// A response read fully off the network.
#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl FetchedResponse {
    /// Snapshot this response for storage. Non-UTF-8 header values are kept as empty strings.
    pub fn to_snapshot(&self) -> CachedResponse {
        let headers: Vec<(String, String)> = self
            .headers
            .iter()
            .filter(|(k, _)| !is_hop_by_hop(k.as_str()))
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
            .collect();
        CachedResponse::new(self.status.as_u16(), headers, self.body.clone())
    }

    /// Relay the response to the client unmodified, minus hop-by-hop headers.
    pub fn into_response(self) -> Response<Body> {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        let headers = response.headers_mut();
        for (key, value) in self.headers.iter() {
            if is_hop_by_hop(key.as_str()) {
                continue;
            }
            headers.append(key.clone(), value.clone());
        }
        response
    }
}

/// The network as seen by the caching strategies: one attempt per call, no retry.
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchedResponse, NetworkError>;
}

/// Network backed by a pooled hyper client.
pub struct HyperNetwork {
    client: HttpClient,
}

impl HyperNetwork {
    pub fn new() -> Self {
        Self {
            client: Client::builder(TokioExecutor::new()).build_http(),
        }
    }
}

impl Default for HyperNetwork {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Network for HyperNetwork {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchedResponse, NetworkError> {
        let uri = request.uri.to_string();

        let mut builder = Request::builder().method(request.method).uri(request.uri);
        for (key, value) in request.headers.iter() {
            let k = key.as_str();
            // hyper derives Host from the target URI
            if k == "host" || is_hop_by_hop(k) {
                continue;
            }
            builder = builder.header(key, value);
        }
        let upstream_req = builder
            .body(Full::new(request.body))
            .map_err(|e| NetworkError::Build(e.to_string()))?;

        let upstream_resp = self
            .client
            .request(upstream_req)
            .await
            .map_err(|e| NetworkError::Transport {
                uri: uri.clone(),
                reason: e.to_string(),
            })?;

        let status = upstream_resp.status();
        let headers = upstream_resp.headers().clone();
        let body = upstream_resp
            .into_body()
            .collect()
            .await
            .map_err(|e| NetworkError::Body(e.to_string()))?
            .to_bytes();

        tracing::trace!(uri = %uri, status = status.as_u16(), bytes = body.len(), "fetched");

        Ok(FetchedResponse {
            status,
            headers,
            body,
        })
    }
}

/// Connection-scoped headers that must not be forwarded or stored.
pub fn is_hop_by_hop(name: &str) -> bool {
    matches!(
        name.to_ascii_lowercase().as_str(),
        "connection"
            | "keep-alive"
            | "proxy-connection"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
    )
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted network used by the strategy, lifecycle and proxy tests.

    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// Serves canned responses by path (and query); anything unscripted,
    /// or everything while offline, fails like a dropped connection.
    #[derive(Default)]
    pub struct ScriptedNetwork {
        routes: Mutex<HashMap<String, (u16, Vec<(String, String)>, Bytes)>>,
        offline: Mutex<bool>,
        calls: Mutex<Vec<(Method, String, Bytes)>>,
    }

    impl ScriptedNetwork {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn respond(&self, path: &str, status: u16, body: &'static str) -> &Self {
            self.routes.lock().insert(
                path.to_string(),
                (status, vec![], Bytes::from_static(body.as_bytes())),
            );
            self
        }

        pub fn respond_with_type(
            &self,
            path: &str,
            content_type: &str,
            body: &'static str,
        ) -> &Self {
            self.routes.lock().insert(
                path.to_string(),
                (
                    200,
                    vec![("content-type".to_string(), content_type.to_string())],
                    Bytes::from_static(body.as_bytes()),
                ),
            );
            self
        }

        pub fn set_offline(&self, offline: bool) {
            *self.offline.lock() = offline;
        }

        pub fn calls(&self) -> Vec<(Method, String, Bytes)> {
            self.calls.lock().clone()
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().len()
        }

        pub fn clear_calls(&self) {
            self.calls.lock().clear();
        }
    }

    #[async_trait]
    impl Network for ScriptedNetwork {
        async fn fetch(&self, request: FetchRequest) -> Result<FetchedResponse, NetworkError> {
            let target = request
                .uri
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| "/".to_string());
            self.calls
                .lock()
                .push((request.method.clone(), request.uri.to_string(), request.body.clone()));

            let transport = || NetworkError::Transport {
                uri: request.uri.to_string(),
                reason: "connection refused".to_string(),
            };
            if *self.offline.lock() {
                return Err(transport());
            }
            let routes = self.routes.lock();
            let (status, headers, body) = routes.get(&target).cloned().ok_or_else(transport)?;

            let mut map = HeaderMap::new();
            for (k, v) in headers {
                if let (Ok(name), Ok(value)) = (
                    axum::http::HeaderName::from_bytes(k.as_bytes()),
                    axum::http::HeaderValue::from_str(&v),
                ) {
                    map.insert(name, value);
                }
            }
            Ok(FetchedResponse {
                status: StatusCode::from_u16(status).unwrap_or(StatusCode::OK),
                headers: map,
                body,
            })
        }
    }
}
