use crate::config::CacheConfig;
use axum::http::{header, HeaderMap, Method, Uri};

/// Caching strategy chosen for an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Forwarded to the network untouched, never cached.
    Passthrough(PassReason),
    CacheFirst,
    NetworkFirst,
    NetworkFirstWithFallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassReason {
    NonGet,
    CrossOrigin,
    /// The agent has not claimed clients yet.
    NotControlled,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Passthrough(_) => "passthrough",
            Route::CacheFirst => "cache-first",
            Route::NetworkFirst => "network-first",
            Route::NetworkFirstWithFallback => "network-first-fallback",
        }
    }
}

/// Classify a request. Non-GET and cross-origin requests pass through; the
/// path of a same-origin GET is matched against the cache-first prefixes,
/// then the network-first prefixes; anything else gets the offline fallback.
pub fn classify(method: &Method, uri: &Uri, origin: &Uri, tables: &CacheConfig) -> Route {
    if method != Method::GET {
        return Route::Passthrough(PassReason::NonGet);
    }
    if !is_same_origin(uri, origin) {
        return Route::Passthrough(PassReason::CrossOrigin);
    }

    let path = uri.path();
    if matches_any(path, &tables.cache_first_prefixes) {
        Route::CacheFirst
    } else if matches_any(path, &tables.network_first_prefixes) {
        Route::NetworkFirst
    } else {
        Route::NetworkFirstWithFallback
    }
}

fn matches_any(path: &str, prefixes: &[String]) -> bool {
    prefixes.iter().any(|p| path.starts_with(p.as_str()))
}

/// Origin-form requests (`GET /path`) target the application itself.
/// Absolute-form requests are same-origin only if scheme and authority match.
pub fn is_same_origin(uri: &Uri, origin: &Uri) -> bool {
    let Some(authority) = uri.authority() else {
        return true;
    };
    let scheme = uri.scheme_str().unwrap_or("http");
    let origin_scheme = origin.scheme_str().unwrap_or("http");

    scheme.eq_ignore_ascii_case(origin_scheme)
        && origin.authority().is_some_and(|o| {
            o.host().eq_ignore_ascii_case(authority.host())
                && port_of(o, origin_scheme) == port_of(authority, scheme)
        })
}

fn port_of(authority: &axum::http::uri::Authority, scheme: &str) -> u16 {
    authority
        .port_u16()
        .unwrap_or(if scheme.eq_ignore_ascii_case("https") { 443 } else { 80 })
}

/// Where the agent sends a request: same-origin paths go to the origin,
/// absolute-form cross-origin URIs go where they point.
pub fn target_uri(uri: &Uri, origin: &Uri) -> Uri {
    if uri.authority().is_some() && !is_same_origin(uri, origin) {
        return uri.clone();
    }
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    origin_uri(origin, path_and_query)
}

/// Join an application path onto the origin.
pub fn origin_uri(origin: &Uri, path_and_query: &str) -> Uri {
    let base = origin.to_string();
    let joined = format!("{}{}", base.trim_end_matches('/'), path_and_query);
    joined.parse().unwrap_or_else(|_| origin.clone())
}

/// Page navigations get the offline page as their last fallback.
///
/// `Sec-Fetch-Mode` decides when present; older clients are recognised by a
/// GET that accepts HTML.
pub fn is_navigation(method: &Method, headers: &HeaderMap) -> bool {
    if let Some(mode) = headers.get("sec-fetch-mode") {
        return mode.as_bytes().eq_ignore_ascii_case(b"navigate");
    }
    method == Method::GET
        && headers
            .get(header::ACCEPT)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|accept| accept.contains("text/html"))
}
