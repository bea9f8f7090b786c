use bytes::Bytes;

/// Snapshot of an HTTP response stored in a cache store.
#[derive(Clone, Debug)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl CachedResponse {
    pub fn new(status: u16, headers: Vec<(String, String)>, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }
}

/// Snapshot of cache store statistics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub current_size: usize,
}

/// Build the exact request identity used as a cache key: `METHOD:path?query`.
pub fn request_key(method: &str, path_and_query: &str) -> String {
    format!("{}:{}", method.to_ascii_uppercase(), path_and_query)
}
