use axum::http::Uri;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub origin: OriginConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_admin_addr")]
    pub admin_addr: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct OriginConfig {
    /// Base URL of the application the agent fronts, e.g. `http://127.0.0.1:3000`.
    #[serde(default = "default_origin_url")]
    pub url: String,
}

/// Cache version, precache list and path classification tables.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CacheConfig {
    /// Current cache version. Bumping it retires every other cache store.
    #[serde(default = "default_cache_name")]
    pub name: String,
    #[serde(default = "default_core_assets")]
    pub core_assets: Vec<String>,
    #[serde(default = "default_offline_page")]
    pub offline_page: String,
    #[serde(default = "default_cache_first_prefixes")]
    pub cache_first_prefixes: Vec<String>,
    #[serde(default = "default_network_first_prefixes")]
    pub network_first_prefixes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SyncConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Sync event tag that replays queued offline notes.
    #[serde(default = "default_sync_tag")]
    pub tag: String,
    #[serde(default = "default_capture_path")]
    pub capture_path: String,
    /// Period of the background sync timer. 0 disables it.
    #[serde(default = "default_sync_interval")]
    pub interval_seconds: u64,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.origin.uri()?;

        if self.cache.name.trim().is_empty() {
            return Err(invalid("cache.name", "must not be empty"));
        }

        let path_lists = [
            ("cache.core_assets", &self.cache.core_assets),
            ("cache.cache_first_prefixes", &self.cache.cache_first_prefixes),
            ("cache.network_first_prefixes", &self.cache.network_first_prefixes),
        ];
        for (field, paths) in path_lists {
            if let Some(bad) = paths.iter().find(|p| !p.starts_with('/')) {
                return Err(invalid(field, &format!("`{bad}` must start with '/'")));
            }
        }

        if !self.cache.offline_page.starts_with('/') {
            return Err(invalid("cache.offline_page", "must start with '/'"));
        }
        if !self.sync.capture_path.starts_with('/') {
            return Err(invalid("sync.capture_path", "must start with '/'"));
        }

        if !self.cache.core_assets.contains(&self.cache.offline_page) {
            tracing::warn!(
                offline_page = %self.cache.offline_page,
                "offline page is not in core_assets; navigation fallback will miss until it is cached"
            );
        }

        Ok(())
    }
}

impl OriginConfig {
    /// Parse the origin URL. It must be absolute (scheme and authority).
    pub fn uri(&self) -> Result<Uri, ConfigError> {
        let uri: Uri = self
            .url
            .parse()
            .map_err(|e| invalid("origin.url", &format!("{e}")))?;
        if uri.scheme().is_none() || uri.authority().is_none() {
            return Err(invalid("origin.url", "must be an absolute URL"));
        }
        Ok(uri)
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            admin_addr: default_admin_addr(),
        }
    }
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            url: default_origin_url(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            name: default_cache_name(),
            core_assets: default_core_assets(),
            offline_page: default_offline_page(),
            cache_first_prefixes: default_cache_first_prefixes(),
            network_first_prefixes: default_network_first_prefixes(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            tag: default_sync_tag(),
            capture_path: default_capture_path(),
            interval_seconds: default_sync_interval(),
        }
    }
}

/// What a reloaded config file asks the running agent to do.
#[derive(Debug, Clone, PartialEq)]
pub enum ReloadPlan {
    /// Nothing the agent can apply changed.
    Unchanged,
    /// Swap in the new routing tables without touching cache contents.
    Swap(Config),
    /// New cache version: install it, then activate (purging the old one).
    Reinstall(Config),
}

/// Compare old and new config and decide how to apply the change.
///
/// - cache name changed → reinstall + activate under the new version
/// - prefix lists, core assets, offline page or sync tag/interval changed → atomic swap
/// - listener addresses, origin or queue database changed → WARN log, ignore (restart required)
pub fn diff(old: &Config, new: &Config) -> ReloadPlan {
    if old.server != new.server {
        tracing::warn!(
            old_listen = %old.server.listen_addr,
            new_listen = %new.server.listen_addr,
            "listener address change detected; ignoring. Restart to rebind"
        );
    }
    if old.origin != new.origin {
        tracing::warn!(
            old = %old.origin.url,
            new = %new.origin.url,
            "origin change detected; ignoring. Restart to switch origin"
        );
    }
    if old.sync.db_path != new.sync.db_path {
        tracing::warn!(
            old = %old.sync.db_path.display(),
            new = %new.sync.db_path.display(),
            "note queue path change detected; ignoring. Restart to reopen the queue"
        );
    }

    // Restart-only fields keep their running values.
    let mut merged = new.clone();
    merged.server = old.server.clone();
    merged.origin = old.origin.clone();
    merged.sync.db_path = old.sync.db_path.clone();

    if merged == *old {
        ReloadPlan::Unchanged
    } else if old.cache.name != merged.cache.name {
        tracing::info!(
            old = %old.cache.name,
            new = %merged.cache.name,
            "config reloaded: cache version changed, reinstalling"
        );
        ReloadPlan::Reinstall(merged)
    } else {
        tracing::info!("config reloaded: routing tables updated");
        ReloadPlan::Swap(merged)
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}
fn default_admin_addr() -> String {
    "0.0.0.0:9090".to_string()
}
fn default_origin_url() -> String {
    "http://127.0.0.1:3000".to_string()
}
fn default_cache_name() -> String {
    "second-brain-v1".to_string()
}
fn default_core_assets() -> Vec<String> {
    [
        "/",
        "/static/css/design-system.css",
        "/static/js/app.js",
        "/manifest.json",
        "/offline",
        "/static/icons/logo-192.png",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
fn default_offline_page() -> String {
    "/offline".to_string()
}
fn default_cache_first_prefixes() -> Vec<String> {
    vec!["/static/".to_string(), "/favicon.ico".to_string()]
}
fn default_network_first_prefixes() -> Vec<String> {
    vec![
        "/api/".to_string(),
        "/capture".to_string(),
        "/search".to_string(),
    ]
}
fn default_db_path() -> PathBuf {
    PathBuf::from("./offline-notes.sqlite")
}
fn default_sync_tag() -> String {
    "offline-note-sync".to_string()
}
fn default_capture_path() -> String {
    "/capture".to_string()
}
fn default_sync_interval() -> u64 {
    30
}
