//! Serde-friendly cache settings.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::fs::FsStore;
use crate::store::Store;
use crate::ttl::Ttl;

const DEFAULT_EVICTION_INTERVAL_MS: u64 = 60_000;

/// Settings for a cache, typically deserialized from the embedding
/// application's own configuration file.
///
/// ```
/// use memocache::{CacheConfig, Ttl};
///
/// let config: CacheConfig = serde_json::from_str(
///     r#"{ "ttl": 30000, "dir": "/var/cache/teams", "use_safe_key": true }"#,
/// ).unwrap();
/// assert_eq!(config.ttl, Ttl::from_secs(30));
/// assert!(config.fs_store().is_some());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Freshness window; `null`, `"forever"` or milliseconds
    pub ttl: Ttl,
    /// How often keyed caches sweep expired entries
    pub eviction_interval_ms: u64,
    /// Prepended to every key written to the store
    pub key_prefix: String,
    /// Root directory for a filesystem store; no store when unset
    pub dir: Option<PathBuf>,
    /// Encode file names with [`safe_key`](crate::safe_key)
    pub use_safe_key: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Ttl::Forever,
            eviction_interval_ms: DEFAULT_EVICTION_INTERVAL_MS,
            key_prefix: String::new(),
            dir: None,
            use_safe_key: false,
        }
    }
}

impl CacheConfig {
    pub fn with_ttl(mut self, ttl: Ttl) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_eviction_interval(mut self, every: Duration) -> Self {
        self.eviction_interval_ms = u64::try_from(every.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn with_dir(mut self, dir: impl Into<PathBuf>, use_safe_key: bool) -> Self {
        self.dir = Some(dir.into());
        self.use_safe_key = use_safe_key;
        self
    }

    pub fn eviction_interval(&self) -> Duration {
        Duration::from_millis(self.eviction_interval_ms)
    }

    /// The configured filesystem store, if a directory is set
    pub fn fs_store(&self) -> Option<Arc<dyn Store>> {
        self.dir
            .as_ref()
            .map(|dir| Arc::new(FsStore::new(dir.clone(), self.use_safe_key)) as Arc<dyn Store>)
    }
}
