//! Read-through caching of a single producer function.

use std::fmt;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::codec::{Codec, JsonCodec, NoCodec};
use crate::data::Data;
use crate::error::{CacheError, Stale};
use crate::fs::FsStore;
use crate::store::Store;
use crate::ttl::Ttl;

/// Per-call switches for a read-through lookup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Recompute even if the cached value is still fresh
    pub force_refresh: bool,
    /// Restart the TTL of a fresh value, keeping it alive while it is being read
    pub refresh_ttl: bool,
}

impl ReadOptions {
    pub fn force_refresh() -> Self {
        Self {
            force_refresh: true,
            ..Self::default()
        }
    }

    pub fn refresh_ttl() -> Self {
        Self {
            refresh_ttl: true,
            ..Self::default()
        }
    }
}

/// The outcome of a read-through call.
///
/// `cache_error` and `error` are independent: a store failure does not mean
/// the value is wrong, and a producer failure still comes with the last
/// known-good value.
#[derive(Debug)]
pub struct Lookup<T, E> {
    /// The fresh value, or the previous one if the producer failed
    pub value: T,
    /// Store or serialization failure, reported on its own channel
    pub cache_error: Option<CacheError>,
    /// The producer's error, if it was invoked and failed
    pub error: Option<E>,
}

impl<T, E> Lookup<T, E> {
    pub(crate) fn hit(value: T) -> Self {
        Self {
            value,
            cache_error: None,
            error: None,
        }
    }

    pub fn into_parts(self) -> (T, Option<CacheError>, Option<E>) {
        (self.value, self.cache_error, self.error)
    }

    /// Discards the cache error
    pub fn skip_cache_error(self) -> Result<T, Stale<T, E>> {
        match self.error {
            None => Ok(self.value),
            Some(error) => Err(Stale {
                stale: self.value,
                error,
            }),
        }
    }

    /// Hands the cache error, if any, to `log` and then discards it
    pub fn log_cache_error<L>(mut self, log: L) -> Result<T, Stale<T, E>>
    where
        L: FnOnce(&CacheError),
    {
        if let Some(err) = self.cache_error.take() {
            log(&err);
        }
        self.skip_cache_error()
    }

    /// Like [`Lookup::log_cache_error`], reporting through `tracing`
    pub fn trace_cache_error(self) -> Result<T, Stale<T, E>> {
        self.log_cache_error(|err| tracing::warn!(error = %err, "cache degraded to memory"))
    }
}

/// Decide, recompute and commit for one value. The caller holds the value's lock.
pub(crate) async fn read_through<T, C, E, Fut>(
    data: &mut Data<T, C>,
    ttl: Ttl,
    options: ReadOptions,
    produce: impl FnOnce() -> Fut,
) -> Lookup<T, E>
where
    T: Clone,
    C: Codec<T>,
    Fut: Future<Output = Result<T, E>>,
{
    let load_error = data.load().await.err();
    if let Some(err) = &load_error {
        tracing::warn!(key = data.key(), error = %err, "could not load cached value");
    }

    if options.refresh_ttl && !data.is_unset() && !data.is_expired(ttl) {
        data.reset_ttl();
    }

    if !(options.force_refresh || data.is_unset() || data.is_expired(ttl)) {
        tracing::debug!(key = data.key(), "cache hit");
        return Lookup::hit(data.get().clone());
    }

    tracing::debug!(
        key = data.key(),
        forced = options.force_refresh,
        unset = data.is_unset(),
        "recomputing cached value"
    );
    match produce().await {
        Err(error) => Lookup {
            value: data.get().clone(),
            cache_error: load_error,
            error: Some(error),
        },
        Ok(value) => {
            let cache_error = data.set(value).await.err();
            if let Some(err) = &cache_error {
                tracing::warn!(key = data.key(), error = %err, "could not persist cached value");
            }
            Lookup {
                value: data.get().clone(),
                cache_error,
                error: None,
            }
        }
    }
}

/// A producer wrapped in a read-through cache.
///
/// The producer only runs when the cached value is missing, expired or a
/// refresh is forced. The whole decide/compute/commit sequence holds an
/// async lock, so a `Cached` can be shared between tasks; concurrent callers
/// of a stale value wait for the first recompute and reuse its result.
pub struct Cached<T, F, C = JsonCodec> {
    data: Mutex<Data<T, C>>,
    ttl: Ttl,
    producer: F,
}

impl<T: Default, F> Cached<T, F, NoCodec> {
    /// Caches `producer` in memory only
    pub fn in_memory(ttl: Ttl, producer: F) -> Self {
        Self::with_codec(None, "", ttl, NoCodec, producer)
    }
}

impl<T: Default, F> Cached<T, F> {
    /// Caches `producer` in memory and in the file at `path`, so the TTL
    /// holds across restarts. The parent directory is created on demand.
    pub fn on_disk(path: impl AsRef<Path>, ttl: Ttl, producer: F) -> Self {
        let path = path.as_ref();
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let key = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::with_store(Arc::new(FsStore::new(dir, false)), key, ttl, producer)
    }

    /// Caches `producer` in memory and mirrors the value to `store` under `key`
    pub fn with_store(store: Arc<dyn Store>, key: impl Into<String>, ttl: Ttl, producer: F) -> Self {
        Self::with_codec(Some(store), key, ttl, JsonCodec, producer)
    }
}

impl<T: Default, F, C> Cached<T, F, C> {
    /// Full constructor with an explicit store and codec
    pub fn with_codec(
        store: Option<Arc<dyn Store>>,
        key: impl Into<String>,
        ttl: Ttl,
        codec: C,
        producer: F,
    ) -> Self {
        Self {
            data: Mutex::new(Data::with_codec(store, key, codec)),
            ttl,
            producer,
        }
    }
}

impl<T, F, C> Cached<T, F, C> {
    pub fn ttl(&self) -> Ttl {
        self.ttl
    }
}

impl<T, F, C, Fut, E> Cached<T, F, C>
where
    T: Clone,
    C: Codec<T>,
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    /// Returns the cached value, recomputing it first if needed
    pub async fn call(&self, options: ReadOptions) -> Lookup<T, E> {
        let mut data = self.data.lock().await;
        read_through(&mut *data, self.ttl, options, || (self.producer)()).await
    }

    /// Shorthand for `call(ReadOptions::default())`
    pub async fn get(&self) -> Lookup<T, E> {
        self.call(ReadOptions::default()).await
    }
}

impl<T, F, C> fmt::Debug for Cached<T, F, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cached").field("ttl", &self.ttl).finish_non_exhaustive()
    }
}
