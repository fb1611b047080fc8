//! One [`Data`] per derived key, with TTL driven eviction.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

use crate::codec::{Codec, JsonCodec};
use crate::data::Data;
use crate::error::{BoxError, CacheError};
use crate::store::Store;
use crate::ttl::Ttl;

/// A type that provides its own memoization key
pub trait Keyer {
    fn key(&self) -> String;
}

/// Turns a memoization input into the string that indexes its entry
pub trait KeyStrategy<K: ?Sized>: Send + Sync {
    fn derive(&self, input: &K) -> Result<String, BoxError>;
}

/// Keys inputs by their JSON encoding. Equal inputs must encode identically,
/// so prefer ordered collections (`BTreeMap` over `HashMap`) inside keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonKey;

impl<K: Serialize + ?Sized> KeyStrategy<K> for JsonKey {
    fn derive(&self, input: &K) -> Result<String, BoxError> {
        Ok(serde_json::to_string(input)?)
    }
}

/// Keys inputs through their [`Keyer`] implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct SelfKey;

impl<K: Keyer + ?Sized> KeyStrategy<K> for SelfKey {
    fn derive(&self, input: &K) -> Result<String, BoxError> {
        Ok(input.key())
    }
}

/// Keys inputs with a closure
#[derive(Clone, Copy)]
pub struct KeyWith<F>(pub F);

impl<K: ?Sized, F> KeyStrategy<K> for KeyWith<F>
where
    F: Fn(&K) -> String + Send + Sync,
{
    fn derive(&self, input: &K) -> Result<String, BoxError> {
        Ok((self.0)(input))
    }
}

impl<F> fmt::Debug for KeyWith<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyWith(<closure>)")
    }
}

/// Shared handle to one entry of a [`KeyedCache`]
pub type Entry<T, C> = Arc<tokio::sync::Mutex<Data<T, C>>>;

type Entries<T, C> = Arc<Mutex<HashMap<String, Entry<T, C>>>>;

/// A map of cached values sharing one store, TTL and key prefix.
///
/// Entries are created on first access. When built with
/// [`KeyedCache::with_eviction`] a background task removes expired entries
/// from the map and from the store. That task runs until the shutdown signal
/// fires (or its sender is dropped); a cache whose shutdown is never signalled
/// keeps its sweep alive for the life of the runtime.
pub struct KeyedCache<T, C = JsonCodec> {
    entries: Entries<T, C>,
    store: Option<Arc<dyn Store>>,
    key_prefix: String,
    ttl: Ttl,
    codec: C,
    sweep: Option<JoinHandle<()>>,
}

impl<T, C> KeyedCache<T, C>
where
    T: Default,
    C: Clone,
{
    /// Creates a keyed cache without a background sweep
    pub fn new(store: Option<Arc<dyn Store>>, key_prefix: impl Into<String>, ttl: Ttl, codec: C) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            store,
            key_prefix: key_prefix.into(),
            ttl,
            codec,
            sweep: None,
        }
    }

    /// Returns the entry for `key`, creating an unset one on first use.
    ///
    /// The entry is stored under `key_prefix + key` in the backing store.
    pub fn entry(&self, key: &str) -> Entry<T, C> {
        let mut entries = self.entries.lock();
        let entry = entries.entry(key.to_string()).or_insert_with(|| {
            Arc::new(tokio::sync::Mutex::new(Data::with_codec(
                self.store.clone(),
                format!("{}{}", self.key_prefix, key),
                self.codec.clone(),
            )))
        });
        Arc::clone(entry)
    }
}

impl<T, C> KeyedCache<T, C>
where
    T: Default + Send + Sync + 'static,
    C: Clone + Send + Sync + 'static,
{
    /// Creates a keyed cache and starts its eviction sweep.
    ///
    /// The sweep runs once immediately, then every `every`, until `shutdown`
    /// turns `true` or its sender is dropped.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a tokio runtime.
    pub fn with_eviction(
        store: Option<Arc<dyn Store>>,
        key_prefix: impl Into<String>,
        ttl: Ttl,
        codec: C,
        every: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let mut cache = Self::new(store, key_prefix, ttl, codec);
        cache.sweep = Some(tokio::spawn(run_sweep(
            Arc::clone(&cache.entries),
            ttl,
            every,
            shutdown,
        )));
        cache
    }
}

impl<T, C> KeyedCache<T, C> {
    pub fn ttl(&self) -> Ttl {
        self.ttl
    }

    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    /// Number of entries currently held, expired or not
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// True while the background sweep is running
    pub fn is_sweeping(&self) -> bool {
        self.sweep.as_ref().is_some_and(|sweep| !sweep.is_finished())
    }

    /// Drops the in-memory entry for `key`; the store is left untouched
    pub fn remove(&self, key: &str) -> bool {
        self.entries.lock().remove(key).is_some()
    }
}

impl<T, C> KeyedCache<T, C>
where
    T: Send + Sync,
    C: Send + Sync,
{
    /// Runs a single eviction pass and returns how many entries were removed
    pub async fn evict_expired(&self) -> usize {
        evict_expired(&self.entries, self.ttl).await
    }
}

impl<T, C> KeyedCache<T, C>
where
    T: Default + Clone,
    C: Codec<T> + Clone,
{
    /// Sets the value for `key`, creating the entry if needed
    pub async fn set(&self, key: &str, value: T) -> Result<(), CacheError> {
        let entry = self.entry(key);
        let mut data = entry.lock().await;
        data.set(value).await
    }

    /// Returns the value for `key` if it exists in memory and has not expired
    pub async fn get(&self, key: &str) -> Option<T> {
        let entry = self.entries.lock().get(key).cloned()?;
        let data = entry.lock().await;
        if data.is_unset() || data.is_expired(self.ttl) {
            return None;
        }
        Some(data.get().clone())
    }
}

impl<T, C> fmt::Debug for KeyedCache<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedCache")
            .field("entries", &self.len())
            .field("key_prefix", &self.key_prefix)
            .field("ttl", &self.ttl)
            .field("has_store", &self.store.is_some())
            .field("sweeping", &self.is_sweeping())
            .finish()
    }
}

async fn evict_expired<T, C>(entries: &Mutex<HashMap<String, Entry<T, C>>>, ttl: Ttl) -> usize
where
    T: Send + Sync,
    C: Send + Sync,
{
    if ttl == Ttl::Forever {
        return 0;
    }

    // Entries locked by an in-flight call are being refreshed; leave them be.
    let candidates: Vec<(String, Entry<T, C>)> = entries
        .lock()
        .iter()
        .filter(|(_, entry)| entry.try_lock().is_ok_and(|data| data.is_expired(ttl)))
        .map(|(key, entry)| (key.clone(), Arc::clone(entry)))
        .collect();

    let mut evicted = 0;
    for (key, entry) in candidates {
        // Entries stay mapped while their store copy is deleted, so a caller
        // asking for the key meanwhile queues on this lock instead of
        // creating a second entry whose write the delete could clobber.
        let data = entry.lock().await;
        if !data.is_expired(ttl) || !is_mapped(entries, &key, &entry) {
            continue;
        }

        if let Err(err) = data.delete().await {
            tracing::warn!(key = %key, error = %err, "failed to delete evicted entry from store");
        }

        let mut map = entries.lock();
        // Map plus this loop. Any other holder is about to use the entry.
        if is_same(map.get(&key), &entry) && Arc::strong_count(&entry) == 2 {
            map.remove(&key);
            evicted += 1;
        }
    }

    if evicted > 0 {
        tracing::debug!(evicted, "evicted expired entries");
    }
    evicted
}

fn is_mapped<T, C>(entries: &Mutex<HashMap<String, Entry<T, C>>>, key: &str, entry: &Entry<T, C>) -> bool {
    is_same(entries.lock().get(key), entry)
}

fn is_same<T, C>(current: Option<&Entry<T, C>>, entry: &Entry<T, C>) -> bool {
    current.is_some_and(|current| Arc::ptr_eq(current, entry))
}

async fn run_sweep<T, C>(entries: Entries<T, C>, ttl: Ttl, every: Duration, mut shutdown: watch::Receiver<bool>)
where
    T: Send + Sync,
    C: Send + Sync,
{
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let every_ms = u64::try_from(every.as_millis()).unwrap_or(u64::MAX);
    tracing::info!(every_ms, ?ttl, "eviction sweep started");

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                evict_expired(&entries, ttl).await;
            }
        }
    }

    tracing::info!("eviction sweep stopped");
}
