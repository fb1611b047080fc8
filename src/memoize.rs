//! Read-through caching per distinct input.

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::cached::{Lookup, ReadOptions, read_through};
use crate::codec::{Codec, JsonCodec, NoCodec};
use crate::error::CacheError;
use crate::fs::FsStore;
use crate::keyed::{JsonKey, KeyStrategy, KeyedCache};
use crate::store::Store;
use crate::ttl::Ttl;

/// Configures a [`Memoized`] function.
///
/// ```no_run
/// use memocache::{FsStore, Memoized, Ttl};
/// use std::sync::Arc;
///
/// # async fn example() {
/// let lookup_team = Memoized::builder(Ttl::from_secs(300))
///     .store(Arc::new(FsStore::new("/tmp/teams", true)))
///     .key_prefix("team-")
///     .build(|id: u64| async move { Ok::<_, std::io::Error>(format!("team {id}")) });
///
/// let name = lookup_team.get(7).await.value;
/// # }
/// ```
pub struct MemoizeBuilder<S = JsonKey, C = JsonCodec> {
    ttl: Ttl,
    store: Option<Arc<dyn Store>>,
    key_prefix: String,
    keys: S,
    codec: C,
    eviction: Option<(Duration, watch::Receiver<bool>)>,
}

impl MemoizeBuilder {
    fn new(ttl: Ttl) -> Self {
        Self {
            ttl,
            store: None,
            key_prefix: String::new(),
            keys: JsonKey,
            codec: JsonCodec,
            eviction: None,
        }
    }
}

impl<S, C> MemoizeBuilder<S, C> {
    /// Mirrors every entry to `store`
    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Prepended to every derived key before it reaches the store
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Replaces the default JSON key derivation
    pub fn key_strategy<S2>(self, keys: S2) -> MemoizeBuilder<S2, C> {
        MemoizeBuilder {
            ttl: self.ttl,
            store: self.store,
            key_prefix: self.key_prefix,
            keys,
            codec: self.codec,
            eviction: self.eviction,
        }
    }

    /// Replaces the default JSON value encoding
    pub fn codec<C2>(self, codec: C2) -> MemoizeBuilder<S, C2> {
        MemoizeBuilder {
            ttl: self.ttl,
            store: self.store,
            key_prefix: self.key_prefix,
            keys: self.keys,
            codec,
            eviction: self.eviction,
        }
    }

    /// Evicts expired entries every `every` until `shutdown` fires
    pub fn eviction(mut self, every: Duration, shutdown: watch::Receiver<bool>) -> Self {
        self.eviction = Some((every, shutdown));
        self
    }

    /// Wraps `producer`.
    ///
    /// # Panics
    ///
    /// Panics outside of a tokio runtime when eviction is configured.
    pub fn build<K, T, F>(self, producer: F) -> Memoized<K, T, F, S, C>
    where
        T: Default + Send + Sync + 'static,
        C: Clone + Send + Sync + 'static,
    {
        let cache = match self.eviction {
            Some((every, shutdown)) => KeyedCache::with_eviction(
                self.store,
                self.key_prefix,
                self.ttl,
                self.codec,
                every,
                shutdown,
            ),
            None => KeyedCache::new(self.store, self.key_prefix, self.ttl, self.codec),
        };
        Memoized {
            cache,
            keys: self.keys,
            producer,
            _input: PhantomData,
        }
    }
}

impl<S: fmt::Debug, C: fmt::Debug> fmt::Debug for MemoizeBuilder<S, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoizeBuilder")
            .field("ttl", &self.ttl)
            .field("key_prefix", &self.key_prefix)
            .field("keys", &self.keys)
            .field("codec", &self.codec)
            .field("eviction", &self.eviction.as_ref().map(|(every, _)| every))
            .finish()
    }
}

/// A producer memoized per input.
///
/// Each distinct derived key owns its own cached value and freshness clock.
/// Calls for the same key are serialized; calls for different keys run
/// independently.
pub struct Memoized<K, T, F, S = JsonKey, C = JsonCodec> {
    cache: KeyedCache<T, C>,
    keys: S,
    producer: F,
    _input: PhantomData<fn(K)>,
}

impl Memoized<(), (), ()> {
    /// Starts configuring a memoized function
    pub fn builder(ttl: Ttl) -> MemoizeBuilder {
        MemoizeBuilder::new(ttl)
    }
}

impl<K, T, F> Memoized<K, T, F, JsonKey, NoCodec>
where
    T: Default + Send + Sync + 'static,
{
    /// Memoizes `producer` in memory only
    pub fn in_memory(ttl: Ttl, producer: F) -> Self {
        Memoized::builder(ttl).codec(NoCodec).build(producer)
    }
}

impl<K, T, F> Memoized<K, T, F>
where
    T: Default + Send + Sync + 'static,
{
    /// Memoizes `producer` with one file per input under `dir`.
    ///
    /// File names are [`safe_key`](crate::safe_key) encodings of the derived keys.
    pub fn on_disk(dir: impl Into<PathBuf>, ttl: Ttl, producer: F) -> Self {
        Memoized::builder(ttl)
            .store(Arc::new(FsStore::new(dir, true)))
            .build(producer)
    }
}

impl<K, T, F, S, C> Memoized<K, T, F, S, C> {
    pub fn ttl(&self) -> Ttl {
        self.cache.ttl()
    }

    /// Number of inputs currently cached
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// The underlying keyed cache
    pub fn cache(&self) -> &KeyedCache<T, C> {
        &self.cache
    }
}

impl<K, T, F, S, C, Fut, E> Memoized<K, T, F, S, C>
where
    T: Default + Clone,
    C: Codec<T> + Clone,
    S: KeyStrategy<K>,
    F: Fn(K) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    /// Returns the cached value for `input`, recomputing it first if needed.
    ///
    /// If `input` cannot be turned into a key the producer is not invoked and
    /// the default value is returned with a [`CacheError::FailedKey`].
    pub async fn call(&self, input: K, options: ReadOptions) -> Lookup<T, E> {
        let key = match self.keys.derive(&input) {
            Ok(key) => key,
            Err(err) => {
                tracing::warn!(error = %err, "could not derive memoization key");
                return Lookup {
                    value: T::default(),
                    cache_error: Some(CacheError::FailedKey(err)),
                    error: None,
                };
            }
        };

        let entry = self.cache.entry(&key);
        let mut data = entry.lock().await;
        read_through(&mut *data, self.cache.ttl(), options, || (self.producer)(input)).await
    }

    /// Shorthand for `call(input, ReadOptions::default())`
    pub async fn get(&self, input: K) -> Lookup<T, E> {
        self.call(input, ReadOptions::default()).await
    }
}

impl<K, T, F, S, C> fmt::Debug for Memoized<K, T, F, S, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memoized").field("cache", &self.cache).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyed::{KeyWith, Keyer, SelfKey};
    use crate::memory::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_each_input_has_its_own_entry() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let square = Memoized::in_memory(Ttl::Forever, move |n: u64| {
            seen.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, String>(n * n) }
        });

        assert_eq!(square.get(3).await.value, 9);
        assert_eq!(square.get(4).await.value, 16);
        assert_eq!(square.get(3).await.value, 9);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(square.len(), 2);
    }

    #[tokio::test]
    async fn test_independent_freshness_per_key() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let memo = Memoized::in_memory(Ttl::from_millis(40), move |n: u32| {
            let call = seen.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, String>((n, call)) }
        });

        assert_eq!(memo.get(1).await.value, (1, 0));
        tokio::time::sleep(Duration::from_millis(25)).await;
        assert_eq!(memo.get(2).await.value, (2, 1));
        tokio::time::sleep(Duration::from_millis(25)).await;

        // key 1 is past its ttl, key 2 is not
        assert_eq!(memo.get(1).await.value, (1, 2));
        assert_eq!(memo.get(2).await.value, (2, 1));
    }

    #[tokio::test]
    async fn test_persists_under_prefixed_json_keys() {
        let store = MemoryStore::new();
        let memo = Memoized::builder(Ttl::Forever)
            .store(Arc::new(store.clone()))
            .key_prefix("greet:")
            .build(|name: String| async move { Ok::<_, String>(format!("hello {name}")) });

        assert_eq!(memo.get("ann".to_string()).await.value, "hello ann");
        assert!(store.contains("greet:\"ann\""));

        // a second memoizer over the same store starts warm
        let warm = Memoized::builder(Ttl::Forever)
            .store(Arc::new(store.clone()))
            .key_prefix("greet:")
            .build(|_: String| async move { Err::<String, _>("should not run") });
        let lookup = warm.get("ann".to_string()).await;
        assert_eq!(lookup.value, "hello ann");
        assert!(lookup.error.is_none());
    }

    struct User {
        id: u32,
    }

    impl Keyer for User {
        fn key(&self) -> String {
            format!("user-{}", self.id)
        }
    }

    #[tokio::test]
    async fn test_self_keyed_inputs() {
        let store = MemoryStore::new();
        let memo = Memoized::builder(Ttl::Forever)
            .store(Arc::new(store.clone()))
            .key_strategy(SelfKey)
            .build(|user: User| async move { Ok::<_, String>(user.id * 10) });

        assert_eq!(memo.get(User { id: 4 }).await.value, 40);
        assert!(store.contains("user-4"));
    }

    #[tokio::test]
    async fn test_failed_key_skips_producer() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let memo = Memoized::builder(Ttl::Forever).codec(NoCodec).build(
            move |_: std::collections::HashMap<(u8, u8), u8>| {
                seen.fetch_add(1, Ordering::SeqCst);
                async move { Ok::<u32, String>(1) }
            },
        );

        let mut input = std::collections::HashMap::new();
        input.insert((1, 2), 3);
        let lookup = memo.get(input).await;
        assert_eq!(lookup.value, 0);
        assert!(matches!(lookup.cache_error, Some(CacheError::FailedKey(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(memo.is_empty());
    }

    #[tokio::test]
    async fn test_closure_keys_and_force_refresh() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let memo = Memoized::builder(Ttl::Forever)
            .codec(NoCodec)
            .key_strategy(KeyWith(|s: &String| s.to_lowercase()))
            .build(move |_: String| {
                let call = seen.fetch_add(1, Ordering::SeqCst);
                async move { Ok::<_, String>(call) }
            });

        assert_eq!(memo.get("A".to_string()).await.value, 0);
        assert_eq!(memo.get("a".to_string()).await.value, 0);
        assert_eq!(memo.call("a".to_string(), ReadOptions::force_refresh()).await.value, 1);
        assert_eq!(memo.len(), 1);
    }

    #[tokio::test]
    async fn test_eviction_drops_expired_inputs() {
        let (shutdown, signal) = watch::channel(false);
        let memo = Memoized::builder(Ttl::from_millis(10))
            .codec(NoCodec)
            .eviction(Duration::from_millis(10), signal)
            .build(|n: u32| async move { Ok::<_, String>(n) });

        memo.get(1).await;
        memo.get(2).await;
        assert_eq!(memo.len(), 2);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(memo.len(), 0);
        shutdown.send(true).unwrap();
    }
}
