//! A single cached value, optionally mirrored to a [`Store`].

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::codec::{Codec, JsonCodec};
use crate::error::CacheError;
use crate::store::Store;
use crate::ttl::Ttl;

/// One cached value plus the time it was last set.
///
/// The in-memory value is authoritative once set: a failed store write is
/// reported to the caller but never rolls back the in-memory update, so the
/// value stays correct for this process even when the store falls behind.
///
/// `Data` does no locking of its own. Wrappers that share it between tasks
/// keep it behind a `tokio::sync::Mutex`.
pub struct Data<T, C = JsonCodec> {
    value: T,
    last_set: Option<SystemTime>,
    key: String,
    store: Option<Arc<dyn Store>>,
    codec: C,
}

impl<T: Default> Data<T> {
    /// Creates an unset value that syncs to `store` under `key` using JSON
    pub fn new(store: Option<Arc<dyn Store>>, key: impl Into<String>) -> Self {
        Self::with_codec(store, key, JsonCodec)
    }
}

impl<T: Default, C> Data<T, C> {
    /// Creates an unset value with an explicit codec
    pub fn with_codec(store: Option<Arc<dyn Store>>, key: impl Into<String>, codec: C) -> Self {
        Self {
            value: T::default(),
            last_set: None,
            key: key.into(),
            store,
            codec,
        }
    }

    /// Creates an unset value that only lives in memory
    pub fn in_memory(codec: C) -> Self {
        Self::with_codec(None, String::new(), codec)
    }
}

impl<T, C> Data<T, C> {
    /// Returns the current value, which is `T::default()` until first set
    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn last_set(&self) -> Option<SystemTime> {
        self.last_set
    }

    /// True if the value was never set or loaded in this process
    pub fn is_unset(&self) -> bool {
        self.last_set.is_none()
    }

    /// Time since the value was last set.
    ///
    /// `Duration::MAX` while unset, zero if the stored timestamp lies in the future.
    pub fn age(&self) -> Duration {
        match self.last_set {
            Some(last_set) => SystemTime::now()
                .duration_since(last_set)
                .unwrap_or(Duration::ZERO),
            None => Duration::MAX,
        }
    }

    /// Checks freshness against `ttl`; never true for [`Ttl::Forever`]
    pub fn is_expired(&self, ttl: Ttl) -> bool {
        ttl.is_expired(self.age())
    }

    /// Restarts the freshness clock without touching the value or the store
    pub fn reset_ttl(&mut self) {
        self.last_set = Some(SystemTime::now());
    }

    /// Removes the persisted copy, if any. The in-memory value is left as is.
    pub async fn delete(&self) -> Result<(), CacheError> {
        match &self.store {
            Some(store) => store.delete(&self.key).await.map_err(CacheError::External),
            None => Ok(()),
        }
    }
}

impl<T, C: Codec<T>> Data<T, C> {
    /// Populates the value from the store.
    ///
    /// A no-op if the value is already set or no store is attached, so it is
    /// safe to call before every read. A store miss leaves the value unset and
    /// is not an error. On success `last_set` is the store's write time, not
    /// the load time.
    pub async fn load(&mut self) -> Result<(), CacheError> {
        if !self.is_unset() {
            return Ok(());
        }
        let Some(store) = &self.store else {
            return Ok(());
        };

        let Some(stored) = store.get(&self.key).await? else {
            tracing::debug!(key = %self.key, "nothing stored yet");
            return Ok(());
        };

        let value = self
            .codec
            .decode(&stored.raw)
            .map_err(CacheError::NotSerializable)?;
        self.value = value;
        self.last_set = Some(stored.last_set);
        let age_ms = u64::try_from(self.age().as_millis()).unwrap_or(u64::MAX);
        tracing::debug!(key = %self.key, age_ms, "loaded from store");
        Ok(())
    }

    /// Replaces the value and, if a store is attached, writes it through.
    ///
    /// The in-memory update always happens. An encode or store failure is
    /// returned but the new value is kept.
    pub async fn set(&mut self, value: T) -> Result<(), CacheError> {
        self.value = value;
        self.last_set = Some(SystemTime::now());

        let Some(store) = &self.store else {
            return Ok(());
        };
        let raw = self.bytes()?;
        store
            .set(&self.key, &raw)
            .await
            .map_err(CacheError::External)
    }

    /// Encodes the current value with the configured codec
    pub fn bytes(&self) -> Result<Vec<u8>, CacheError> {
        self.codec
            .encode(&self.value)
            .map_err(CacheError::NotSerializable)
    }
}

impl<T: fmt::Debug, C> fmt::Debug for Data<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Data")
            .field("key", &self.key)
            .field("value", &self.value)
            .field("last_set", &self.last_set)
            .field("has_store", &self.store.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::testing::{MockStore, StoreOp};

    fn shared(store: &MemoryStore) -> Option<Arc<dyn Store>> {
        Some(Arc::new(store.clone()))
    }

    #[tokio::test]
    async fn test_new_is_unset() {
        let data: Data<String> = Data::new(None, "key");
        assert!(data.is_unset());
        assert!(data.is_expired(Ttl::from_millis(1)));
        assert!(!data.is_expired(Ttl::Forever));
        assert_eq!(data.get(), "");
    }

    #[tokio::test]
    async fn test_set_then_load_into_fresh_instance() {
        let store = MemoryStore::new();
        let mut first: Data<Vec<u32>> = Data::new(shared(&store), "numbers");
        first.set(vec![1, 2, 3]).await.unwrap();
        let written_at = store.get("numbers").await.unwrap().unwrap().last_set;

        tokio::time::sleep(Duration::from_millis(20)).await;

        let mut second: Data<Vec<u32>> = Data::new(shared(&store), "numbers");
        let load_started = SystemTime::now();
        second.load().await.unwrap();
        assert_eq!(second.get(), &vec![1, 2, 3]);
        // freshness follows the store's write time, not the load
        assert_eq!(second.last_set(), Some(written_at));
        assert!(written_at < load_started);
        assert!(second.is_expired(Ttl::from_millis(10)));
        assert!(!second.is_expired(Ttl::Forever));
    }

    #[tokio::test]
    async fn test_load_miss_is_not_an_error() {
        let store = MemoryStore::new();
        let mut data: Data<String> = Data::new(shared(&store), "missing");
        data.load().await.unwrap();
        assert!(data.is_unset());
    }

    #[tokio::test]
    async fn test_load_is_noop_once_set() {
        let store = MockStore::new();
        let mut data: Data<String> = Data::new(Some(Arc::new(store.clone())), "key");
        data.set("local".to_string()).await.unwrap();
        data.load().await.unwrap();

        assert_eq!(data.get(), "local");
        assert_eq!(
            store.operations(),
            vec![StoreOp::Set {
                key: "key".to_string(),
                raw: b"\"local\"".to_vec()
            }]
        );
    }

    #[tokio::test]
    async fn test_load_store_error_leaves_value_unset() {
        let store = MockStore::new();
        store.fail_when(|op| matches!(op, StoreOp::Get(_)));
        let mut data: Data<String> = Data::new(Some(Arc::new(store)), "key");

        let err = data.load().await.unwrap_err();
        assert!(matches!(err, CacheError::External(_)));
        assert!(data.is_unset());
    }

    #[tokio::test]
    async fn test_load_decode_error_leaves_value_unset() {
        let store = MemoryStore::new();
        store.set("key", b"not json").await.unwrap();
        let mut data: Data<u32> = Data::new(shared(&store), "key");

        let err = data.load().await.unwrap_err();
        assert!(matches!(err, CacheError::NotSerializable(_)));
        assert!(data.is_unset());
        assert_eq!(*data.get(), 0);
    }

    #[tokio::test]
    async fn test_failed_store_write_keeps_memory_value() {
        let store = MockStore::new();
        store.fail_when(|op| matches!(op, StoreOp::Set { .. }));
        let mut data: Data<String> = Data::new(Some(Arc::new(store.clone())), "key");

        let err = data.set("fresh".to_string()).await.unwrap_err();
        assert!(matches!(err, CacheError::External(_)));
        assert_eq!(data.get(), "fresh");
        assert!(!data.is_unset());
    }

    #[tokio::test]
    async fn test_reset_ttl_extends_freshness_without_store_write() {
        let store = MockStore::new();
        let mut data: Data<u32> = Data::new(Some(Arc::new(store.clone())), "key");
        data.set(1).await.unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(data.is_expired(Ttl::from_millis(20)));

        data.reset_ttl();
        assert!(!data.is_expired(Ttl::from_millis(20)));
        assert_eq!(store.operations().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_removes_persisted_copy() {
        let store = MemoryStore::new();
        let mut data: Data<u32> = Data::new(shared(&store), "key");
        data.set(5).await.unwrap();
        assert!(store.contains("key"));

        data.delete().await.unwrap();
        assert!(!store.contains("key"));
        assert_eq!(*data.get(), 5);
    }

    #[tokio::test]
    async fn test_in_memory_never_touches_a_store() {
        let mut data: Data<u32> = Data::in_memory(JsonCodec);
        data.load().await.unwrap();
        data.set(9).await.unwrap();
        assert_eq!(*data.get(), 9);
        assert_eq!(data.key(), "");
    }
}
