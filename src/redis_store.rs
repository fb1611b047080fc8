//! Redis backed [`Store`](crate::Store), enabled by the `redis` feature.

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use crate::error::StoreError;
use crate::store::{Envelope, Store, StoredValue, safe_key};

/// A [`Store`] backed by redis.
///
/// Redis cannot report when a key was written, so each value is wrapped in
/// an [`Envelope`] carrying its write time. Keys go through [`safe_key`] and
/// are written without a redis expiry; freshness is decided by the cache.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Connects to `url` (e.g. `redis://127.0.0.1/`)
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::new(conn))
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

/// A nil reply is a clean miss
fn decode(raw: Option<Vec<u8>>) -> Result<Option<StoredValue>, StoreError> {
    raw.map(|raw| Envelope::from_json(&raw).map(StoredValue::from))
        .transpose()
}

#[async_trait]
impl Store for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<StoredValue>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<Vec<u8>> = conn.get(safe_key(key)).await?;
        decode(raw)
    }

    async fn set(&self, key: &str, raw: &[u8]) -> Result<(), StoreError> {
        let payload = Envelope::now(raw).to_json()?;
        let mut conn = self.conn.clone();
        let _: () = conn.set(safe_key(key), payload).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(safe_key(key)).await?;
        Ok(())
    }
}
