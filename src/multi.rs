//! Several stores behind one [`Store`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::store::{Store, StoredValue};

/// Fans reads and writes out over an ordered list of stores.
///
/// Reads return the first value younger than `expire`, trying stores in
/// order and skipping over any that fail. Writes and deletes go to every
/// store; failures are collected into a single [`StoreError::Multi`].
#[derive(Clone)]
pub struct MultiStore {
    stores: Vec<Arc<dyn Store>>,
    expire: Duration,
}

impl MultiStore {
    /// Creates an empty composite whose reads only accept values younger than `expire`
    pub fn new(expire: Duration) -> Self {
        Self {
            stores: Vec::new(),
            expire,
        }
    }

    /// Appends a store, builder style
    pub fn with_store(mut self, store: Arc<dyn Store>) -> Self {
        self.push(store);
        self
    }

    pub fn push(&mut self, store: Arc<dyn Store>) {
        self.stores.push(store);
    }

    pub fn expire(&self) -> Duration {
        self.expire
    }

    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }
}

impl fmt::Debug for MultiStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiStore")
            .field("stores", &self.stores.len())
            .field("expire", &self.expire)
            .finish()
    }
}

fn joined(errs: Vec<String>) -> Result<(), StoreError> {
    if errs.is_empty() {
        Ok(())
    } else {
        Err(StoreError::Multi(errs))
    }
}

#[async_trait]
impl Store for MultiStore {
    async fn get(&self, key: &str) -> Result<Option<StoredValue>, StoreError> {
        let mut errs = Vec::new();
        for (index, store) in self.stores.iter().enumerate() {
            match store.get(key).await {
                Ok(Some(stored)) if stored.age() < self.expire => {
                    tracing::debug!(key, store = index, "multi store hit");
                    return Ok(Some(stored));
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::debug!(key, store = index, error = %err, "multi store read failed");
                    errs.push(err.to_string());
                }
            }
        }

        joined(errs)?;
        Ok(None)
    }

    async fn set(&self, key: &str, raw: &[u8]) -> Result<(), StoreError> {
        let mut errs = Vec::new();
        for store in &self.stores {
            if let Err(err) = store.set(key, raw).await {
                errs.push(err.to_string());
            }
        }
        joined(errs)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut errs = Vec::new();
        for store in &self.stores {
            if let Err(err) = store.delete(key).await {
                errs.push(err.to_string());
            }
        }
        joined(errs)
    }
}
