//! A process-local [`Store`](crate::Store) over a shared map.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::StoreError;
use crate::store::{Store, StoredValue};

/// A process-local [`Store`].
///
/// Clones share the same map, so one `MemoryStore` can stand in for an
/// external service across several caches, or act as a fast first tier of a
/// [`MultiStore`](crate::MultiStore).
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: Arc<Mutex<HashMap<String, StoredValue>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a value with an arbitrary write time
    pub fn insert_at(&self, key: impl Into<String>, raw: impl Into<Vec<u8>>, last_set: SystemTime) {
        self.values
            .lock()
            .insert(key.into(), StoredValue::new(raw.into(), last_set));
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.lock().is_empty()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<StoredValue>, StoreError> {
        Ok(self.values.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, raw: &[u8]) -> Result<(), StoreError> {
        self.insert_at(key, raw, SystemTime::now());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.values.lock().remove(key);
        Ok(())
    }
}
