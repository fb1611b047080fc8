//! A recording store with failure injection, for exercising error paths.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::StoreError;
use crate::memory::MemoryStore;
use crate::store::{Store, StoredValue};

/// A store operation as seen by [`MockStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Get(String),
    Set { key: String, raw: Vec<u8> },
    Delete(String),
}

type FailPredicate = Box<dyn Fn(&StoreOp) -> bool + Send + Sync>;

/// An in-memory store that records every call and can be told to fail.
///
/// ```ignore
/// use memocache::testing::{MockStore, StoreOp};
/// use memocache::Store;
///
/// # async fn example() {
/// let store = MockStore::new();
/// store.fail_when(|op| matches!(op, StoreOp::Set { .. }));
/// assert!(store.set("key", b"raw").await.is_err());
/// assert_eq!(store.operations().len(), 1);
/// # }
/// ```
#[derive(Clone, Default)]
pub struct MockStore {
    inner: MemoryStore,
    operations: Arc<Mutex<Vec<StoreOp>>>,
    fail_when: Arc<Mutex<Option<FailPredicate>>>,
}

impl std::fmt::Debug for MockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockStore")
            .field("inner", &self.inner)
            .field("operations", &self.operations)
            .field("fail_when", &self.fail_when.lock().is_some())
            .finish()
    }
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backing map, for seeding values or inspecting writes
    pub fn memory(&self) -> &MemoryStore {
        &self.inner
    }

    /// Fails every operation matching `predicate`, replacing any earlier predicate
    pub fn fail_when<F>(&self, predicate: F)
    where
        F: Fn(&StoreOp) -> bool + Send + Sync + 'static,
    {
        *self.fail_when.lock() = Some(Box::new(predicate));
    }

    pub fn fail_all(&self) {
        self.fail_when(|_| true);
    }

    pub fn stop_failing(&self) {
        *self.fail_when.lock() = None;
    }

    /// All operations so far, in call order, including failed ones
    pub fn operations(&self) -> Vec<StoreOp> {
        self.operations.lock().clone()
    }

    pub fn clear_operations(&self) {
        self.operations.lock().clear();
    }

    fn record(&self, op: StoreOp) -> Result<(), StoreError> {
        let fail = self
            .fail_when
            .lock()
            .as_ref()
            .is_some_and(|predicate| predicate(&op));
        let result = if fail {
            Err(StoreError::backend(format!("injected failure: {op:?}")))
        } else {
            Ok(())
        };
        self.operations.lock().push(op);
        result
    }
}

#[async_trait]
impl Store for MockStore {
    async fn get(&self, key: &str) -> Result<Option<StoredValue>, StoreError> {
        self.record(StoreOp::Get(key.to_string()))?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, raw: &[u8]) -> Result<(), StoreError> {
        self.record(StoreOp::Set {
            key: key.to_string(),
            raw: raw.to_vec(),
        })?;
        self.inner.set(key, raw).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.record(StoreOp::Delete(key.to_string()))?;
        self.inner.delete(key).await
    }
}
