//! Error types for stores, cached values and read-through calls.

use std::fmt;

/// Boxed error used for codec, key and backend failures
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// An error raised by a backing [`Store`](crate::Store)
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid envelope: {0}")]
    Envelope(#[from] serde_json::Error),

    #[cfg(feature = "redis")]
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    /// Every failure of a fan-out operation, joined in store order
    #[error("errs: {}", .0.join("|"))]
    Multi(Vec<String>),

    #[error("{0}")]
    Backend(BoxError),
}

impl StoreError {
    /// Wraps any backend specific error
    pub fn backend(err: impl Into<BoxError>) -> Self {
        StoreError::Backend(err.into())
    }
}

/// A failure of the caching layer itself, reported apart from producer errors.
///
/// None of these abort a read-through call: the in-memory value stays
/// authoritative and the error is handed back for inspection.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Reading or writing the external store failed; the store may now be out of date
    #[error("could not read/write from the external cache | {0}")]
    External(#[source] StoreError),

    /// The value could not be encoded to or decoded from bytes
    #[error("return type could not be serialized/deserialized | {0}")]
    NotSerializable(#[source] BoxError),

    /// A memoization input could not be converted to a key
    #[error("failed to convert input into valid key | {0}")]
    FailedKey(#[source] BoxError),
}

impl From<StoreError> for CacheError {
    fn from(err: StoreError) -> Self {
        CacheError::External(err)
    }
}

/// A producer failure together with the last known-good value.
///
/// `stale` is the value that was cached before the call (the default value if
/// nothing was ever cached).
pub struct Stale<T, E> {
    pub stale: T,
    pub error: E,
}

impl<T, E> Stale<T, E> {
    /// Drops the stale value and keeps the producer error
    pub fn into_error(self) -> E {
        self.error
    }
}

impl<T, E: fmt::Debug> fmt::Debug for Stale<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stale").field("error", &self.error).finish_non_exhaustive()
    }
}

impl<T, E: fmt::Display> fmt::Display for Stale<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "producer failed, serving stale value: {}", self.error)
    }
}

impl<T, E> std::error::Error for Stale<T, E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
