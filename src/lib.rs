//! Read-through caching and memoization with TTLs
//!
//! This crate wraps expensive async producers so their results are reused
//! until a time-to-live runs out. Values live in memory and can be mirrored
//! to a persistent [`Store`] (a directory, redis, or several stores at once)
//! so a restarted process starts warm.
//!
//! - [`Cached`] caches a single producer
//! - [`Memoized`] caches one value per distinct input
//! - [`Data`] and [`KeyedCache`] are the building blocks both are made of
//! - [`MultiStore`] combines stores, reading the first fresh copy
//!
//! A failing store never breaks a lookup: calls return the value together
//! with separate cache and producer errors, see [`Lookup`].
//!
//! ```no_run
//! use memocache::{Cached, Ttl};
//!
//! # async fn example() {
//! let teams = Cached::on_disk("/tmp/cache/teams", Ttl::from_secs(60), || async {
//!     Ok::<_, std::io::Error>(vec!["core".to_string(), "infra".to_string()])
//! });
//!
//! let teams = teams.get().await.trace_cache_error().unwrap_or_else(|stale| stale.stale);
//! # }
//! ```

pub mod cached;
pub mod codec;
pub mod config;
pub mod data;
pub mod error;
pub mod fs;
pub mod keyed;
pub mod memoize;
pub mod memory;
pub mod multi;
#[cfg(feature = "redis")]
pub mod redis_store;
pub mod store;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;
pub mod ttl;

pub use cached::{Cached, Lookup, ReadOptions};
pub use codec::{BytesCodec, Codec, JsonCodec, NoCodec, Serializable};
pub use config::CacheConfig;
pub use data::Data;
pub use error::{BoxError, CacheError, Stale, StoreError};
pub use fs::FsStore;
pub use keyed::{Entry, JsonKey, KeyStrategy, KeyWith, KeyedCache, Keyer, SelfKey};
pub use memoize::{MemoizeBuilder, Memoized};
pub use memory::MemoryStore;
pub use multi::MultiStore;
#[cfg(feature = "redis")]
pub use redis_store::RedisStore;
pub use store::{Envelope, Store, StoredValue, safe_key};
pub use ttl::Ttl;
