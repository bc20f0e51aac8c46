//! The cache engine.
//!
//! A keyed store of [`Record`]s with memcached expiration semantics, atomic
//! numeric and string mutations, and capacity-bounded eviction run by a
//! background [`PurgeWorker`].
//!
//! ```
//! use embercache::cache::{Cache, CacheConfig};
//! use bytes::Bytes;
//!
//! let cache = Cache::new(CacheConfig::Unbounded);
//! cache.set("greeting", Bytes::from("hello"), 0, 0);
//! assert_eq!(cache.get("greeting"), Some(Bytes::from("hello")));
//! ```

pub mod memory;
pub mod purge;
pub mod record;
pub mod store;

#[cfg(test)]
mod property_tests;

pub use purge::PurgeWorker;
pub use record::Record;
pub use store::{Cache, CacheConfig};
