//! Weather Storage - Storage Tiers and Lookup Orchestration
//!
//! Three tiers sit in front of the origin provider:
//!
//! - [`FastCache`]: TTL-bounded key/value cache, the first stop for every lookup
//! - [`EventLog`]: durable "latest fetch" pointer per city
//! - [`ObjectStore`]: snapshot payloads addressed by city and fetch time
//!
//! [`LookupOrchestrator`] checks them in that order, calls the origin only on a
//! full miss, and writes the fresh snapshot back through every tier.

pub mod cache;
pub mod event_log;
pub mod lookup;
pub mod object_store;

pub use cache::{
    cache_key, CacheStats, FastCache, InMemoryFastCache, LmdbCacheError, LmdbFastCache,
    DEFAULT_CACHE_PREFIX,
};
pub use event_log::{EventLog, InMemoryEventLog, SqliteEventLog};
pub use lookup::{LookupOrchestrator, LookupOutcome, LookupSource, SecondChanceMiss, WriteThrough};
pub use object_store::{FsObjectStore, InMemoryObjectStore, ObjectStore};
