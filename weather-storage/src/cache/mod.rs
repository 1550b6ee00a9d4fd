//! Fast cache tier.
//!
//! The first stop for every lookup. Entries are JSON-encoded snapshots stored
//! under `"{prefix}:{city}"` with a backend-enforced expiry; a hit here ends
//! the lookup without touching any other tier.
//!
//! Reads never fail: a missing, expired or undecodable entry and a backend
//! outage all look like a miss to the caller. Writes report failure so the
//! orchestrator can record it, but it never fails a lookup over one.

pub mod lmdb_backend;
pub mod memory;
pub mod traits;

pub use lmdb_backend::{LmdbCacheError, LmdbFastCache};
pub use memory::InMemoryFastCache;
pub use traits::{cache_key, CacheStats, FastCache, DEFAULT_CACHE_PREFIX};
