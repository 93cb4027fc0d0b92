//! # Expiring Caches
//!
//! In-memory key/value stores whose entries expire after a per-entry TTL.
//! Each cache is one namespace owned by the component that creates it (the
//! result cache of a pipeline, the snapshot cache of the fetch strategy);
//! nothing here is process-global.

pub mod ttl_cache;

pub use ttl_cache::{CacheEntry, CacheStats, TtlCache};
