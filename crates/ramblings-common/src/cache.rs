//! TTL cache construction over mini-moka's thread-safe cache.
//!
//! Used for content-addressed payloads (blobs are immutable per CID), so a
//! long TTL only bounds memory, never staleness.

use std::hash::Hash;
use std::time::Duration;

pub type Cache<K, V> = mini_moka::sync::Cache<K, V>;

pub fn new_cache<K, V>(max_capacity: u64, ttl: Duration) -> Cache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    mini_moka::sync::Cache::builder()
        .max_capacity(max_capacity)
        .time_to_live(ttl)
        .build()
}
