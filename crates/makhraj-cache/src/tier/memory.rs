//! Fast tier: in-process concurrent map.

use dashmap::DashMap;
use time::OffsetDateTime;

use crate::entry::CacheEntry;

/// Result of a fast-tier lookup.
#[derive(Debug)]
pub enum Lookup {
    Hit(CacheEntry),
    /// The key was present but stale; it has been removed.
    Expired,
    Missing,
}

/// In-memory tier keyed by full storage key.
///
/// There is no size bound and no background sweep: stale entries stay until
/// they are read, overwritten or cleared.
#[derive(Debug, Default)]
pub struct MemoryTier {
    map: DashMap<String, CacheEntry>,
}

impl MemoryTier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a key, discarding it if it expired.
    pub fn lookup(&self, key: &str, now: OffsetDateTime) -> Lookup {
        let Some(entry) = self.map.get(key) else {
            return Lookup::Missing;
        };
        if !entry.is_expired(now) {
            return Lookup::Hit(entry.clone());
        }
        drop(entry);
        // Only drop the entry we saw; a concurrent writer may have replaced it.
        self.map.remove_if(key, |_, e| e.is_expired(now));
        Lookup::Expired
    }

    /// Insert an entry, replacing any previous one.
    pub fn insert(&self, key: String, entry: CacheEntry) {
        self.map.insert(key, entry);
    }

    pub fn remove(&self, key: &str) -> bool {
        self.map.remove(key).is_some()
    }

    /// Remove every key starting with `prefix`.
    pub fn remove_prefix(&self, prefix: &str) -> usize {
        let before = self.map.len();
        self.map.retain(|k, _| !k.starts_with(prefix));
        before.saturating_sub(self.map.len())
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
