//! Generation-tagged caches.
//!
//! Every cache entry remembers the [`BinaryContext`](crate::context::BinaryContext) generation
//! it was computed against. Lookups with a different generation treat the entry as absent and
//! drop it, so a query racing a reload can never serve results of the previous assembly. On top
//! of that, every cache registers itself with the context as a [`CacheScope`] and is cleared
//! wholesale whenever the context loads or unloads.

use std::{
    hash::Hash,
    sync::atomic::{AtomicU64, Ordering},
};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// The independently clearable cache groups
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum CacheKind {
    /// Decompiled source text
    Source,
    /// Identifier resolution results
    Resolution,
    /// Search result pages
    Search,
    /// Usage scan progress and results
    Usage,
}

/// Counters of one cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Cache group
    pub kind: CacheKind,
    /// Cache name
    pub name: &'static str,
    /// Live entries
    pub entries: usize,
    /// Lookups answered from the cache
    pub hits: u64,
    /// Lookups that found nothing usable
    pub misses: u64,
}

/// A cache the context clears on every load and unload
pub trait CacheScope: Send + Sync {
    /// The group this cache belongs to
    fn kind(&self) -> CacheKind;

    /// Drops every entry
    fn clear(&self);

    /// Current counters
    fn stats(&self) -> CacheStats;
}

/// A concurrent map whose entries are only valid for the generation they were stored under.
pub struct GenerationCache<K, V> {
    kind: CacheKind,
    name: &'static str,
    entries: DashMap<K, (u64, V)>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<K, V> GenerationCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Creates an empty cache
    #[must_use]
    pub fn new(kind: CacheKind, name: &'static str) -> Self {
        GenerationCache {
            kind,
            name,
            entries: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Returns the entry for `key` if it was stored under `generation`
    pub fn get(&self, key: &K, generation: u64) -> Option<V> {
        // the read guard must be gone before a stale entry can be removed
        let stored = self
            .entries
            .get(key)
            .map(|entry| (entry.0 == generation).then(|| entry.1.clone()));
        let found = match stored {
            Some(Some(value)) => Some(value),
            Some(None) => {
                self.entries.remove_if(key, |_, (stored, _)| *stored != generation);
                None
            }
            None => None,
        };

        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(cache = self.name, generation, "cache hit");
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }

        found
    }

    /// Stores `value` for `key` under `generation`
    pub fn insert(&self, key: K, generation: u64, value: V) {
        self.entries.insert(key, (generation, value));
    }

    /// Returns the entry for `key`, computing and storing it on a miss
    pub fn get_or_insert_with(&self, key: K, generation: u64, compute: impl FnOnce() -> V) -> V {
        if let Some(value) = self.get(&key, generation) {
            return value;
        }

        let value = compute();
        self.insert(key, generation, value.clone());
        value
    }

    /// Number of stored entries, stale ones included
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> CacheScope for GenerationCache<K, V>
where
    K: Eq + Hash + Send + Sync,
    V: Clone + Send + Sync,
{
    fn kind(&self) -> CacheKind {
        self.kind
    }

    fn clear(&self) {
        self.entries.clear();
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            kind: self.kind,
            name: self.name,
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
