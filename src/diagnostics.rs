//! Point-in-time view of the analyzer's internal state.

use serde::Serialize;

use crate::{cache::CacheStats, index::IndexStatus, resolver::ResolverStats};

/// Index readiness, build counts and cache counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    /// Whether an assembly is loaded
    pub loaded: bool,
    /// Current context generation
    pub generation: u64,
    /// The four lazy indexes of the current snapshot; empty when nothing is loaded
    pub indexes: Vec<IndexStatus>,
    /// Every registered cache
    pub caches: Vec<CacheStats>,
    /// Resolver counters
    pub resolver: ResolverStats,
}

impl Diagnostics {
    /// Status of the index named `name`
    #[must_use]
    pub fn index(&self, name: &str) -> Option<&IndexStatus> {
        self.indexes.iter().find(|status| status.name == name)
    }

    /// Live entries across all caches
    #[must_use]
    pub fn cached_entries(&self) -> usize {
        self.caches.iter().map(|cache| cache.entries).sum()
    }
}
