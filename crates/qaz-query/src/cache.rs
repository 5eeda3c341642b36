//! Bounded cache of lexical result lists.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use moka::sync::Cache;

use qaz_core::{RetrievalResult, SnapshotId};

/// Cache key: the snapshot generation plus every retrieval parameter.
///
/// Carrying the snapshot id means an entry computed against a replaced
/// snapshot can never be returned for the new one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    snapshot: SnapshotId,
    query: String,
    top_k: usize,
    threshold_bits: u64,
    expand_query: bool,
}

impl CacheKey {
    pub fn new(
        snapshot: SnapshotId,
        query: &str,
        top_k: usize,
        threshold: f64,
        expand_query: bool,
    ) -> Self {
        Self {
            snapshot,
            query: normalize_query(query),
            top_k,
            threshold_bits: threshold.to_bits(),
            expand_query,
        }
    }
}

/// Lowercase and collapse whitespace so trivially different spellings share
/// an entry.
fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Concurrent result cache with hit accounting.
pub struct QueryCache {
    entries: Cache<CacheKey, Arc<Vec<RetrievalResult>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl QueryCache {
    pub fn new(capacity: u64) -> Self {
        Self {
            entries: Cache::new(capacity),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<Arc<Vec<RetrievalResult>>> {
        let found = self.entries.get(key);
        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    pub fn insert(&self, key: CacheKey, results: Arc<Vec<RetrievalResult>>) {
        self.entries.insert(key, results);
    }

    /// Drop every entry. Hit counters are kept.
    pub fn clear(&self) {
        self.entries.invalidate_all();
        self.entries.run_pending_tasks();
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Approximate number of live entries.
    pub fn len(&self) -> u64 {
        self.entries.run_pending_tasks();
        self.entries.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qaz_core::PassageId;

    fn results(n: u64) -> Arc<Vec<RetrievalResult>> {
        Arc::new(
            (0..n)
                .map(|i| RetrievalResult {
                    passage_id: PassageId::Num(i),
                    text: format!("passage {}", i),
                    lexical_score: 1.0,
                    vector_score: None,
                    tokens_sample: Vec::new(),
                })
                .collect(),
        )
    }

    #[test]
    fn test_key_normalizes_query() {
        let snapshot = SnapshotId::new();
        assert_eq!(
            CacheKey::new(snapshot, "  Астана   қаласы ", 5, 0.1, true),
            CacheKey::new(snapshot, "астана қаласы", 5, 0.1, true)
        );
        assert_ne!(
            CacheKey::new(snapshot, "астана", 5, 0.1, true),
            CacheKey::new(snapshot, "астана", 5, 0.0, true)
        );
        assert_ne!(
            CacheKey::new(snapshot, "астана", 5, 0.1, true),
            CacheKey::new(SnapshotId::new(), "астана", 5, 0.1, true)
        );
    }

    #[test]
    fn test_hits_and_misses() {
        let cache = QueryCache::new(16);
        let key = CacheKey::new(SnapshotId::new(), "q", 5, 0.1, true);

        assert!(cache.get(&key).is_none());
        cache.insert(key.clone(), results(2));
        assert_eq!(cache.get(&key).unwrap().len(), 2);

        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.get(&key).is_none());
    }
}
