//! Cache Statistics Module
//!
//! Tracks cache performance metrics including hits, misses and expirations.

use serde::Serialize;

// == Cache Stats ==
/// Tracks cache performance metrics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Number of successful cache retrievals
    pub hits: u64,
    /// Number of failed cache retrievals (absent, expired or incomplete)
    pub misses: u64,
    /// Number of entries removed because a read found them expired
    pub lazy_expirations: u64,
    /// Number of documents removed by write-time culls
    pub culled: u64,
    /// Current number of documents in the store, chunks included
    pub total_entries: usize,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    // == Record Hit ==
    /// Increments the hit counter.
    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    // == Record Miss ==
    /// Increments the miss counter.
    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    // == Record Batch ==
    /// Adds `count` hits, as counted by a batch lookup.
    pub fn record_hits(&mut self, count: u64) {
        self.hits += count;
    }

    /// Adds `count` misses, as counted by a batch lookup.
    pub fn record_misses(&mut self, count: u64) {
        self.misses += count;
    }

    // == Record Expirations ==
    /// Adds entries removed because a read found them expired.
    pub fn record_lazy_expirations(&mut self, count: u64) {
        self.lazy_expirations += count;
    }

    // == Record Cull ==
    /// Adds documents removed by a write-time cull.
    pub fn record_culled(&mut self, count: u64) {
        self.culled += count;
    }

    // == Update Entry Count ==
    /// Updates the total document count.
    pub fn set_total_entries(&mut self, count: usize) {
        self.total_entries = count;
    }
}
