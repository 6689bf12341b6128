//! Cache statistics tracking.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Statistics tracked by the page cache.
///
/// All fields are atomic for lock-free, thread-safe updates.
/// Multiple threads can increment counters without locks.
///
/// # Memory Ordering
/// We use `Ordering::Relaxed` for all operations because:
/// - We only need atomicity (no partial updates)
/// - We don't need synchronization between different counters
/// - Statistics are "eventually consistent" - exact ordering doesn't matter
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Number of `fetch_page` calls that found the page in a tier.
    pub hits: AtomicU64,

    /// Number of `fetch_page` calls that had to read from disk.
    pub misses: AtomicU64,

    /// Number of pages inserted via `new_page`.
    pub inserts: AtomicU64,

    /// Number of entries removed from the cache entirely.
    pub evictions: AtomicU64,

    /// Number of cold → hot promotions.
    pub promotions: AtomicU64,

    /// Number of hot → cold demotions.
    pub demotions: AtomicU64,

    /// Number of dirty pages written back to the heap file.
    pub writebacks: AtomicU64,
}

impl CacheStats {
    /// Create a new stats tracker with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Calculate cache hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    /// Get a snapshot of current statistics.
    ///
    /// This returns a non-atomic copy for display/logging.
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            promotions: self.promotions.load(Ordering::Relaxed),
            demotions: self.demotions.load(Ordering::Relaxed),
            writebacks: self.writebacks.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.inserts.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
        self.promotions.store(0, Ordering::Relaxed);
        self.demotions.store(0, Ordering::Relaxed);
        self.writebacks.store(0, Ordering::Relaxed);
    }
}

/// A point-in-time snapshot of cache statistics.
///
/// Unlike `CacheStats`, this is not atomic and can be safely printed,
/// compared, etc.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub evictions: u64,
    pub promotions: u64,
    pub demotions: u64,
    pub writebacks: u64,
}

impl CacheStatsSnapshot {
    /// Calculate cache hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

impl fmt::Display for CacheStatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Stats {{ hits: {}, misses: {}, inserts: {}, evictions: {}, \
             promotions: {}, demotions: {}, writebacks: {}, hit_rate: {:.2}% }}",
            self.hits,
            self.misses,
            self.inserts,
            self.evictions,
            self.promotions,
            self.demotions,
            self.writebacks,
            self.hit_rate() * 100.0
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_new() {
        let stats = CacheStats::new();
        assert_eq!(stats.hits.load(Ordering::Relaxed), 0);
        assert_eq!(stats.misses.load(Ordering::Relaxed), 0);
        assert_eq!(stats.hit_rate(), 0.0);
    }

    #[test]
    fn test_stats_increment() {
        let stats = CacheStats::new();

        stats.hits.fetch_add(7, Ordering::Relaxed);
        stats.misses.fetch_add(3, Ordering::Relaxed);

        assert_eq!(stats.hit_rate(), 0.7);
    }

    #[test]
    fn test_stats_snapshot() {
        let stats = CacheStats::new();
        stats.hits.fetch_add(7, Ordering::Relaxed);
        stats.misses.fetch_add(3, Ordering::Relaxed);
        stats.promotions.fetch_add(2, Ordering::Relaxed);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.hits, 7);
        assert_eq!(snapshot.misses, 3);
        assert_eq!(snapshot.promotions, 2);
        assert_eq!(snapshot.hit_rate(), 0.7);
    }

    #[test]
    fn test_stats_reset() {
        let stats = CacheStats::new();
        stats.hits.fetch_add(100, Ordering::Relaxed);
        stats.writebacks.fetch_add(5, Ordering::Relaxed);

        stats.reset();

        assert_eq!(stats.hits.load(Ordering::Relaxed), 0);
        assert_eq!(stats.writebacks.load(Ordering::Relaxed), 0);
        assert_eq!(stats.hit_rate(), 0.0);
    }

    #[test]
    fn test_stats_display() {
        let stats = CacheStats::new();
        stats.hits.fetch_add(80, Ordering::Relaxed);
        stats.misses.fetch_add(20, Ordering::Relaxed);
        stats.evictions.fetch_add(5, Ordering::Relaxed);

        let snapshot = stats.snapshot();
        let display = format!("{}", snapshot);

        assert!(display.contains("hits: 80"));
        assert!(display.contains("misses: 20"));
        assert!(display.contains("80.00%"));
    }
}
