//! Per-engine cache configuration.

use std::path::PathBuf;

use crate::common::config::{
    DEFAULT_ADMISSION_PROBABILITY, DEFAULT_COLD_CAPACITY, DEFAULT_FORCE_MISS_PROBABILITY,
    DEFAULT_HOT_CAPACITY, DEFAULT_PAGE_SIZE, DEFAULT_PROMOTION_THRESHOLD,
};

/// Configuration for a [`TieredPageCache`](crate::cache::TieredPageCache).
///
/// Only the path is mandatory; everything else has the defaults below.
/// Tests override individual fields with struct-update syntax:
///
/// ```
/// use emberdb::CacheConfig;
///
/// let config = CacheConfig {
///     create: true,
///     hot_capacity: 2,
///     cold_capacity: 4,
///     ..CacheConfig::new("/tmp/example.heap")
/// };
/// assert_eq!(config.page_size, 4096);
/// ```
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Backing file path.
    pub path: PathBuf,

    /// Create (or truncate) the backing file instead of opening an
    /// existing one.
    pub create: bool,

    /// Page size in bytes. Must match the size the file was created with.
    pub page_size: usize,

    /// Capacity of the hot tier, in entries.
    pub hot_capacity: usize,

    /// Capacity of the cold tier, in entries.
    pub cold_capacity: usize,

    /// Heat score above which a cold entry is promoted.
    pub promotion_threshold: f64,

    /// Probability that a new entry is admitted straight into the hot
    /// tier.
    pub admission_probability: f64,

    /// Probability of forcing a cache miss on `fetch_page`. Testing
    /// hook; leave at 0.0 in production.
    pub force_miss_probability: f64,
}

impl CacheConfig {
    /// Configuration with defaults for the given backing file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            create: false,
            page_size: DEFAULT_PAGE_SIZE,
            hot_capacity: DEFAULT_HOT_CAPACITY,
            cold_capacity: DEFAULT_COLD_CAPACITY,
            promotion_threshold: DEFAULT_PROMOTION_THRESHOLD,
            admission_probability: DEFAULT_ADMISSION_PROBABILITY,
            force_miss_probability: DEFAULT_FORCE_MISS_PROBABILITY,
        }
    }
}
