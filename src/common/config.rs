//! Configuration constants for EmberDB.

/// Default size of a page in bytes (4KB).
///
/// This value is chosen to match:
/// - OS page size on most systems (4096 bytes)
/// - Common database page sizes
///
/// The page size is configurable per engine instance; this is only the
/// default. It must match the size the backing file was created with.
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Default number of entries in the hot tier.
pub const DEFAULT_HOT_CAPACITY: usize = 1024;

/// Default number of entries in the cold tier.
pub const DEFAULT_COLD_CAPACITY: usize = 3072;

/// Default heat score above which a cold entry is promoted to the hot tier.
pub const DEFAULT_PROMOTION_THRESHOLD: f64 = 3.0;

/// Default probability that a newly admitted entry goes straight to the
/// hot tier rather than the cold tier.
pub const DEFAULT_ADMISSION_PROBABILITY: f64 = 0.1;

/// Default probability of forcing a cache miss on `fetch_page`.
///
/// Zero in production; nonzero values are a testing hook.
pub const DEFAULT_FORCE_MISS_PROBABILITY: f64 = 0.0;

/// Number of pages a pressure eviction pass tries to free when the cache
/// reaches its aggregate capacity.
pub const PRESSURE_EVICTION_BATCH: usize = 10;
