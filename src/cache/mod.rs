//! The two-tier page cache.
//!
//! The cache is the in-memory layer between clients and the heap file.
//! It memoizes pages in two recency-ordered tiers, promotes and demotes
//! them by heat score, and writes dirty pages back before they leave
//! memory.
//!
//! # Components
//! - [`TieredPageCache`] - The engine
//! - [`PageCache`] - The abstract contract clients program against
//! - [`PageFrame`] - An in-memory page plus pin count and dirty flag
//! - [`PageGuard`] - RAII handle for a pinned page
//! - [`CacheConfig`] - Per-engine configuration
//! - [`CacheStats`] - Performance statistics

mod config;
mod frame;
mod guard;
mod stats;
mod tier;
mod tiered_cache;
mod traits;

pub use config::CacheConfig;
pub use frame::PageFrame;
pub use guard::PageGuard;
pub use stats::{CacheStats, CacheStatsSnapshot};
pub use tiered_cache::TieredPageCache;
pub use traits::PageCache;
