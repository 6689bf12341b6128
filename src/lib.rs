//! EmberDB - a paged storage core with a two-tier heat-based page cache.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         EmberDB                             │
//! │  ┌─────────────────────────────────────────────────────┐   │
//! │  │               Clients (e.g. an index)               │   │
//! │  │        program against the PageCache trait          │   │
//! │  └─────────────────────────────────────────────────────┘   │
//! │                            ↓                                │
//! │  ┌─────────────────────────────────────────────────────┐   │
//! │  │            Page Cache (cache/)                      │   │
//! │  │   ┌──────────────┐  promote  ┌──────────────┐       │   │
//! │  │   │   hot tier   │ ◀───────  │  cold tier   │       │   │
//! │  │   │  (by heat)   │  ───────▶ │  (admission) │       │   │
//! │  │   └──────────────┘  demote   └──────────────┘       │   │
//! │  │     TieredPageCache + PageFrame + PageGuard         │   │
//! │  └─────────────────────────────────────────────────────┘   │
//! │                            ↓                                │
//! │  ┌─────────────────────────────────────────────────────┐   │
//! │  │            Storage Layer (storage/)                 │   │
//! │  │              HeapFile + Page                        │   │
//! │  └─────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Clients obtain a page via `new_page` or `fetch_page`, receive it
//! pinned with an upgradeable lock held, read or write the bytes
//! through the returned [`PageGuard`], and release it by dropping the
//! guard. The engine owns admission, tier placement, and write-back;
//! clients never touch the backing file.
//!
//! # Modules
//! - [`common`] - Shared primitives (PageId, Error, config)
//! - [`storage`] - Heap file I/O and the page buffer
//! - [`cache`] - The two-tier page cache engine
//!
//! # Quick Start
//! ```no_run
//! use emberdb::{CacheConfig, TieredPageCache};
//!
//! let cache = TieredPageCache::open(CacheConfig {
//!     create: true,
//!     ..CacheConfig::new("my_database.heap")
//! }).unwrap();
//!
//! let mut guard = cache.new_page().unwrap();
//! guard.with_mut(|bytes| bytes[0] = 0xAB);
//! ```

pub mod cache;
pub mod common;
pub mod storage;

// Re-export commonly used items at crate root for convenience
pub use cache::{
    CacheConfig, CacheStats, CacheStatsSnapshot, PageCache, PageFrame, PageGuard, TieredPageCache,
};
pub use common::config::DEFAULT_PAGE_SIZE;
pub use common::{Error, PageId, Result};
pub use storage::{HeapFile, Page};
