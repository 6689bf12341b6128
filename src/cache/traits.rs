//! The abstract page cache contract.

use crate::cache::{PageFrame, PageGuard};
use crate::common::{PageId, Result};

/// The contract a page cache exposes to its clients.
///
/// Clients obtain a page via [`new_page`](PageCache::new_page) or
/// [`fetch_page`](PageCache::fetch_page), receive it pinned with the
/// frame's upgradeable lock held, read or mutate the bytes through the
/// guard, and release it by dropping the guard. The cache owns
/// admission, tier placement, and write-back; clients never touch the
/// backing file.
pub trait PageCache {
    /// Allocate a new page and return it pinned and zero-filled.
    fn new_page(&self) -> Result<PageGuard<'_>>;

    /// Fetch page `id`, reading it from the backing file on a miss.
    /// Returns the page pinned.
    fn fetch_page(&self, id: PageId) -> Result<PageGuard<'_>>;

    /// Add a pin to an already-resident page.
    fn pin_page(&self, frame: &PageFrame);

    /// Drop one pin from `frame`, recording `dirty`.
    ///
    /// When the last pin is released on a dirty page it is written
    /// through to the backing file.
    fn unpin_page(&self, frame: &PageFrame, dirty: bool) -> Result<()>;

    /// Write `frame` back to the backing file if dirty.
    ///
    /// The caller must not hold the frame's lock (the cache takes the
    /// upgradeable mode itself for the duration of the write).
    fn flush_page(&self, frame: &PageFrame) -> Result<()>;

    /// Write back every dirty page in the cache and sync the file.
    fn flush_all_pages(&self) -> Result<()>;

    /// Number of pages currently cached across both tiers.
    fn size(&self) -> usize;

    /// The configured page size in bytes.
    fn page_size(&self) -> usize;
}
