//! RAII guard for pinned pages.
//!
//! A [`PageGuard`] is what clients get back from `new_page` and
//! `fetch_page`: the page arrives pinned with the frame's upgradeable
//! lock held. Reads go straight through the guard; mutation upgrades to
//! the unique lock for its duration. Dropping the guard releases the
//! lock and unpins the page.

use std::ops::Deref;
use std::sync::Arc;

use parking_lot::{ArcRwLockUpgradableReadGuard, ArcRwLockWriteGuard, RawRwLock};

use crate::cache::{PageCache, PageFrame};
use crate::common::PageId;
use crate::storage::Page;

/// A pinned page with its upgradeable lock held.
///
/// While the guard lives, the page cannot be evicted and its bytes
/// cannot change underneath the holder (writers need the unique lock,
/// which the held upgradeable mode excludes).
///
/// Dropping the guard unpins the page; if that was the last pin and the
/// page is dirty, the engine writes it through to the heap file.
///
/// # Example
/// ```ignore
/// let mut guard = cache.new_page()?;
/// guard.with_mut(|bytes| bytes[0] = 0xAB);
/// assert_eq!(guard.bytes()[0], 0xAB);
/// // guard drops: page unpinned, written through
/// ```
pub struct PageGuard<'a> {
    /// The engine, for unpin on drop.
    cache: &'a dyn PageCache,

    /// The pinned frame.
    frame: Arc<PageFrame>,

    /// The held upgradeable lock. Only `None` transiently inside
    /// `with_mut` while the lock is upgraded.
    lock: Option<ArcRwLockUpgradableReadGuard<RawRwLock, Page>>,

    /// Whether this guard mutated the page.
    dirty: bool,
}

impl<'a> PageGuard<'a> {
    pub(crate) fn new(
        cache: &'a dyn PageCache,
        frame: Arc<PageFrame>,
        lock: ArcRwLockUpgradableReadGuard<RawRwLock, Page>,
    ) -> Self {
        Self {
            cache,
            frame,
            lock: Some(lock),
            dirty: false,
        }
    }

    /// The id of the pinned page.
    #[inline]
    pub fn id(&self) -> PageId {
        self.frame.id()
    }

    /// The underlying frame.
    #[inline]
    pub fn frame(&self) -> &Arc<PageFrame> {
        &self.frame
    }

    /// Read the page bytes under the held upgradeable lock.
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        self.lock
            .as_ref()
            .expect("page lock held outside with_mut")
            .as_slice()
    }

    /// Mutate the page bytes under the unique lock.
    ///
    /// Atomically upgrades the held lock, marks the frame dirty while
    /// unique, runs `f`, and downgrades back to the upgradeable mode.
    pub fn with_mut<R>(&mut self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let up = self.lock.take().expect("page lock held outside with_mut");
        let mut unique = ArcRwLockUpgradableReadGuard::upgrade(up);

        // The dirty transition happens under the unique lock.
        self.frame.mark_dirty();
        self.dirty = true;

        let out = f(unique.as_mut_slice());
        self.lock = Some(ArcRwLockWriteGuard::downgrade_to_upgradable(unique));
        out
    }

    /// Mark the page dirty without mutating it through this guard.
    ///
    /// The drop-time unpin will then treat the page as written.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
        self.frame.mark_dirty();
    }
}

impl Deref for PageGuard<'_> {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &[u8] {
        self.bytes()
    }
}

impl Drop for PageGuard<'_> {
    fn drop(&mut self) {
        // Release the lock first: the write-through flush inside
        // unpin_page re-acquires the upgradeable mode.
        self.lock.take();

        if let Err(e) = self.cache.unpin_page(&self.frame, self.dirty) {
            log::error!("unpin of page {} failed: {e}", self.frame.id());
        }
    }
}
