//! Page frame - an in-memory page plus cache metadata.
//!
//! A [`PageFrame`] holds a [`Page`] plus what the cache needs to manage
//! it: the page id, a pin count for reference counting, and a dirty
//! flag for write-back tracking.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::{
    ArcRwLockUpgradableReadGuard, RawRwLock, RwLock, RwLockReadGuard, RwLockUpgradableReadGuard,
    RwLockWriteGuard,
};

use crate::common::PageId;
use crate::storage::Page;

/// An in-memory frame holding one page.
///
/// Unlike a slot-based pool, frames here are created per page and owned
/// by the tier that caches them; clients hold them alive through
/// `Arc` while pinned.
///
/// # Thread Safety
/// All fields use interior mutability for safe concurrent access:
/// - `data`: `RwLock` with shared / upgradeable / unique modes
/// - `pin_count`: `AtomicU32` for lock-free reference counting
/// - `dirty`: `AtomicBool` for lock-free dirty tracking
///
/// # Lock Protocol
/// Clients hold the **upgradeable** mode for the lifetime of a pin:
/// reads go straight through it, mutation upgrades to the unique mode
/// (setting the dirty flag while unique) and downgrades afterwards.
/// The engine takes the upgradeable mode for write-back, so a page's
/// bytes are stable while they are on their way to disk.
pub struct PageFrame {
    /// Which page this frame holds. Never changes after construction.
    id: PageId,

    /// The page data. Inside an `Arc` so lock guards can own the lock
    /// (see `upgradable_arc`).
    data: Arc<RwLock<Page>>,

    /// Number of active references to this frame.
    pin_count: AtomicU32,

    /// Whether the page has been modified since it was loaded or last
    /// written back.
    dirty: AtomicBool,
}

impl PageFrame {
    /// Create a new zero-filled frame for `id`.
    pub fn new(id: PageId, page_size: usize) -> Self {
        Self {
            id,
            data: Arc::new(RwLock::new(Page::new(page_size))),
            pin_count: AtomicU32::new(0),
            dirty: AtomicBool::new(false),
        }
    }

    /// The page id this frame holds.
    #[inline]
    pub fn id(&self) -> PageId {
        self.id
    }

    // ========================================================================
    // Page access (RwLock)
    // ========================================================================

    /// Acquire a shared lock on the page data.
    #[inline]
    pub fn data(&self) -> RwLockReadGuard<'_, Page> {
        self.data.read()
    }

    /// Acquire a unique lock on the page data.
    #[inline]
    pub fn data_mut(&self) -> RwLockWriteGuard<'_, Page> {
        self.data.write()
    }

    /// Acquire the upgradeable lock on the page data.
    #[inline]
    pub fn upgradable(&self) -> RwLockUpgradableReadGuard<'_, Page> {
        self.data.upgradable_read()
    }

    /// Acquire an owned upgradeable lock on the page data.
    ///
    /// The returned guard keeps the lock alive independently of the
    /// frame borrow; [`PageGuard`](crate::cache::PageGuard) holds one
    /// for the lifetime of a pin.
    #[inline]
    pub fn upgradable_arc(&self) -> ArcRwLockUpgradableReadGuard<RawRwLock, Page> {
        self.data.upgradable_read_arc()
    }

    // ========================================================================
    // Pin count operations (Atomic)
    // ========================================================================

    /// Increment the pin count. Returns the new pin count.
    #[inline]
    pub fn pin(&self) -> u32 {
        self.pin_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Decrement the pin count, saturating at zero.
    /// Returns the new pin count.
    #[inline]
    pub fn unpin(&self) -> u32 {
        let mut current = self.pin_count.load(Ordering::Relaxed);
        loop {
            if current == 0 {
                return 0;
            }
            match self.pin_count.compare_exchange_weak(
                current,
                current - 1,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return current - 1,
                Err(observed) => current = observed,
            }
        }
    }

    /// Get the current pin count.
    #[inline]
    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Relaxed)
    }

    /// Check if the frame is currently pinned.
    #[inline]
    pub fn is_pinned(&self) -> bool {
        self.pin_count() > 0
    }

    // ========================================================================
    // Dirty flag operations (Atomic)
    // ========================================================================

    /// Mark the frame as dirty (modified).
    #[inline]
    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Relaxed);
    }

    /// Clear the dirty flag after a successful write-back.
    #[inline]
    pub fn clear_dirty(&self) {
        self.dirty.store(false, Ordering::Relaxed);
    }

    /// Check if the frame is dirty.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Relaxed)
    }
}
