//! Two-tier page cache - the core page caching engine.
//!
//! The [`TieredPageCache`] provides:
//! - Page caching between the heap file and memory
//! - Pin-based reference counting
//! - Heat-driven promotion and demotion between a hot and a cold tier
//! - Automatic dirty page write-back

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{ArcRwLockUpgradableReadGuard, ArcRwLockWriteGuard, Mutex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::cache::tier::{CacheEntry, Tier};
use crate::cache::{CacheConfig, CacheStats, CacheStatsSnapshot, PageCache, PageFrame, PageGuard};
use crate::common::config::PRESSURE_EVICTION_BATCH;
use crate::common::{Error, PageId, Result};
use crate::storage::HeapFile;

/// The two-tier page cache engine.
///
/// # Architecture
/// ```text
/// ┌──────────────────────────────────────────────────────────────┐
/// │                      TieredPageCache                         │
/// │  ┌────────────────────────┐  ┌────────────────────────┐      │
/// │  │ hot: Tier              │  │ cold: Tier             │      │
/// │  │ MRU order + id index   │  │ MRU order + id index   │      │
/// │  └────────────────────────┘  └────────────────────────┘      │
/// │        ▲ promote (heat)            │ demote (low heat)       │
/// │        └───────────────────────────┘                         │
/// │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐        │
/// │  │  pin_table   │  │  file        │  │  stats       │        │
/// │  │  Mutex       │  │  Mutex       │  │  atomics     │        │
/// │  └──────────────┘  └──────────────┘  └──────────────┘        │
/// └──────────────────────────────────────────────────────────────┘
/// ```
///
/// New entries are admitted to the hot tier with a small configured
/// probability, otherwise to the cold tier. Every hit updates an
/// entry's heat score (`access_count / ln(Δt + 2)`); a cold entry whose
/// heat exceeds the promotion threshold moves to the hot tier. Hot
/// victims with low heat are demoted to cold rather than discarded, so
/// hot → cold → out is the natural lifecycle. Pinned pages are never
/// evicted, which makes the capacities soft bounds under heavy pinning.
///
/// # Lock Order
/// `file → hot → cold → pin_table → frame`. Every path that can evict
/// (and therefore write back) takes the file mutex first and threads
/// `&mut HeapFile` into the tier helpers, so a tier lock is never held
/// while waiting for the file.
///
/// # Usage
/// ```ignore
/// let cache = TieredPageCache::open(CacheConfig {
///     create: true,
///     ..CacheConfig::new("data.heap")
/// })?;
///
/// let mut guard = cache.new_page()?;
/// guard.with_mut(|bytes| bytes[0] = 0xAB);
/// drop(guard); // unpinned, written through
///
/// let guard = cache.fetch_page(PageId::new(1))?;
/// assert_eq!(guard.bytes()[0], 0xAB);
/// ```
pub struct TieredPageCache {
    /// Handles all heap file I/O.
    file: Mutex<HeapFile>,

    /// Frequently accessed pages.
    hot: Mutex<Tier>,

    /// Recently admitted / less accessed pages.
    cold: Mutex<Tier>,

    /// Pin counts by page id, kept in lockstep with the frames' own
    /// counters. This is what eviction scans consult.
    pin_table: Mutex<HashMap<PageId, u32>>,

    /// Performance statistics.
    stats: CacheStats,

    /// Admission / force-miss randomness. Per-engine, entropy-seeded.
    rng: Mutex<StdRng>,

    /// Cache start time; heat timestamps are milliseconds since this.
    start: Instant,

    page_size: usize,
    hot_capacity: usize,
    cold_capacity: usize,
    promotion_threshold: f64,
    admission_probability: f64,
    force_miss_probability: f64,
}

impl TieredPageCache {
    /// Open a cache over the configured backing file.
    ///
    /// # Errors
    /// Open failures are fatal to the engine and surface directly:
    /// `Error::Io` if the file cannot be created or opened,
    /// `Error::CorruptHeader` on a magic mismatch.
    pub fn open(config: CacheConfig) -> Result<Self> {
        let file = HeapFile::open(&config.path, config.create, config.page_size)?;

        Ok(Self {
            file: Mutex::new(file),
            hot: Mutex::new(Tier::new()),
            cold: Mutex::new(Tier::new()),
            pin_table: Mutex::new(HashMap::new()),
            stats: CacheStats::new(),
            rng: Mutex::new(StdRng::from_entropy()),
            start: Instant::now(),
            page_size: config.page_size,
            hot_capacity: config.hot_capacity,
            cold_capacity: config.cold_capacity,
            promotion_threshold: config.promotion_threshold,
            admission_probability: config.admission_probability,
            force_miss_probability: config.force_miss_probability,
        })
    }

    // ========================================================================
    // Public API: page allocation and lookup
    // ========================================================================

    /// Allocate a new page and return it pinned and zero-filled.
    ///
    /// When the cache has reached its aggregate capacity, a pressure
    /// eviction pass runs first.
    pub fn new_page(&self) -> Result<PageGuard<'_>> {
        let mut file = self.file.lock();

        if self.cached_pages() >= self.hot_capacity + self.cold_capacity {
            let freed = self.evict_under_pressure_locked(&mut file, PRESSURE_EVICTION_BATCH);
            log::debug!("memory pressure: evicted {freed} pages");
        }

        let id = file.allocate()?;
        let frame = Arc::new(PageFrame::new(id, self.page_size));
        let lock = frame.upgradable_arc();

        self.install(&mut file, Arc::clone(&frame));
        self.pin_page(&frame);
        self.stats.inserts.fetch_add(1, Ordering::Relaxed);

        Ok(PageGuard::new(self, frame, lock))
    }

    /// Fetch page `id`, reading from the heap file on a miss.
    ///
    /// # Errors
    /// `Error::InvalidPageId` if `id` is outside the allocated range,
    /// `Error::Io` if the disk read fails. Either way no entry is
    /// installed, and the miss is still counted.
    pub fn fetch_page(&self, id: PageId) -> Result<PageGuard<'_>> {
        if self.force_miss_probability > 0.0
            && self.rng.lock().gen::<f64>() < self.force_miss_probability
        {
            if let Some(guard) = self.fetch_bypassing_cache(id)? {
                return Ok(guard);
            }
            // The page is pinned right now; serve it normally instead.
        }

        if let Some(guard) = self.lookup_hot(id) {
            return Ok(guard);
        }
        if let Some(guard) = self.lookup_cold(id, true) {
            return Ok(guard);
        }

        self.fetch_from_disk(id)
    }

    // ========================================================================
    // Public API: pinning
    // ========================================================================

    /// Add a pin to an already-resident page.
    ///
    /// On the 0 → 1 transition the entry moves to the MRU end of its
    /// tier.
    pub fn pin_page(&self, frame: &PageFrame) {
        let mut hot = self.hot.lock();
        let mut cold = self.cold.lock();

        let new_count = self.pin_tracked(frame);
        if new_count == 1 {
            let id = frame.id();
            if !hot.move_to_front(id) {
                cold.move_to_front(id);
            }
        }
    }

    /// Drop one pin from `frame`, recording `dirty`.
    ///
    /// The pin count never goes below zero. When the last pin is
    /// released on a dirty page, the page is written through to the
    /// heap file immediately.
    pub fn unpin_page(&self, frame: &PageFrame, dirty: bool) -> Result<()> {
        if dirty {
            frame.mark_dirty();
        }

        let id = frame.id();

        // Decide about the write-through while still holding the lock
        // that guards the count.
        let should_flush = {
            let mut pins = self.pin_table.lock();
            let now_zero = match pins.get_mut(&id) {
                Some(count) if *count > 0 => {
                    *count -= 1;
                    frame.unpin();
                    *count == 0
                }
                _ => false,
            };
            if now_zero {
                pins.remove(&id);
                frame.is_dirty()
            } else {
                false
            }
        };

        if should_flush {
            self.flush_page(frame)?;
        }

        Ok(())
    }

    // ========================================================================
    // Public API: flushing
    // ========================================================================

    /// Write `frame` back to the heap file if it is dirty.
    ///
    /// Takes the frame's upgradeable lock for the duration of the
    /// write; the caller must not be holding it.
    pub fn flush_page(&self, frame: &PageFrame) -> Result<()> {
        if !frame.is_dirty() {
            return Ok(());
        }
        let mut file = self.file.lock();
        self.write_back(&mut file, frame)
    }

    /// Write back every dirty page in both tiers, then sync the file.
    ///
    /// Every dirty page is attempted even if some fail; failures
    /// surface as a single [`Error::FlushIncomplete`].
    pub fn flush_all_pages(&self) -> Result<()> {
        let mut file = self.file.lock();

        let mut frames = self.hot.lock().frames();
        frames.extend(self.cold.lock().frames());

        let mut failed = 0usize;
        for frame in frames {
            if let Err(e) = self.write_back(&mut file, &frame) {
                log::error!("flush of page {} failed: {e}", frame.id());
                failed += 1;
            }
        }

        file.sync()?;

        if failed > 0 {
            return Err(Error::FlushIncomplete { failed });
        }
        Ok(())
    }

    // ========================================================================
    // Public API: pressure eviction
    // ========================================================================

    /// Best-effort bulk eviction: free up to `n` unpinned pages,
    /// preferring the cold tier. Returns the number evicted.
    ///
    /// Up to `n / 2` victims come from the cold tier, then up to the
    /// remainder from the hot tier; the scan restarts from the LRU end
    /// after every removal. Dirty victims are written back first.
    pub fn evict_pages_under_pressure(&self, n: usize) -> usize {
        let mut file = self.file.lock();
        self.evict_under_pressure_locked(&mut file, n)
    }

    // ========================================================================
    // Public API: stats and observability
    // ========================================================================

    /// Cache statistics.
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// A point-in-time snapshot of the statistics.
    pub fn stats_snapshot(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    /// Number of pages currently cached across both tiers.
    pub fn size(&self) -> usize {
        self.cached_pages()
    }

    /// The configured page size in bytes.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Hot tier page ids, MRU-first.
    pub fn hot_page_ids(&self) -> Vec<PageId> {
        self.hot.lock().page_ids()
    }

    /// Cold tier page ids, MRU-first.
    pub fn cold_page_ids(&self) -> Vec<PageId> {
        self.cold.lock().page_ids()
    }

    /// Current pin count for `id` (zero when unpinned or not cached).
    pub fn pin_count_of(&self, id: PageId) -> u32 {
        self.pin_table.lock().get(&id).copied().unwrap_or(0)
    }

    /// Number of cached pages whose dirty flag is set.
    pub fn dirty_page_count(&self) -> usize {
        let mut count = self
            .hot
            .lock()
            .frames()
            .iter()
            .filter(|f| f.is_dirty())
            .count();
        count += self
            .cold
            .lock()
            .frames()
            .iter()
            .filter(|f| f.is_dirty())
            .count();
        count
    }

    // ========================================================================
    // Internal: lookup paths
    // ========================================================================

    /// Milliseconds since the cache started.
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Hit path for the hot tier: reorder, bump heat, pin.
    fn lookup_hot(&self, id: PageId) -> Option<PageGuard<'_>> {
        let now = self.now_ms();
        let frame = {
            let mut hot = self.hot.lock();
            let entry = hot.get_mut(id)?;
            entry.touch(now);
            let frame = Arc::clone(&entry.frame);
            hot.move_to_front(id);
            // Pin before releasing the tier lock so no eviction can
            // slip in between.
            self.pin_tracked(&frame);
            frame
        };

        self.stats.hits.fetch_add(1, Ordering::Relaxed);
        let lock = frame.upgradable_arc();
        Some(PageGuard::new(self, frame, lock))
    }

    /// Hit path for the cold tier: reorder, bump heat, pin, and promote
    /// when the new heat clears the threshold.
    fn lookup_cold(&self, id: PageId, allow_promote: bool) -> Option<PageGuard<'_>> {
        let now = self.now_ms();
        let (frame, promote) = {
            let mut cold = self.cold.lock();
            let entry = cold.get_mut(id)?;
            entry.touch(now);
            let frame = Arc::clone(&entry.frame);
            let promote = entry.heat() > self.promotion_threshold;
            cold.move_to_front(id);
            self.pin_tracked(&frame);
            (frame, promote)
        };

        self.stats.hits.fetch_add(1, Ordering::Relaxed);

        if promote && allow_promote {
            self.promote_to_hot(id);
        }

        let lock = frame.upgradable_arc();
        Some(PageGuard::new(self, frame, lock))
    }

    /// Miss path: read the page from the heap file and install it.
    fn fetch_from_disk(&self, id: PageId) -> Result<PageGuard<'_>> {
        let mut file = self.file.lock();

        // The miss may have been filled while we waited for the file
        // lock; serving it as a hit keeps the tiers duplicate-free.
        // Promotion is skipped here because the file mutex is already
        // held.
        if let Some(guard) = self.lookup_hot(id) {
            return Ok(guard);
        }
        if let Some(guard) = self.lookup_cold(id, false) {
            return Ok(guard);
        }

        self.stats.misses.fetch_add(1, Ordering::Relaxed);

        let frame = Arc::new(PageFrame::new(id, self.page_size));
        let lock = frame.upgradable_arc();

        // Read under the unique lock, then downgrade for the caller.
        let mut unique = ArcRwLockUpgradableReadGuard::upgrade(lock);
        if let Err(e) = file.read(id, unique.as_mut_slice()) {
            log::error!("failed to read page {id} from heap file: {e}");
            return Err(e);
        }
        let lock = ArcRwLockWriteGuard::downgrade_to_upgradable(unique);

        self.install(&mut file, Arc::clone(&frame));
        self.pin_page(&frame);

        Ok(PageGuard::new(self, frame, lock))
    }

    /// Force-miss hook: read `id` from disk, replacing any unpinned
    /// cached copy. Returns `None` when the page is pinned and must be
    /// served through the normal lookup instead.
    fn fetch_bypassing_cache(&self, id: PageId) -> Result<Option<PageGuard<'_>>> {
        let mut file = self.file.lock();

        {
            let mut hot = self.hot.lock();
            let mut cold = self.cold.lock();

            if self.pinned(id) {
                return Ok(None);
            }

            // Write back and drop the stale copy so the fresh read
            // stays authoritative.
            for tier in [&mut *hot, &mut *cold] {
                if let Some(entry) = tier.remove(id) {
                    if entry.frame.is_dirty() {
                        if let Err(e) = self.write_back(&mut file, &entry.frame) {
                            log::error!("write-back of page {id} failed: {e}");
                            tier.insert_front(entry);
                            return Ok(None);
                        }
                    }
                    self.pin_table.lock().remove(&id);
                    break;
                }
            }
        }

        self.stats.misses.fetch_add(1, Ordering::Relaxed);

        let frame = Arc::new(PageFrame::new(id, self.page_size));
        let lock = frame.upgradable_arc();

        let mut unique = ArcRwLockUpgradableReadGuard::upgrade(lock);
        if let Err(e) = file.read(id, unique.as_mut_slice()) {
            log::error!("failed to read page {id} from heap file: {e}");
            return Err(e);
        }
        let lock = ArcRwLockWriteGuard::downgrade_to_upgradable(unique);

        self.install(&mut file, Arc::clone(&frame));
        self.pin_page(&frame);

        Ok(Some(PageGuard::new(self, frame, lock)))
    }

    // ========================================================================
    // Internal: admission, promotion, demotion, eviction
    // ========================================================================

    /// Admit a freshly created frame into a tier.
    ///
    /// With the configured probability the entry goes straight to the
    /// hot tier, otherwise to the cold tier. The caller holds the file
    /// mutex (eviction inside the insert may write back).
    fn install(&self, file: &mut HeapFile, frame: Arc<PageFrame>) {
        let entry = CacheEntry::new(frame, self.now_ms());
        let admit_hot = self.rng.lock().gen::<f64>() < self.admission_probability;

        let mut hot = self.hot.lock();
        let mut cold = self.cold.lock();
        debug_assert!(
            !hot.contains(entry.frame.id()) && !cold.contains(entry.frame.id()),
            "page {} admitted twice",
            entry.frame.id()
        );

        if admit_hot {
            self.insert_to_hot(file, &mut hot, &mut cold, entry);
        } else {
            self.insert_to_cold(file, &mut cold, entry);
        }
    }

    /// Insert at the MRU end of the hot tier, evicting first when full.
    fn insert_to_hot(&self, file: &mut HeapFile, hot: &mut Tier, cold: &mut Tier, entry: CacheEntry) {
        if hot.len() >= self.hot_capacity {
            self.evict_from_hot(file, hot, cold);
        }
        hot.insert_front(entry);
    }

    /// Insert at the MRU end of the cold tier, evicting first when full.
    fn insert_to_cold(&self, file: &mut HeapFile, cold: &mut Tier, entry: CacheEntry) {
        if cold.len() >= self.cold_capacity {
            self.evict_one(file, cold);
        }
        cold.insert_front(entry);
    }

    /// Move a cold entry into the hot tier.
    ///
    /// Makes room by first demoting a low-heat hot entry, then by
    /// evicting, before pushing the promoted entry to the MRU end.
    fn promote_to_hot(&self, id: PageId) {
        let mut file = self.file.lock();
        let mut hot = self.hot.lock();
        let mut cold = self.cold.lock();

        // Re-check under the locks; a racing promotion or eviction may
        // have moved the entry already.
        let Some(entry) = cold.remove(id) else {
            return;
        };

        if hot.len() >= self.hot_capacity {
            self.maybe_demote(&mut file, &mut hot, &mut cold);
        }
        if hot.len() >= self.hot_capacity {
            self.evict_from_hot(&mut file, &mut hot, &mut cold);
        }

        hot.insert_front(entry);
        self.stats.promotions.fetch_add(1, Ordering::Relaxed);
    }

    /// Demote the coolest unpinned hot entry whose heat is strictly
    /// below the promotion threshold. Does nothing if none qualifies.
    fn maybe_demote(&self, file: &mut HeapFile, hot: &mut Tier, cold: &mut Tier) -> bool {
        let mut victim: Option<(PageId, f64)> = None;
        for (&id, entry) in hot.iter() {
            if entry.heat() < self.promotion_threshold && !self.pinned(id) {
                let cooler = victim.map_or(true, |(_, heat)| entry.heat() < heat);
                if cooler {
                    victim = Some((id, entry.heat()));
                }
            }
        }

        let Some((id, _)) = victim else {
            return false;
        };
        let Some(entry) = hot.remove(id) else {
            return false;
        };

        self.insert_to_cold(file, cold, entry);
        self.stats.demotions.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Free one hot slot.
    ///
    /// Scans from the LRU end, skipping pinned entries; the first
    /// unpinned victim is written back if dirty, then demoted to the
    /// cold tier when its heat is below the promotion threshold, or
    /// discarded otherwise. A victim whose write-back fails stays in
    /// place and the scan moves on.
    fn evict_from_hot(&self, file: &mut HeapFile, hot: &mut Tier, cold: &mut Tier) -> bool {
        for id in hot.lru_candidates() {
            if self.pinned(id) {
                continue;
            }
            let Some(entry) = hot.get(id) else {
                continue;
            };

            if entry.frame.is_dirty() {
                if let Err(e) = self.write_back(file, &entry.frame) {
                    log::error!("write-back of page {id} failed: {e}");
                    continue;
                }
            }

            let heat = entry.heat();
            let Some(entry) = hot.remove(id) else {
                continue;
            };

            if heat < self.promotion_threshold {
                self.insert_to_cold(file, cold, entry);
                self.stats.demotions.fetch_add(1, Ordering::Relaxed);
            } else {
                self.pin_table.lock().remove(&id);
                self.stats.evictions.fetch_add(1, Ordering::Relaxed);
            }
            return true;
        }
        false
    }

    /// Free one slot in `tier` by discarding the first unpinned victim
    /// from the LRU end, writing it back first if dirty.
    fn evict_one(&self, file: &mut HeapFile, tier: &mut Tier) -> bool {
        for id in tier.lru_candidates() {
            if self.pinned(id) {
                continue;
            }
            let Some(entry) = tier.get(id) else {
                continue;
            };

            if entry.frame.is_dirty() {
                if let Err(e) = self.write_back(file, &entry.frame) {
                    log::error!("write-back of page {id} failed: {e}");
                    continue;
                }
            }

            tier.remove(id);
            self.pin_table.lock().remove(&id);
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
            return true;
        }
        false
    }

    /// Bulk eviction under memory pressure: up to `n / 2` cold victims,
    /// then up to the remainder from the hot tier. The hot phase uses
    /// plain discarding eviction (no demotion — that would refill the
    /// cold tier we just drained).
    fn evict_under_pressure_locked(&self, file: &mut HeapFile, n: usize) -> usize {
        let mut evicted_cold = 0usize;
        {
            let mut cold = self.cold.lock();
            while evicted_cold < n / 2 {
                if !self.evict_one(file, &mut cold) {
                    break;
                }
                evicted_cold += 1;
            }
        }

        let mut evicted_hot = 0usize;
        {
            let mut hot = self.hot.lock();
            while evicted_hot < n - evicted_cold {
                if !self.evict_one(file, &mut hot) {
                    break;
                }
                evicted_hot += 1;
            }
        }

        evicted_cold + evicted_hot
    }

    // ========================================================================
    // Internal: pinning and write-back
    // ========================================================================

    /// Increment the pin table entry and the frame counter together.
    /// Returns the new count.
    fn pin_tracked(&self, frame: &PageFrame) -> u32 {
        let mut pins = self.pin_table.lock();
        let count = pins.entry(frame.id()).or_insert(0);
        *count += 1;
        frame.pin();
        *count
    }

    /// Whether `id` currently has any pins.
    fn pinned(&self, id: PageId) -> bool {
        self.pin_table.lock().get(&id).copied().unwrap_or(0) > 0
    }

    /// Write a dirty frame to the heap file and clear its flag.
    ///
    /// Takes the frame's upgradeable lock so the bytes are stable for
    /// the duration of the write. Only unpinned frames are written back
    /// from eviction paths, so the lock is always free there.
    fn write_back(&self, file: &mut HeapFile, frame: &PageFrame) -> Result<()> {
        let data = frame.upgradable();
        if !frame.is_dirty() {
            return Ok(());
        }
        file.write(frame.id(), data.as_slice())?;
        frame.clear_dirty();
        self.stats.writebacks.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Total cached pages across both tiers.
    fn cached_pages(&self) -> usize {
        let hot = self.hot.lock().len();
        let cold = self.cold.lock().len();
        hot + cold
    }
}

impl PageCache for TieredPageCache {
    fn new_page(&self) -> Result<PageGuard<'_>> {
        TieredPageCache::new_page(self)
    }

    fn fetch_page(&self, id: PageId) -> Result<PageGuard<'_>> {
        TieredPageCache::fetch_page(self, id)
    }

    fn pin_page(&self, frame: &PageFrame) {
        TieredPageCache::pin_page(self, frame)
    }

    fn unpin_page(&self, frame: &PageFrame, dirty: bool) -> Result<()> {
        TieredPageCache::unpin_page(self, frame, dirty)
    }

    fn flush_page(&self, frame: &PageFrame) -> Result<()> {
        TieredPageCache::flush_page(self, frame)
    }

    fn flush_all_pages(&self) -> Result<()> {
        TieredPageCache::flush_all_pages(self)
    }

    fn size(&self) -> usize {
        TieredPageCache::size(self)
    }

    fn page_size(&self) -> usize {
        TieredPageCache::page_size(self)
    }
}

impl Drop for TieredPageCache {
    fn drop(&mut self) {
        if let Err(e) = self.flush_all_pages() {
            log::error!("flush on shutdown failed: {e}");
        }
    }
}
