//! Integration tests for the page cache.
//!
//! These cover cross-component behavior: durability through eviction
//! and restart, accounting invariants, and multi-threaded access.

use std::sync::Arc;
use std::thread;

use emberdb::{CacheConfig, PageCache, PageId, TieredPageCache};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::tempdir;

fn create_cache(
    hot_capacity: usize,
    cold_capacity: usize,
) -> (TieredPageCache, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let config = CacheConfig {
        create: true,
        hot_capacity,
        cold_capacity,
        admission_probability: 0.0,
        ..CacheConfig::new(dir.path().join("test.heap"))
    };
    (TieredPageCache::open(config).unwrap(), dir)
}

/// Data written to pages survives any number of eviction cycles.
#[test]
fn test_data_persistence_across_evictions() {
    let (cache, _dir) = create_cache(1, 1);

    // Create 6 pages with unique data (forces constant eviction).
    let mut page_ids = vec![];
    for i in 0u8..6 {
        let mut guard = cache.new_page().unwrap();
        guard.with_mut(|bytes| {
            bytes[0] = i;
            bytes[1] = i.wrapping_mul(3);
        });
        page_ids.push(guard.id());
    }

    // Read all back - verifies evicted pages were written back.
    for (i, &pid) in page_ids.iter().enumerate() {
        let guard = cache.fetch_page(pid).unwrap();
        assert_eq!(guard.bytes()[0], i as u8);
        assert_eq!(guard.bytes()[1], (i as u8).wrapping_mul(3));
    }
}

/// Flush and reload across engine instances.
#[test]
fn test_flush_and_reload() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.heap");
    let data = b"persistent!";

    let pid;

    // First session: create and write.
    {
        let cache = TieredPageCache::open(CacheConfig {
            create: true,
            ..CacheConfig::new(&path)
        })
        .unwrap();

        let mut guard = cache.new_page().unwrap();
        pid = guard.id();
        guard.with_mut(|bytes| bytes[..data.len()].copy_from_slice(data));
        drop(guard);

        cache.flush_all_pages().unwrap();
    }

    // Second session: verify data.
    {
        let cache = TieredPageCache::open(CacheConfig::new(&path)).unwrap();
        let guard = cache.fetch_page(pid).unwrap();
        assert_eq!(&guard.bytes()[..data.len()], data);
    }
}

/// Engine drop flushes outstanding dirty pages even without an explicit
/// `flush_all_pages` call.
#[test]
fn test_drop_flushes_dirty_pages() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.heap");
    let pid;

    {
        let cache = TieredPageCache::open(CacheConfig {
            create: true,
            ..CacheConfig::new(&path)
        })
        .unwrap();

        let mut guard = cache.new_page().unwrap();
        pid = guard.id();
        guard.with_mut(|bytes| bytes[0] = 0x99);
        // Guard drop write-throughs; engine drop syncs.
    }

    let cache = TieredPageCache::open(CacheConfig::new(&path)).unwrap();
    let guard = cache.fetch_page(pid).unwrap();
    assert_eq!(guard.bytes()[0], 0x99);
}

/// hits + misses equals the number of successful fetch calls, even with
/// constant eviction churn.
#[test]
fn test_stats_account_for_every_fetch() {
    let (cache, _dir) = create_cache(2, 2);

    let ids: Vec<PageId> = (0..8).map(|_| cache.new_page().unwrap().id()).collect();

    let mut fetches = 0u64;
    for _ in 0..3 {
        for &id in &ids {
            drop(cache.fetch_page(id).unwrap());
            fetches += 1;
        }
    }

    let snapshot = cache.stats_snapshot();
    assert_eq!(snapshot.hits + snapshot.misses, fetches);
    assert!(snapshot.misses >= 1); // churn guarantees some misses
}

/// The pin table and the frames' own counters agree while pins are held
/// and after they are released.
#[test]
fn test_pin_table_matches_frame_counts() {
    let (cache, _dir) = create_cache(4, 4);

    let guard_a = cache.new_page().unwrap();
    let guard_b = cache.new_page().unwrap();

    assert_eq!(cache.pin_count_of(guard_a.id()), 1);
    assert_eq!(guard_a.frame().pin_count(), 1);

    cache.pin_page(guard_a.frame());
    assert_eq!(cache.pin_count_of(guard_a.id()), 2);
    assert_eq!(guard_a.frame().pin_count(), 2);

    cache.unpin_page(guard_a.frame(), false).unwrap();
    assert_eq!(cache.pin_count_of(guard_a.id()), 1);
    assert_eq!(guard_a.frame().pin_count(), 1);

    let (a, b) = (guard_a.id(), guard_b.id());
    drop(guard_a);
    drop(guard_b);
    assert_eq!(cache.pin_count_of(a), 0);
    assert_eq!(cache.pin_count_of(b), 0);
}

/// Randomized workload: after everything is unpinned, the tiers are
/// disjoint, nothing is dirty, and no pins are left behind.
#[test]
fn test_randomized_workload_invariants() {
    let dir = tempdir().unwrap();
    let cache = TieredPageCache::open(CacheConfig {
        create: true,
        hot_capacity: 4,
        cold_capacity: 8,
        admission_probability: 0.3,
        promotion_threshold: 2.0,
        ..CacheConfig::new(dir.path().join("test.heap"))
    })
    .unwrap();

    let mut rng = StdRng::seed_from_u64(0xE78B);
    let mut ids: Vec<PageId> = Vec::new();

    for _ in 0..300 {
        if ids.is_empty() || rng.gen_bool(0.3) {
            let mut guard = cache.new_page().unwrap();
            guard.with_mut(|bytes| bytes[0] = guard_byte(&mut rng));
            ids.push(guard.id());
        } else {
            let id = ids[rng.gen_range(0..ids.len())];
            let mut guard = cache.fetch_page(id).unwrap();
            if rng.gen_bool(0.5) {
                guard.with_mut(|bytes| bytes[0] = guard_byte(&mut rng));
            }
        }
    }

    // Tiers are disjoint and within the soft bound (nothing pinned).
    let hot = cache.hot_page_ids();
    let cold = cache.cold_page_ids();
    for id in &hot {
        assert!(!cold.contains(id), "{id} present in both tiers");
    }
    assert!(hot.len() <= 4);
    assert!(cold.len() <= 8);

    // Write-through on unpin left nothing dirty and nothing pinned.
    assert_eq!(cache.dirty_page_count(), 0);
    for &id in &ids {
        assert_eq!(cache.pin_count_of(id), 0);
    }
}

fn guard_byte(rng: &mut StdRng) -> u8 {
    rng.gen()
}

/// Concurrent writers on distinct pages do not interfere.
#[test]
fn test_concurrent_writers_distinct_pages() {
    let (cache, _dir) = create_cache(8, 8);
    let cache = Arc::new(cache);

    let page_ids: Vec<PageId> = (0..4).map(|_| cache.new_page().unwrap().id()).collect();

    let mut handles = vec![];
    for (i, &pid) in page_ids.iter().enumerate() {
        let cache = Arc::clone(&cache);
        handles.push(thread::spawn(move || {
            for j in 0..50u32 {
                let mut guard = cache.fetch_page(pid).unwrap();
                guard.with_mut(|bytes| {
                    bytes[0] = i as u8;
                    bytes[1] = (j % 256) as u8;
                });
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    for (i, &pid) in page_ids.iter().enumerate() {
        let guard = cache.fetch_page(pid).unwrap();
        assert_eq!(guard.bytes()[0], i as u8);
        assert_eq!(guard.bytes()[1], 49);
        assert_eq!(cache.pin_count_of(pid), 0);
    }
}

/// Read-modify-write under `with_mut` is atomic: concurrent increments
/// on one page are never lost.
#[test]
fn test_concurrent_increments_same_page() {
    const THREADS: usize = 4;
    const INCREMENTS: u32 = 25;

    let (cache, _dir) = create_cache(4, 4);
    let cache = Arc::new(cache);

    let pid = cache.new_page().unwrap().id();

    let mut handles = vec![];
    for _ in 0..THREADS {
        let cache = Arc::clone(&cache);
        handles.push(thread::spawn(move || {
            for _ in 0..INCREMENTS {
                let mut guard = cache.fetch_page(pid).unwrap();
                guard.with_mut(|bytes| bytes[0] += 1);
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let guard = cache.fetch_page(pid).unwrap();
    assert_eq!(guard.bytes()[0] as u32, THREADS as u32 * INCREMENTS);
    assert_eq!(cache.pin_count_of(pid), 0);
}

/// The trait object surface works end to end.
#[test]
fn test_page_cache_trait_object() {
    let (cache, _dir) = create_cache(4, 4);
    let cache: &dyn PageCache = &cache;

    assert_eq!(cache.page_size(), 4096);

    let mut guard = cache.new_page().unwrap();
    let id = guard.id();
    guard.with_mut(|bytes| bytes[0] = 0x33);
    drop(guard);

    let guard = cache.fetch_page(id).unwrap();
    assert_eq!(guard.bytes()[0], 0x33);
    drop(guard);

    cache.flush_all_pages().unwrap();
    assert_eq!(cache.size(), 1);
}
