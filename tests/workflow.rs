// ==============================================
// END-TO-END MEMOIZATION WORKFLOWS (integration)
// ==============================================
//
// Scenarios that exercise the full decorator → cache → archive stack:
// bounded memos demoting to durable storage, promotion on later calls,
// and cache re-hydration in a "fresh process" (a second memo over the
// same archive).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use memokit::prelude::*;
use tempfile::TempDir;

// ==============================================
// LRU with a file archive
// ==============================================

mod lru_with_file_archive {
    use super::*;

    fn square_memo(
        archive: Arc<dyn Archive>,
        calls: &AtomicU64,
    ) -> Memo<(i64,), i64, impl Fn(&(i64,)) -> i64 + '_> {
        MemoBuilder::lru(2)
            .archive(archive)
            .build(move |&(x,): &(i64,)| {
                calls.fetch_add(1, Ordering::SeqCst);
                x * x
            })
            .unwrap()
    }

    #[test]
    fn eviction_demotes_and_archive_supplies_later_calls() {
        let dir = TempDir::new().unwrap();
        let archive: Arc<dyn Archive> = Arc::new(FileArchive::new(dir.path().join("squares.blob")));
        let calls = AtomicU64::new(0);
        let memo = square_memo(archive.clone(), &calls);

        // Fill past capacity: the f(1) entry is demoted to the archive.
        memo.call(&(1,)).unwrap();
        memo.call(&(2,)).unwrap();
        memo.call(&(3,)).unwrap();
        assert_eq!(memo.len(), 2);
        assert_eq!(archive.len().unwrap(), 1);

        // f(1) again: the archive supplies the value, no recompute.
        assert_eq!(*memo.call(&(1,)).unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(memo.info().loads, 1);
        let key1 = memo.key(&(1,)).unwrap();
        assert!(archive.contains(&key1).unwrap());

        // Promotion evicted f(2); the resident set is now {3, 1}.
        let key3 = memo.key(&(3,)).unwrap();
        assert!(memo.cached_keys().contains(&key3));
        assert!(memo.cached_keys().contains(&key1));

        // f(4): victim is f(3) (least recent of {3, 1}); it demotes too.
        memo.call(&(4,)).unwrap();
        assert!(archive.contains(&key3).unwrap());
        assert!(archive.contains(&key1).unwrap());
    }

    #[test]
    fn archive_outlives_the_memo() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("squares.blob");
        let calls = AtomicU64::new(0);

        {
            let archive: Arc<dyn Archive> = Arc::new(FileArchive::new(&path));
            let memo = square_memo(archive, &calls);
            for n in 1..=5i64 {
                memo.call(&(n,)).unwrap();
            }
            memo.dump().unwrap();
        }

        // "Next process": a fresh memo over the same blob recomputes
        // nothing.
        let archive: Arc<dyn Archive> = Arc::new(FileArchive::new(&path));
        let memo = square_memo(archive, &calls);
        let computed_before = calls.load(Ordering::SeqCst);
        for n in 1..=5i64 {
            assert_eq!(*memo.call(&(n,)).unwrap(), n * n);
        }
        assert_eq!(calls.load(Ordering::SeqCst), computed_before);
        assert_eq!(memo.info().loads + memo.info().hits, 5);
    }
}

// ==============================================
// Sync round-trip between two caches
// ==============================================

mod sync_round_trip {
    use super::*;

    #[test]
    fn dump_then_load_reproduces_the_working_set() {
        let dir = TempDir::new().unwrap();
        let archive: Arc<dyn Archive> = Arc::new(DirArchive::new(dir.path().join("sync")).unwrap());

        let first = MemoBuilder::inf()
            .archive(archive.clone())
            .build(|&(x,): &(i64,)| x * 3)
            .unwrap();
        for n in 0..100i64 {
            first.call(&(n,)).unwrap();
        }
        assert_eq!(first.dump().unwrap(), 100);

        // Fresh cache, same archive: load() reproduces keys and values.
        let second = MemoBuilder::inf()
            .archive(archive)
            .build(|&(x,): &(i64,)| -> i64 { unreachable!("archive must supply x={x}") })
            .unwrap();
        assert_eq!(second.load().unwrap(), 100);

        let mut first_keys = first.cached_keys();
        let mut second_keys = second.cached_keys();
        first_keys.sort_by_key(|k| k.to_bytes().unwrap());
        second_keys.sort_by_key(|k| k.to_bytes().unwrap());
        assert_eq!(first_keys, second_keys);

        for n in 0..100i64 {
            assert_eq!(*second.call(&(n,)).unwrap(), n * 3);
        }
        assert_eq!(second.info().hits, 100);
    }
}

// ==============================================
// Pass-through (no_cache) with an archive
// ==============================================

mod pass_through {
    use super::*;

    #[test]
    fn memory_stays_empty_and_archive_sees_every_put() {
        let archive: Arc<dyn Archive> = Arc::new(MemoryArchive::new());
        let memo = MemoBuilder::no_cache()
            .archive(archive.clone())
            .build(|&(x,): &(i64,)| x + 100)
            .unwrap();

        for n in 0..20i64 {
            memo.call(&(n,)).unwrap();
            assert_eq!(memo.len(), 0);
        }
        assert_eq!(archive.len().unwrap(), 20);

        // Re-calls are loads, not recomputes.
        let before = memo.info().misses;
        assert_eq!(*memo.call(&(7,)).unwrap(), 107);
        assert_eq!(memo.info().misses, before);
        assert_eq!(memo.info().loads, 1);
    }
}

// ==============================================
// Policy eviction order through the decorator
// ==============================================

mod policy_eviction_order {
    use super::*;

    #[test]
    fn lru_evicts_first_inserted_under_sequential_fill() {
        let memo = MemoBuilder::lru(3).build(|&(x,): &(i64,)| x).unwrap();
        for n in 1..=4i64 {
            memo.call(&(n,)).unwrap();
        }
        let evicted = memo.key(&(1,)).unwrap();
        assert!(!memo.cached_keys().contains(&evicted));
    }

    #[test]
    fn mru_evicts_last_touched() {
        let memo = MemoBuilder::mru(3).build(|&(x,): &(i64,)| x).unwrap();
        for n in 1..=3i64 {
            memo.call(&(n,)).unwrap();
        }
        memo.call(&(4,)).unwrap();
        // Victim was 3, the most recently used at insert time.
        let evicted = memo.key(&(3,)).unwrap();
        assert!(!memo.cached_keys().contains(&evicted));
        assert!(memo.cached_keys().contains(&memo.key(&(1,)).unwrap()));
    }

    #[test]
    fn lfu_evicts_lowest_count() {
        let memo = MemoBuilder::lfu(3).build(|&(x,): &(i64,)| x).unwrap();
        for n in 1..=3i64 {
            memo.call(&(n,)).unwrap();
        }
        // Boost 1 and 3 with hits; 2 stays at its insert count.
        for _ in 0..5 {
            memo.call(&(1,)).unwrap();
        }
        memo.call(&(3,)).unwrap();
        memo.call(&(4,)).unwrap();
        let evicted = memo.key(&(2,)).unwrap();
        assert!(!memo.cached_keys().contains(&evicted));
    }

    #[test]
    fn rr_keeps_exactly_capacity_entries() {
        let memo = MemoBuilder::rr(4).build(|&(x,): &(i64,)| x).unwrap();
        for n in 0..32i64 {
            memo.call(&(n,)).unwrap();
        }
        assert_eq!(memo.len(), 4);
    }
}

// ==============================================
// Concurrent callers over one memo
// ==============================================

mod concurrency {
    use super::*;

    #[test]
    fn parallel_callers_agree_on_values_and_capacity() {
        let memo = Arc::new(
            MemoBuilder::lru(16)
                .build(|&(x,): &(i64,)| x * 2)
                .unwrap(),
        );

        let mut handles = Vec::new();
        for t in 0..4 {
            let memo = Arc::clone(&memo);
            handles.push(std::thread::spawn(move || {
                for i in 0..200i64 {
                    let x = (i + t) % 32;
                    assert_eq!(*memo.call(&(x,)).unwrap(), x * 2);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(memo.len() <= 16);
        let info = memo.info();
        assert_eq!(info.hits + info.misses, 800);
    }
}
