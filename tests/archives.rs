// ==============================================
// ARCHIVE BACKEND CONTRACTS (integration)
// ==============================================
//
// Every backend satisfies the same mapping contract; these tests run the
// shared contract over each one, then cover the backend-specific bits:
// concurrent per-key writers for the directory archive, shared databases
// for SQL, and group isolation for datasets.

use std::sync::Arc;

use memokit::prelude::*;
use tempfile::TempDir;

fn key(n: i64) -> CacheKey {
    CacheKey::Raw(ArgValue::Int(n))
}

// ==============================================
// Shared mapping contract
// ==============================================

mod contract {
    use super::*;

    fn exercise(archive: &dyn Archive) {
        assert!(archive.is_empty().unwrap());

        archive.put(&key(1), b"one").unwrap();
        archive.put(&key(2), b"two").unwrap();
        assert_eq!(archive.get(&key(1)).unwrap(), Some(b"one".to_vec()));
        assert_eq!(archive.get(&key(3)).unwrap(), None);
        assert!(archive.contains(&key(2)).unwrap());
        assert_eq!(archive.len().unwrap(), 2);

        // Put is replace.
        archive.put(&key(1), b"uno").unwrap();
        assert_eq!(archive.get(&key(1)).unwrap(), Some(b"uno".to_vec()));
        assert_eq!(archive.len().unwrap(), 2);

        let mut keys = archive.keys().unwrap();
        keys.sort_by_key(|k| k.to_bytes().unwrap());
        assert_eq!(keys.len(), 2);

        assert!(archive.delete(&key(1)).unwrap());
        assert!(!archive.delete(&key(1)).unwrap());
        archive.clear().unwrap();
        assert!(archive.is_empty().unwrap());
    }

    #[test]
    fn memory() {
        exercise(&MemoryArchive::new());
    }

    #[test]
    fn file_blob() {
        let dir = TempDir::new().unwrap();
        exercise(&FileArchive::new(dir.path().join("blob")));
    }

    #[test]
    fn directory_encoded_names() {
        let dir = TempDir::new().unwrap();
        exercise(&DirArchive::new(dir.path().join("store")).unwrap());
    }

    #[test]
    fn directory_fingerprint_names() {
        let dir = TempDir::new().unwrap();
        exercise(
            &DirArchive::with_naming(dir.path().join("store"), KeyNaming::Fingerprint).unwrap(),
        );
    }

    #[test]
    fn sql_table() {
        exercise(&SqlArchive::in_memory("contract").unwrap());
    }

    #[test]
    fn dataset_group() {
        let dir = TempDir::new().unwrap();
        exercise(&DatasetArchive::open(dir.path().join("ds"), "contract").unwrap());
    }

    #[test]
    fn dataset_dir_group() {
        let dir = TempDir::new().unwrap();
        exercise(&DatasetDirArchive::open(dir.path(), "contract").unwrap());
    }

    #[test]
    fn factory_opens_every_backend() {
        let dir = TempDir::new().unwrap();
        let configs = [
            ArchiveConfig::Null,
            ArchiveConfig::Memory,
            ArchiveConfig::File {
                path: dir.path().join("blob"),
            },
            ArchiveConfig::Dir {
                path: dir.path().join("store"),
                naming: KeyNaming::Encoded,
            },
            ArchiveConfig::Sql {
                database: ":memory:".into(),
                table: "factory".into(),
            },
            ArchiveConfig::Dataset {
                path: dir.path().join("ds"),
                group: "factory".into(),
            },
            ArchiveConfig::DatasetDir {
                root: dir.path().join("ds_dir"),
                group: "factory".into(),
            },
        ];
        for config in &configs {
            let archive = open_archive(config).unwrap();
            archive.put(&key(1), b"x").unwrap();
            // Null discards; every other backend stores.
            if archive.is_null() {
                assert_eq!(archive.get(&key(1)).unwrap(), None);
            } else {
                assert_eq!(archive.get(&key(1)).unwrap(), Some(b"x".to_vec()));
            }
        }
    }
}

// ==============================================
// Directory archive: concurrent per-key writers
// ==============================================

mod dir_concurrency {
    use super::*;

    #[test]
    fn concurrent_writers_commit_distinct_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shared");
        DirArchive::new(&path).unwrap();

        let mut handles = Vec::new();
        for writer in 0..2 {
            let path = path.clone();
            handles.push(std::thread::spawn(move || {
                // Each "process" opens its own handle, as separate
                // processes would.
                let archive = DirArchive::new(&path).unwrap();
                let n = writer as i64;
                archive
                    .put(&key(n), format!("value-{n}").as_bytes())
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let archive = DirArchive::new(&path).unwrap();
        let mut keys = archive.keys().unwrap();
        keys.sort_by_key(|k| k.to_bytes().unwrap());
        assert_eq!(keys.len(), 2);
        for n in 0..2i64 {
            assert_eq!(
                archive.get(&key(n)).unwrap(),
                Some(format!("value-{n}").into_bytes())
            );
        }
    }

    #[test]
    fn many_writers_many_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("busy");
        DirArchive::new(&path).unwrap();

        let mut handles = Vec::new();
        for t in 0..4 {
            let path = path.clone();
            handles.push(std::thread::spawn(move || {
                let archive = DirArchive::new(&path).unwrap();
                for i in 0..25i64 {
                    let n = t * 25 + i;
                    archive.put(&key(n), &n.to_le_bytes()).unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let archive = DirArchive::new(&path).unwrap();
        assert_eq!(archive.len().unwrap(), 100);
    }
}

// ==============================================
// SQL: one database, many tables
// ==============================================

mod sql_sharing {
    use super::*;

    #[test]
    fn two_memos_share_a_database_through_distinct_tables() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("memos.db");
        let db_str = db.to_str().unwrap().to_owned();

        let squares: Arc<dyn Archive> =
            Arc::new(SqlArchive::open(&db_str, "squares").unwrap());
        let cubes: Arc<dyn Archive> = Arc::new(SqlArchive::open(&db_str, "cubes").unwrap());

        let square = MemoBuilder::lru(4)
            .archive(squares.clone())
            .build(|&(x,): &(i64,)| x * x)
            .unwrap();
        let cube = MemoBuilder::lru(4)
            .archive(cubes.clone())
            .build(|&(x,): &(i64,)| x * x * x)
            .unwrap();

        for n in 1..=8i64 {
            square.call(&(n,)).unwrap();
            cube.call(&(n,)).unwrap();
        }
        square.dump().unwrap();
        cube.dump().unwrap();

        // Same keys, different tables, different values.
        assert_eq!(squares.len().unwrap(), cubes.len().unwrap());
        let k = square.key(&(2,)).unwrap();
        assert_ne!(squares.get(&k).unwrap(), cubes.get(&k).unwrap());
    }

    #[test]
    fn registry_rendezvous_by_name() {
        let dir = TempDir::new().unwrap();
        let registry = ArchiveRegistry::new();
        let config = ArchiveConfig::Sql {
            database: dir.path().join("shared.db").display().to_string(),
            table: "results".into(),
        };

        let a = registry.get_or_open("results", &config).unwrap();
        a.put(&key(1), b"from-a").unwrap();

        // A second consumer finds the same live handle.
        let b = registry.get_or_open("results", &config).unwrap();
        assert_eq!(b.get(&key(1)).unwrap(), Some(b"from-a".to_vec()));
    }
}

// ==============================================
// Dataset groups
// ==============================================

mod dataset_groups {
    use super::*;

    #[test]
    fn sibling_groups_do_not_interfere() {
        let dir = TempDir::new().unwrap();
        let base = DatasetArchive::open(dir.path().join("ds"), "alpha").unwrap();
        let beta = base.group("beta").unwrap();

        for n in 0..10i64 {
            base.put(&key(n), b"alpha").unwrap();
        }
        beta.put(&key(0), b"beta").unwrap();

        assert_eq!(base.len().unwrap(), 10);
        assert_eq!(beta.len().unwrap(), 1);
        assert_eq!(beta.get(&key(0)).unwrap(), Some(b"beta".to_vec()));
        assert_eq!(base.get(&key(0)).unwrap(), Some(b"alpha".to_vec()));
    }

    #[test]
    fn memo_over_a_dataset_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ds");

        {
            let archive: Arc<dyn Archive> =
                Arc::new(DatasetArchive::open(&path, "doubles").unwrap());
            let memo = MemoBuilder::lru(4)
                .archive(archive)
                .build(|&(x,): &(i64,)| x * 2)
                .unwrap();
            for n in 0..4i64 {
                memo.call(&(n,)).unwrap();
            }
            memo.dump().unwrap();
        }

        let archive: Arc<dyn Archive> = Arc::new(DatasetArchive::open(&path, "doubles").unwrap());
        let memo = MemoBuilder::lru(4)
            .archive(archive)
            .build(|_: &(i64,)| -> i64 { unreachable!("archive must supply all values") })
            .unwrap();
        memo.load().unwrap();
        for n in 0..4i64 {
            assert_eq!(*memo.call(&(n,)).unwrap(), n * 2);
        }
    }
}
