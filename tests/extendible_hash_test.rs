//! End-to-end tests for the disk-backed extendible hash table

use std::sync::Arc;
use std::thread;

use shale::buffer::BufferPoolManager;
use shale::common::{PageId, RecordId, SlotId, INVALID_PAGE_ID};
use shale::index::{ExtendibleHashTable, Fnv1aHash, IdentityHash, IntegerComparator};
use shale::storage::disk::DiskManager;
use shale::storage::page::{HashDirectoryPageRef, HashHeaderPageRef};
use tempfile::NamedTempFile;

fn record(n: u32) -> RecordId {
    RecordId::new(PageId::new(n), SlotId::new(0))
}

fn create_identity_table(
    pool_size: usize,
    bucket_max_size: u32,
) -> (ExtendibleHashTable, Arc<BufferPoolManager>, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    let bpm = Arc::new(BufferPoolManager::new(pool_size, 2, dm));
    let table = ExtendibleHashTable::new(
        Arc::clone(&bpm),
        Box::new(IntegerComparator),
        Box::new(IdentityHash),
        9,
        9,
        bucket_max_size,
    )
    .unwrap();
    (table, bpm, temp_file)
}

/// Reads the global depth of the directory in header slot 0, together
/// with a directory consistency check over the live slots.
fn inspect_directory(bpm: &Arc<BufferPoolManager>, header_page_id: PageId) -> Option<u32> {
    let header_guard = bpm.fetch_page_read(header_page_id).unwrap();
    let directory_page_id = {
        let header = HashHeaderPageRef::new(header_guard.data());
        header.directory_page_id(0)
    };
    if directory_page_id == INVALID_PAGE_ID {
        return None;
    }

    let directory_guard = bpm.fetch_page_read(directory_page_id).unwrap();
    let directory = HashDirectoryPageRef::new(directory_guard.data());
    let global_depth = directory.global_depth();

    // Directory invariants over the live slots
    for i in 0..directory.size() {
        let local_depth = directory.local_depth(i);
        assert!(
            local_depth <= global_depth,
            "slot {}: local depth {} exceeds global depth {}",
            i,
            local_depth,
            global_depth
        );
        let mask = (1u32 << local_depth) - 1;
        for j in 0..directory.size() {
            if j & mask == i & mask {
                assert_eq!(
                    directory.bucket_page_id(j),
                    directory.bucket_page_id(i),
                    "slots {} and {} share a prefix but not a bucket",
                    i,
                    j
                );
                assert_eq!(directory.local_depth(j), local_depth);
            }
        }
    }

    Some(global_depth)
}

#[test]
fn test_hash_table_grows_past_two_bits() {
    // Bucket size 2: keys 0..=4 spread over distinct 2-bit suffixes only
    // after repeated splits
    let (table, bpm, _temp) = create_identity_table(32, 2);

    for key in 0..5u32 {
        assert!(table.insert(key, record(key + 100)).unwrap(), "key {}", key);
    }

    for key in 0..5u32 {
        assert_eq!(
            table.get_value(key).unwrap(),
            Some(record(key + 100)),
            "key {}",
            key
        );
    }

    let global_depth = inspect_directory(&bpm, table.header_page_id()).unwrap();
    assert!(global_depth >= 2, "global depth is {}", global_depth);
}

#[test]
fn test_hash_table_duplicate_and_reinsert() {
    let (table, _bpm, _temp) = create_identity_table(64, 4);

    for key in 0..32u32 {
        assert!(table.insert(key, record(key)).unwrap(), "key {}", key);
    }

    // Duplicate rejected, then remove + reinsert accepted
    assert!(!table.insert(0, record(999)).unwrap());
    assert!(table.remove(0).unwrap());
    assert!(table.insert(0, record(999)).unwrap());
    assert_eq!(table.get_value(0).unwrap(), Some(record(999)));

    for key in 1..32u32 {
        assert_eq!(table.get_value(key).unwrap(), Some(record(key)));
    }
}

#[test]
fn test_hash_table_split_preserves_population() {
    let (table, bpm, _temp) = create_identity_table(64, 4);

    // Enough keys per low-bit group to force several splits
    let keys: Vec<u32> = (0..64).collect();
    for &key in &keys {
        assert!(table.insert(key, record(key * 2)).unwrap(), "key {}", key);
    }

    // No entry is lost or duplicated across the splits
    for &key in &keys {
        assert_eq!(
            table.get_value(key).unwrap(),
            Some(record(key * 2)),
            "key {}",
            key
        );
    }

    inspect_directory(&bpm, table.header_page_id());
}

#[test]
fn test_hash_table_drain_collapses_directory() {
    let (table, bpm, _temp) = create_identity_table(64, 2);

    for key in 0..32u32 {
        assert!(table.insert(key, record(key)).unwrap());
    }

    let grown_depth = inspect_directory(&bpm, table.header_page_id()).unwrap();
    assert!(grown_depth >= 4, "global depth is {}", grown_depth);

    for key in 0..32u32 {
        assert!(table.remove(key).unwrap(), "key {}", key);
    }

    for key in 0..32u32 {
        assert_eq!(table.get_value(key).unwrap(), None);
    }

    // Merges cascade until the directory is flat again
    let drained_depth = inspect_directory(&bpm, table.header_page_id()).unwrap();
    assert_eq!(drained_depth, 0);
}

#[test]
fn test_hash_table_merge_inverts_split() {
    let (table, bpm, _temp) = create_identity_table(32, 2);

    // Keys 0 and 1 share a bucket at depth 0; key 2 splits it
    assert!(table.insert(0, record(0)).unwrap());
    assert!(table.insert(1, record(1)).unwrap());
    assert!(table.insert(2, record(2)).unwrap());

    let split_depth = inspect_directory(&bpm, table.header_page_id()).unwrap();
    assert!(split_depth >= 1);

    // Removing the splitting keys merges back down
    assert!(table.remove(1).unwrap());
    assert!(table.remove(2).unwrap());
    assert!(table.remove(0).unwrap());

    let merged_depth = inspect_directory(&bpm, table.header_page_id()).unwrap();
    assert_eq!(merged_depth, 0);
}

#[test]
fn test_hash_table_random_spread() {
    // The real hash spreads keys across directories and buckets
    let temp_file = NamedTempFile::new().unwrap();
    let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    let bpm = Arc::new(BufferPoolManager::new(128, 2, dm));
    let table = ExtendibleHashTable::new(
        Arc::clone(&bpm),
        Box::new(IntegerComparator),
        Box::new(Fnv1aHash),
        9,
        9,
        8,
    )
    .unwrap();

    for key in 0..500u32 {
        assert!(table.insert(key, record(key)).unwrap(), "key {}", key);
    }

    for key in 0..500u32 {
        assert_eq!(table.get_value(key).unwrap(), Some(record(key)));
    }
    assert_eq!(table.get_value(500).unwrap(), None);

    for key in (0..500u32).step_by(3) {
        assert!(table.remove(key).unwrap());
    }

    for key in 0..500u32 {
        let expected = if key % 3 == 0 { None } else { Some(record(key)) };
        assert_eq!(table.get_value(key).unwrap(), expected, "key {}", key);
    }
}

#[test]
fn test_hash_table_concurrent_disjoint_inserts() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    let bpm = Arc::new(BufferPoolManager::new(128, 2, dm));
    let table = Arc::new(
        ExtendibleHashTable::new(
            Arc::clone(&bpm),
            Box::new(IntegerComparator),
            Box::new(Fnv1aHash),
            9,
            9,
            16,
        )
        .unwrap(),
    );

    let handles: Vec<_> = (0..2u32)
        .map(|t| {
            let table = Arc::clone(&table);
            thread::spawn(move || {
                for i in 0..1000u32 {
                    let key = t * 1000 + i;
                    assert!(table.insert(key, record(key)).unwrap(), "key {}", key);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    // Every inserted key maps to exactly its value
    for key in 0..2000u32 {
        assert_eq!(table.get_value(key).unwrap(), Some(record(key)), "key {}", key);
    }
}
