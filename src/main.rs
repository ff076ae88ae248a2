use std::sync::Arc;

use shale::buffer::BufferPoolManager;
use shale::common::{DEFAULT_BUFFER_POOL_SIZE, DEFAULT_LRUK_K};
use shale::index::{ExtendibleHashTable, Fnv1aHash, IntegerComparator};
use shale::storage::disk::DiskManager;
use shale::{PageId, RecordId, SlotId};

fn main() {
    simplelog::SimpleLogger::init(simplelog::LevelFilter::Debug, simplelog::Config::default())
        .expect("Failed to init logger");

    println!("Shale - a disk-oriented storage engine core");
    println!("===========================================\n");

    // Create a temporary database file for demonstration
    let db_path = "demo.db";

    // Initialize the disk manager
    let disk_manager = Arc::new(DiskManager::new(db_path).expect("Failed to create disk manager"));
    println!("Created disk manager for: {}", db_path);

    // Create buffer pool manager with the default frame count and LRU-2
    let bpm = Arc::new(BufferPoolManager::new(
        DEFAULT_BUFFER_POOL_SIZE,
        DEFAULT_LRUK_K,
        disk_manager,
    ));
    println!(
        "Created buffer pool manager with {} frames\n",
        DEFAULT_BUFFER_POOL_SIZE
    );

    // Write raw bytes through a page guard
    let page_id = bpm.new_page().expect("Failed to allocate page");
    bpm.unpin_page(page_id, false);
    println!("Allocated new page: {}", page_id);

    {
        let mut guard = bpm
            .fetch_page_write(page_id)
            .expect("Failed to get write guard");
        guard.data_mut()[..13].copy_from_slice(b"Hello, Shale!");
    }
    bpm.flush_page(page_id).expect("Failed to flush page");
    println!("Wrote and flushed page {}\n", page_id);

    // Build a hash index and exercise it
    let table = ExtendibleHashTable::new(
        Arc::clone(&bpm),
        Box::new(IntegerComparator),
        Box::new(Fnv1aHash),
        2, // header_max_depth
        4, // directory_max_depth
        8, // bucket_max_size
    )
    .expect("Failed to create hash index");

    println!(
        "Created extendible hash index, header page {}",
        table.header_page_id()
    );

    for key in 0..32u32 {
        let rid = RecordId::new(PageId::new(100 + key), SlotId::new(0));
        let inserted = table.insert(key, rid).expect("Insert failed");
        assert!(inserted, "key {} should be fresh", key);
    }
    println!("Inserted 32 keys");

    for key in (0..32u32).step_by(2) {
        table.remove(key).expect("Remove failed");
    }
    println!("Removed the even keys");

    for key in 0..32u32 {
        let value = table.get_value(key).expect("Lookup failed");
        match value {
            Some(rid) if key % 2 == 1 => {
                assert_eq!(rid.page_id, PageId::new(100 + key));
            }
            None if key % 2 == 0 => {}
            other => panic!("unexpected lookup result for {}: {:?}", key, other),
        }
    }
    println!("Verified lookups: odd keys present, even keys gone");

    bpm.flush_all_pages().expect("Failed to flush");

    // Clean up
    std::fs::remove_file(db_path).ok();
    println!("\nDemo completed successfully!");
}
