//! Shale - a disk-oriented storage engine core in Rust
//!
//! This crate provides the storage and access-path core of a disk-oriented
//! database: a buffer pool that caches fixed-size pages in a bounded set of
//! in-memory frames, and a disk-backed extendible hash index built on top
//! of it.
//!
//! # Architecture
//!
//! The system is organized into several layers:
//!
//! - **Storage Layer** (`storage`): Disk I/O and on-disk page layouts
//!   - `DiskManager`: Reads and writes pages to/from the database file
//!   - `DiskScheduler`: Serializes disk I/O on a background worker
//!   - `HashHeaderPage`/`HashDirectoryPage`/`HashBucketPage`: The three
//!     levels of the hash index's on-disk structure
//!
//! - **Buffer Pool** (`buffer`): Memory management for database pages
//!   - `BufferPoolManager`: Fetches pages from disk and caches them in memory
//!   - `LruKReplacer`: LRU-K page replacement policy
//!   - `FrameHeader`: Per-frame metadata and data storage
//!   - `BasicPageGuard`/`ReadPageGuard`/`WritePageGuard`: RAII guards
//!     coupling pins with per-frame latches
//!
//! - **Index** (`index`): The disk-backed extendible hash table
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use shale::buffer::BufferPoolManager;
//! use shale::index::{ExtendibleHashTable, Fnv1aHash, IntegerComparator};
//! use shale::storage::disk::DiskManager;
//! use shale::{PageId, RecordId, SlotId};
//!
//! // Create a disk manager for a database file
//! let disk_manager = Arc::new(DiskManager::new("test.db").unwrap());
//!
//! // Create a buffer pool with 100 frames and LRU-2 replacement
//! let bpm = Arc::new(BufferPoolManager::new(100, 2, disk_manager));
//!
//! // Build a hash index on top of the pool
//! let table = ExtendibleHashTable::new(
//!     Arc::clone(&bpm),
//!     Box::new(IntegerComparator),
//!     Box::new(Fnv1aHash),
//!     9,  // header_max_depth
//!     9,  // directory_max_depth
//!     64, // bucket_max_size
//! )
//! .unwrap();
//!
//! let rid = RecordId::new(PageId::new(7), SlotId::new(0));
//! table.insert(42, rid).unwrap();
//! assert_eq!(table.get_value(42).unwrap(), Some(rid));
//! ```

pub mod buffer;
pub mod common;
pub mod index;
pub mod storage;

// Re-export commonly used types at the crate root
pub use common::{PageId, RecordId, Result, ShaleError, SlotId};
