use std::sync::Arc;

use log::debug;

use crate::buffer::{BufferPoolManager, WritePageGuard};
use crate::common::{PageId, RecordId, Result, ShaleError, INVALID_PAGE_ID};
use crate::storage::page::{
    HashBucketPage, HashBucketPageRef, HashDirectoryPage, HashDirectoryPageRef, HashHeaderPage,
    HashHeaderPageRef,
};

use super::{HashFunction, KeyComparator};

/// Result of one descent of `try_insert`
enum InsertOutcome {
    /// The entry was stored
    Inserted,
    /// The insert cannot happen: duplicate key, or a bucket at the depth
    /// cap cannot split
    Rejected,
    /// A bucket was split; the caller retries from the top with no guards
    /// held
    Retry,
}

/// Disk-backed extendible hash table over a three-level page structure:
/// one header page fans out to directory pages by the top hash bits, each
/// directory fans out to bucket pages by the low hash bits.
///
/// Reads crab read latches down the levels. Mutations take the directory
/// write latch before touching any bucket, so splits, merges, and
/// directory resizes are serialized per directory.
pub struct ExtendibleHashTable {
    /// The persisted entry point of the index
    header_page_id: PageId,
    bpm: Arc<BufferPoolManager>,
    cmp: Box<dyn KeyComparator>,
    hash_fn: Box<dyn HashFunction>,
    directory_max_depth: u32,
    bucket_max_size: u32,
}

impl ExtendibleHashTable {
    /// Creates a new index, allocating and initializing its header page.
    pub fn new(
        bpm: Arc<BufferPoolManager>,
        cmp: Box<dyn KeyComparator>,
        hash_fn: Box<dyn HashFunction>,
        header_max_depth: u32,
        directory_max_depth: u32,
        bucket_max_size: u32,
    ) -> Result<Self> {
        let header_guard = bpm.new_page_guarded()?;
        let header_page_id = header_guard.page_id();

        {
            let mut guard = header_guard.upgrade_write();
            let mut header = HashHeaderPage::new(guard.data_mut());
            header.init(header_max_depth);
        }

        Ok(Self {
            header_page_id,
            bpm,
            cmp,
            hash_fn,
            directory_max_depth,
            bucket_max_size,
        })
    }

    /// Reattaches to an index whose header page already exists.
    pub fn open(
        header_page_id: PageId,
        bpm: Arc<BufferPoolManager>,
        cmp: Box<dyn KeyComparator>,
        hash_fn: Box<dyn HashFunction>,
        directory_max_depth: u32,
        bucket_max_size: u32,
    ) -> Result<Self> {
        Ok(Self {
            header_page_id,
            bpm,
            cmp,
            hash_fn,
            directory_max_depth,
            bucket_max_size,
        })
    }

    pub fn header_page_id(&self) -> PageId {
        self.header_page_id
    }

    fn hash(&self, key: u32) -> u32 {
        self.hash_fn.hash(&key.to_le_bytes())
    }

    /// Looks up the key. Returns None when it is absent or when the pool
    /// has no frame to spare for the descent.
    pub fn get_value(&self, key: u32) -> Result<Option<RecordId>> {
        match self.get_value_inner(key) {
            Err(ShaleError::PoolExhausted) => Ok(None),
            other => other,
        }
    }

    fn get_value_inner(&self, key: u32) -> Result<Option<RecordId>> {
        let hash = self.hash(key);

        let header_guard = self.bpm.fetch_page_read(self.header_page_id)?;
        let directory_page_id = {
            let header = HashHeaderPageRef::new(header_guard.data());
            let directory_idx = header.hash_to_directory_index(hash);
            header.directory_page_id(directory_idx)
        };
        if directory_page_id == INVALID_PAGE_ID {
            return Ok(None);
        }

        // Crab: latch the child, then release the parent
        let directory_guard = self.bpm.fetch_page_read(directory_page_id)?;
        drop(header_guard);

        let bucket_page_id = {
            let directory = HashDirectoryPageRef::new(directory_guard.data());
            let bucket_idx = directory.hash_to_bucket_index(hash);
            directory.bucket_page_id(bucket_idx)
        };
        if bucket_page_id == INVALID_PAGE_ID {
            return Ok(None);
        }

        let bucket_guard = self.bpm.fetch_page_read(bucket_page_id)?;
        drop(directory_guard);

        let bucket = HashBucketPageRef::new(bucket_guard.data());
        Ok(bucket.lookup(key, self.cmp.as_ref()))
    }

    /// Inserts the key/value pair. Returns false when the key is already
    /// present, when a needed bucket is at the depth cap, or when the pool
    /// has no frame to spare.
    pub fn insert(&self, key: u32, value: RecordId) -> Result<bool> {
        match self.insert_inner(key, value) {
            Err(ShaleError::PoolExhausted) => Ok(false),
            other => other,
        }
    }

    fn insert_inner(&self, key: u32, value: RecordId) -> Result<bool> {
        if self.get_value_inner(key)?.is_some() {
            return Ok(false);
        }

        loop {
            match self.try_insert(key, value)? {
                InsertOutcome::Inserted => return Ok(true),
                InsertOutcome::Rejected => return Ok(false),
                InsertOutcome::Retry => continue,
            }
        }
    }

    /// One write-latched descent. Materializes missing directory/bucket
    /// pages on the way down; a full bucket is split and the caller
    /// retries.
    fn try_insert(&self, key: u32, value: RecordId) -> Result<InsertOutcome> {
        let hash = self.hash(key);

        let mut header_guard = self.bpm.fetch_page_write(self.header_page_id)?;
        let (directory_idx, mut directory_page_id) = {
            let header = HashHeaderPageRef::new(header_guard.data());
            let directory_idx = header.hash_to_directory_index(hash);
            (directory_idx, header.directory_page_id(directory_idx))
        };

        if directory_page_id == INVALID_PAGE_ID {
            // First key routed here: materialize the directory
            let new_directory_guard = self.bpm.new_page_guarded()?;
            directory_page_id = new_directory_guard.page_id();
            {
                let mut guard = new_directory_guard.upgrade_write();
                let mut directory = HashDirectoryPage::new(guard.data_mut());
                directory.init(self.directory_max_depth);
            }
            let mut header = HashHeaderPage::new(header_guard.data_mut());
            header.set_directory_page_id(directory_idx, directory_page_id);
            debug!(
                "materialized directory {} at header slot {}",
                directory_page_id, directory_idx
            );
        }

        let mut directory_guard = self.bpm.fetch_page_write(directory_page_id)?;
        drop(header_guard);

        let (bucket_idx, bucket_page_id) = {
            let directory = HashDirectoryPageRef::new(directory_guard.data());
            let bucket_idx = directory.hash_to_bucket_index(hash);
            (bucket_idx, directory.bucket_page_id(bucket_idx))
        };

        if bucket_page_id == INVALID_PAGE_ID {
            // Empty slot: materialize the bucket and store the entry
            let new_bucket_guard = self.bpm.new_page_guarded()?;
            let new_bucket_page_id = new_bucket_guard.page_id();
            {
                let mut guard = new_bucket_guard.upgrade_write();
                let mut bucket = HashBucketPage::new(guard.data_mut());
                bucket.init(self.bucket_max_size);
                bucket.insert(key, value, self.cmp.as_ref());
            }
            let mut directory = HashDirectoryPage::new(directory_guard.data_mut());
            directory.set_bucket_page_id(bucket_idx, new_bucket_page_id);
            return Ok(InsertOutcome::Inserted);
        }

        let mut bucket_guard = self.bpm.fetch_page_write(bucket_page_id)?;

        let full = {
            let bucket = HashBucketPageRef::new(bucket_guard.data());
            bucket.is_full()
        };

        if !full {
            let mut bucket = HashBucketPage::new(bucket_guard.data_mut());
            if bucket.insert(key, value, self.cmp.as_ref()) {
                return Ok(InsertOutcome::Inserted);
            }
            // Duplicate key slipped in between descents
            return Ok(InsertOutcome::Rejected);
        }

        self.split_bucket(&mut directory_guard, &mut bucket_guard, bucket_idx)
    }

    /// Splits a full bucket: grows the directory if the bucket is at
    /// global depth, moves the image group's slots to a fresh bucket, and
    /// rehashes the entries between the two. The insert itself is retried
    /// by the caller afterwards.
    fn split_bucket(
        &self,
        directory_guard: &mut WritePageGuard,
        bucket_guard: &mut WritePageGuard,
        bucket_idx: u32,
    ) -> Result<InsertOutcome> {
        let (local_depth, global_depth, bucket_page_id) = {
            let directory = HashDirectoryPageRef::new(directory_guard.data());
            (
                directory.local_depth(bucket_idx),
                directory.global_depth(),
                directory.bucket_page_id(bucket_idx),
            )
        };

        if local_depth == self.directory_max_depth {
            debug!(
                "cannot split bucket {}: local depth {} at cap",
                bucket_page_id, local_depth
            );
            return Ok(InsertOutcome::Rejected);
        }

        if local_depth == global_depth {
            // The whole doubling happens under the directory write latch
            let mut directory = HashDirectoryPage::new(directory_guard.data_mut());
            directory.incr_global_depth();
            debug!("directory doubled to global depth {}", global_depth + 1);
        }

        let new_bucket_guard = self.bpm.new_page_guarded()?;
        let new_bucket_page_id = new_bucket_guard.page_id();
        let mut new_bucket_guard = new_bucket_guard.upgrade_write();
        let mut new_bucket = HashBucketPage::new(new_bucket_guard.data_mut());
        new_bucket.init(self.bucket_max_size);

        let new_depth = local_depth + 1;
        let new_mask = (1u32 << new_depth) - 1;
        // Low-bit pattern of the slots (and hashes) that move to the new
        // bucket, taken before the depth bump
        let image_pattern = {
            let directory = HashDirectoryPageRef::new(directory_guard.data());
            directory.split_image_index(bucket_idx) & new_mask
        };

        {
            let mut directory = HashDirectoryPage::new(directory_guard.data_mut());
            for i in 0..directory.size() {
                if directory.bucket_page_id(i) == bucket_page_id {
                    if i & new_mask == image_pattern {
                        directory.set_bucket_page_id(i, new_bucket_page_id);
                    }
                    directory.set_local_depth(i, new_depth);
                }
            }
        }

        // Rehash in place: entries joining the image group move over
        let mut bucket = HashBucketPage::new(bucket_guard.data_mut());
        let mut i = bucket.size();
        while i > 0 {
            i -= 1;
            let (entry_key, entry_value) = bucket.entry_at(i);
            let entry_hash = self.hash_fn.hash(&entry_key.to_le_bytes());
            if entry_hash & new_mask == image_pattern {
                new_bucket.insert(entry_key, entry_value, self.cmp.as_ref());
                bucket.remove_at(i);
            }
        }

        debug!(
            "split bucket {} -> {} at local depth {}",
            bucket_page_id, new_bucket_page_id, new_depth
        );
        Ok(InsertOutcome::Retry)
    }

    /// Removes the key. Returns false when it is absent or when the pool
    /// has no frame to spare. An emptied bucket triggers merging.
    pub fn remove(&self, key: u32) -> Result<bool> {
        match self.remove_inner(key) {
            Err(ShaleError::PoolExhausted) => Ok(false),
            other => other,
        }
    }

    fn remove_inner(&self, key: u32) -> Result<bool> {
        let hash = self.hash(key);

        let header_guard = self.bpm.fetch_page_read(self.header_page_id)?;
        let directory_page_id = {
            let header = HashHeaderPageRef::new(header_guard.data());
            let directory_idx = header.hash_to_directory_index(hash);
            header.directory_page_id(directory_idx)
        };
        if directory_page_id == INVALID_PAGE_ID {
            return Ok(false);
        }

        let mut directory_guard = self.bpm.fetch_page_write(directory_page_id)?;
        drop(header_guard);

        let bucket_page_id = {
            let directory = HashDirectoryPageRef::new(directory_guard.data());
            let bucket_idx = directory.hash_to_bucket_index(hash);
            directory.bucket_page_id(bucket_idx)
        };
        if bucket_page_id == INVALID_PAGE_ID {
            return Ok(false);
        }

        let now_empty = {
            let mut bucket_guard = self.bpm.fetch_page_write(bucket_page_id)?;
            let mut bucket = HashBucketPage::new(bucket_guard.data_mut());
            if !bucket.remove(key, self.cmp.as_ref()) {
                return Ok(false);
            }
            bucket.is_empty()
        };

        if now_empty {
            self.merge_buckets(&mut directory_guard, hash)?;
        }

        Ok(true)
    }

    /// Repeatedly merges the bucket on `hash`'s path with its split image
    /// while one of the pair is empty and both sit at the same local
    /// depth, shrinking the directory whenever possible.
    fn merge_buckets(&self, directory_guard: &mut WritePageGuard, hash: u32) -> Result<()> {
        loop {
            let (bucket_idx, global_depth, local_depth) = {
                let directory = HashDirectoryPageRef::new(directory_guard.data());
                let bucket_idx = directory.hash_to_bucket_index(hash);
                (
                    bucket_idx,
                    directory.global_depth(),
                    directory.local_depth(bucket_idx),
                )
            };

            if local_depth == 0 || global_depth == 0 {
                break;
            }

            // The buddy bucket at the current local depth
            let image_idx = bucket_idx ^ (1u32 << (local_depth - 1));
            let (bucket_page_id, image_page_id, image_local_depth) = {
                let directory = HashDirectoryPageRef::new(directory_guard.data());
                (
                    directory.bucket_page_id(bucket_idx),
                    directory.bucket_page_id(image_idx),
                    directory.local_depth(image_idx),
                )
            };

            if image_local_depth != local_depth || image_page_id == bucket_page_id {
                break;
            }

            let bucket_empty = {
                let guard = self.bpm.fetch_page_read(bucket_page_id)?;
                HashBucketPageRef::new(guard.data()).is_empty()
            };
            let image_empty = {
                let guard = self.bpm.fetch_page_read(image_page_id)?;
                HashBucketPageRef::new(guard.data()).is_empty()
            };

            let (victim_page_id, survivor_page_id) = if bucket_empty {
                (bucket_page_id, image_page_id)
            } else if image_empty {
                (image_page_id, bucket_page_id)
            } else {
                break;
            };

            {
                let mut directory = HashDirectoryPage::new(directory_guard.data_mut());
                for i in 0..directory.size() {
                    if directory.bucket_page_id(i) == victim_page_id {
                        directory.set_bucket_page_id(i, survivor_page_id);
                    }
                }
                // The merged group sits one level higher now
                for i in 0..directory.size() {
                    if directory.bucket_page_id(i) == survivor_page_id {
                        directory.set_local_depth(i, local_depth - 1);
                    }
                }

                while directory.can_shrink() {
                    directory.decr_global_depth();
                }
            }

            self.bpm.delete_page(victim_page_id)?;
            debug!(
                "merged bucket {} into {} at local depth {}",
                victim_page_id,
                survivor_page_id,
                local_depth - 1
            );
        }

        Ok(())
    }
}
