use std::collections::{HashMap, LinkedList};
use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use crate::common::{FrameId, PageId, Result, ShaleError, INVALID_PAGE_ID, PAGE_SIZE};
use crate::storage::disk::{DiskManager, DiskScheduler};

use super::{BasicPageGuard, FrameHeader, LruKReplacer, ReadPageGuard, WritePageGuard};

/// Bookkeeping guarded by the pool's coordinating mutex
struct PoolCore {
    /// Page table: maps resident page IDs to frame IDs
    page_table: HashMap<PageId, FrameId>,
    /// Frames not currently bound to any page
    free_list: LinkedList<FrameId>,
    /// Monotonic page id allocator
    next_page_id: u32,
}

/// Shared pool state; guard release callbacks keep it alive beyond the
/// manager's borrow.
struct BufferPoolState {
    /// The buffer pool frames
    frames: Vec<Arc<FrameHeader>>,
    /// Coordinating mutex over page table, free list, and the allocator
    core: Mutex<PoolCore>,
    /// LRU-K replacer for eviction decisions
    replacer: LruKReplacer,
}

impl BufferPoolState {
    /// Unpin path shared by `unpin_page` and the guard release callbacks.
    /// Returns false if the page is not resident or was not pinned.
    fn release_pin(&self, page_id: PageId, is_dirty: bool) -> bool {
        let core = self.core.lock();

        if let Some(&frame_id) = core.page_table.get(&page_id) {
            let frame = &self.frames[frame_id.as_usize()];
            if frame.pin_count() == 0 {
                return false;
            }
            if is_dirty {
                frame.set_dirty(true);
            }
            if frame.unpin() == Some(0) {
                self.replacer.set_evictable(frame_id, true);
            }
            true
        } else {
            false
        }
    }
}

/// BufferPoolManager mediates between pages on disk and a bounded set of
/// in-memory frames. Fetching or creating a page pins its frame; pinned
/// frames are never evicted. When no free frame exists, the LRU-K replacer
/// picks a victim, whose contents are written back if dirty.
pub struct BufferPoolManager {
    /// Number of frames in the buffer pool
    pool_size: usize,
    /// Shared state
    state: Arc<BufferPoolState>,
    /// Disk scheduler serializing all I/O on one worker
    disk_scheduler: DiskScheduler,
}

impl BufferPoolManager {
    /// Creates a new BufferPoolManager with the given pool size, k value
    /// for LRU-K, and disk manager.
    pub fn new(pool_size: usize, replacer_k: usize, disk_manager: Arc<DiskManager>) -> Self {
        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = LinkedList::new();

        for i in 0..pool_size {
            let frame_id = FrameId::new(i as u32);
            frames.push(Arc::new(FrameHeader::new(frame_id)));
            free_list.push_back(frame_id);
        }

        let state = Arc::new(BufferPoolState {
            frames,
            core: Mutex::new(PoolCore {
                page_table: HashMap::new(),
                free_list,
                next_page_id: 0,
            }),
            replacer: LruKReplacer::new(replacer_k, pool_size),
        });

        Self {
            pool_size,
            state,
            disk_scheduler: DiskScheduler::new(disk_manager),
        }
    }

    /// Allocates a fresh page id, binds it to a frame, and pins the frame.
    /// The caller owns the pin and must release it with `unpin_page` (or by
    /// using `new_page_guarded` instead).
    pub fn new_page(&self) -> Result<PageId> {
        let mut core = self.state.core.lock();

        let frame_id = self.acquire_frame(&mut core)?;
        let frame = &self.state.frames[frame_id.as_usize()];

        let page_id = PageId::new(core.next_page_id);
        core.next_page_id += 1;

        frame.set_page_id(page_id);
        frame.pin();

        core.page_table.insert(page_id, frame_id);
        self.state.replacer.record_access(frame_id);
        self.state.replacer.set_evictable(frame_id, false);

        Ok(page_id)
    }

    /// Pins the requested page, reading it from disk if it is not
    /// resident. Returns the frame it occupies. The caller owns one pin.
    pub fn fetch_page(&self, page_id: PageId) -> Result<FrameId> {
        if page_id == INVALID_PAGE_ID {
            return Err(ShaleError::InvalidPageId(page_id));
        }

        let mut core = self.state.core.lock();

        // Already resident: just pin
        if let Some(&frame_id) = core.page_table.get(&page_id) {
            let frame = &self.state.frames[frame_id.as_usize()];
            frame.pin();
            self.state.replacer.record_access(frame_id);
            self.state.replacer.set_evictable(frame_id, false);
            return Ok(frame_id);
        }

        let frame_id = self.acquire_frame(&mut core)?;
        let frame = &self.state.frames[frame_id.as_usize()];

        let mut data = [0u8; PAGE_SIZE];
        self.disk_scheduler.schedule_read_sync(page_id, &mut data)?;

        frame.set_page_id(page_id);
        frame.copy_from(&data);
        frame.set_dirty(false);
        frame.pin();

        core.page_table.insert(page_id, frame_id);
        self.state.replacer.record_access(frame_id);
        self.state.replacer.set_evictable(frame_id, false);

        Ok(frame_id)
    }

    /// Releases one pin on a page. Returns false if the page is not
    /// resident or its pin count is already zero. A true `is_dirty` marks
    /// the page for write-back on eviction.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        self.state.release_pin(page_id, is_dirty)
    }

    /// Writes a page to disk regardless of its dirty flag and clears the
    /// flag. Returns false if the page is not resident.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        if page_id == INVALID_PAGE_ID {
            return Err(ShaleError::InvalidPageId(page_id));
        }

        let core = self.state.core.lock();

        if let Some(&frame_id) = core.page_table.get(&page_id) {
            let frame = &self.state.frames[frame_id.as_usize()];

            let mut data = [0u8; PAGE_SIZE];
            frame.copy_to(&mut data);

            self.disk_scheduler.schedule_write_sync(page_id, &data)?;
            frame.set_dirty(false);

            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Flushes every resident page to disk.
    pub fn flush_all_pages(&self) -> Result<()> {
        let core = self.state.core.lock();

        for (&page_id, &frame_id) in core.page_table.iter() {
            let frame = &self.state.frames[frame_id.as_usize()];

            let mut data = [0u8; PAGE_SIZE];
            frame.copy_to(&mut data);

            self.disk_scheduler.schedule_write_sync(page_id, &data)?;
            frame.set_dirty(false);
        }

        Ok(())
    }

    /// Removes a page from the pool, returning its frame to the free list.
    /// Returns true if the page was deleted or was not resident, false if
    /// it is pinned. The page id is not reused.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut core = self.state.core.lock();

        if let Some(&frame_id) = core.page_table.get(&page_id) {
            let frame = &self.state.frames[frame_id.as_usize()];

            if frame.pin_count() > 0 {
                return Ok(false);
            }

            if frame.is_dirty() {
                let mut data = [0u8; PAGE_SIZE];
                frame.copy_to(&mut data);
                self.disk_scheduler.schedule_write_sync(page_id, &data)?;
            }

            core.page_table.remove(&page_id);
            self.state.replacer.remove(frame_id);
            frame.reset();
            core.free_list.push_back(frame_id);

            Ok(true)
        } else {
            // Not resident: nothing to do
            Ok(true)
        }
    }

    /// Fetches a page and wraps the pin in a BasicPageGuard (no latch).
    pub fn fetch_page_basic(&self, page_id: PageId) -> Result<BasicPageGuard> {
        let frame_id = self.fetch_page(page_id)?;
        let frame = Arc::clone(&self.state.frames[frame_id.as_usize()]);
        let state = Arc::clone(&self.state);

        Ok(BasicPageGuard::new(
            page_id,
            frame,
            Box::new(move |pid, is_dirty| {
                state.release_pin(pid, is_dirty);
            }),
        ))
    }

    /// Fetches a page and returns a guard holding the pin and the shared
    /// latch.
    pub fn fetch_page_read(&self, page_id: PageId) -> Result<ReadPageGuard> {
        let frame_id = self.fetch_page(page_id)?;
        let frame = Arc::clone(&self.state.frames[frame_id.as_usize()]);
        let state = Arc::clone(&self.state);

        // Safety: the pin taken by fetch_page keeps the frame bound to
        // page_id until the guard releases it
        let guard = unsafe {
            ReadPageGuard::new(
                page_id,
                frame,
                Box::new(move |pid, is_dirty| {
                    state.release_pin(pid, is_dirty);
                }),
            )
        };

        Ok(guard)
    }

    /// Fetches a page and returns a guard holding the pin and the
    /// exclusive latch.
    pub fn fetch_page_write(&self, page_id: PageId) -> Result<WritePageGuard> {
        let frame_id = self.fetch_page(page_id)?;
        let frame = Arc::clone(&self.state.frames[frame_id.as_usize()]);
        let state = Arc::clone(&self.state);

        // Safety: as in fetch_page_read
        let guard = unsafe {
            WritePageGuard::new(
                page_id,
                frame,
                Box::new(move |pid, is_dirty| {
                    state.release_pin(pid, is_dirty);
                }),
            )
        };

        Ok(guard)
    }

    /// Allocates a new page and wraps the pin in a BasicPageGuard.
    pub fn new_page_guarded(&self) -> Result<BasicPageGuard> {
        let page_id = self.new_page()?;
        let frame_id = {
            let core = self.state.core.lock();
            core.page_table[&page_id]
        };
        let frame = Arc::clone(&self.state.frames[frame_id.as_usize()]);
        let state = Arc::clone(&self.state);

        Ok(BasicPageGuard::new(
            page_id,
            frame,
            Box::new(move |pid, is_dirty| {
                state.release_pin(pid, is_dirty);
            }),
        ))
    }

    /// Returns the pin count for a resident page.
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let core = self.state.core.lock();

        core.page_table
            .get(&page_id)
            .map(|&frame_id| self.state.frames[frame_id.as_usize()].pin_count())
    }

    /// Returns the pool size.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Returns the number of free frames.
    pub fn free_frame_count(&self) -> usize {
        self.state.core.lock().free_list.len()
    }

    /// Picks a frame for a new residency: first from the free list, else
    /// by evicting the replacer's victim, writing its page back if dirty.
    fn acquire_frame(&self, core: &mut PoolCore) -> Result<FrameId> {
        if let Some(frame_id) = core.free_list.pop_front() {
            return Ok(frame_id);
        }

        if let Some(frame_id) = self.state.replacer.evict() {
            let frame = &self.state.frames[frame_id.as_usize()];
            let old_page_id = frame.page_id();

            if frame.is_dirty() {
                debug!("evicting dirty {}, writing back", old_page_id);
                let mut data = [0u8; PAGE_SIZE];
                frame.copy_to(&mut data);
                self.disk_scheduler
                    .schedule_write_sync(old_page_id, &data)?;
            }

            core.page_table.remove(&old_page_id);
            frame.reset();

            Ok(frame_id)
        } else {
            Err(ShaleError::PoolExhausted)
        }
    }
}
