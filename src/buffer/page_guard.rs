use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::common::{PageId, PAGE_SIZE};

use super::FrameHeader;

/// Callback type for releasing a guard's pin
type ReleaseCallback = Box<dyn FnOnce(PageId, bool) + Send + Sync>;

/// Guard internals shared by all three variants: the guarded page id, the
/// frame (kept alive for the guard's lifetime), the release callback, and
/// the dirty flag observed by mutations through the guard.
struct PageGuardBase {
    page_id: PageId,
    frame: Arc<FrameHeader>,
    release_callback: Option<ReleaseCallback>,
    is_dirty: bool,
}

impl PageGuardBase {
    fn new(page_id: PageId, frame: Arc<FrameHeader>, release_callback: ReleaseCallback) -> Self {
        Self {
            page_id,
            frame,
            release_callback: Some(release_callback),
            is_dirty: false,
        }
    }

    /// Moves the pin out of this base into a new one, leaving behind a
    /// spent base whose `drop_impl` is a no-op. Used by the upgrades.
    fn transfer(&mut self) -> Self {
        Self {
            page_id: self.page_id,
            frame: Arc::clone(&self.frame),
            release_callback: self.release_callback.take(),
            is_dirty: self.is_dirty,
        }
    }

    fn drop_impl(&mut self) {
        if let Some(callback) = self.release_callback.take() {
            callback(self.page_id, self.is_dirty);
        }
    }
}

/// RAII guard holding only a pin on a page, no latch. Useful for keeping a
/// page resident across latch acquisitions; upgrade to a read or write
/// guard to access the data.
pub struct BasicPageGuard {
    base: PageGuardBase,
}

impl BasicPageGuard {
    pub(crate) fn new(
        page_id: PageId,
        frame: Arc<FrameHeader>,
        release_callback: ReleaseCallback,
    ) -> Self {
        Self {
            base: PageGuardBase::new(page_id, frame, release_callback),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.base.page_id
    }

    /// Acquires the shared latch on the page and converts this guard into
    /// a ReadPageGuard. The pin carries over; this guard is consumed.
    pub fn upgrade_read(mut self) -> ReadPageGuard {
        let frame = Arc::clone(&self.base.frame);
        let data_guard = frame.data.read();
        // Safety: the latch guard is tied to the frame allocation, which
        // the transferred base keeps alive via its Arc
        let data_guard: RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>> =
            unsafe { std::mem::transmute(data_guard) };

        ReadPageGuard {
            base: self.base.transfer(),
            data_guard: Some(data_guard),
        }
    }

    /// Acquires the exclusive latch on the page and converts this guard
    /// into a WritePageGuard. The pin carries over; this guard is consumed.
    pub fn upgrade_write(mut self) -> WritePageGuard {
        let frame = Arc::clone(&self.base.frame);
        let data_guard = frame.data.write();
        // Safety: as in upgrade_read
        let data_guard: RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>> =
            unsafe { std::mem::transmute(data_guard) };

        WritePageGuard {
            base: self.base.transfer(),
            data_guard: Some(data_guard),
        }
    }

    /// Drops this guard, releasing the pin.
    pub fn drop_guard(self) {
        drop(self);
    }
}

impl Drop for BasicPageGuard {
    fn drop(&mut self) {
        self.base.drop_impl();
    }
}

/// RAII guard for read access to a page: a pin plus the shared latch.
/// Dropping releases the latch first, then the pin.
pub struct ReadPageGuard {
    base: PageGuardBase,
    /// Shared latch on the page data
    data_guard: Option<RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>>>,
}

impl ReadPageGuard {
    /// Creates a new ReadPageGuard, acquiring the shared latch.
    /// # Safety
    /// The caller must ensure the frame stays bound to `page_id` for the
    /// guard's lifetime (the pool guarantees this while the pin is held).
    pub(crate) unsafe fn new(
        page_id: PageId,
        frame: Arc<FrameHeader>,
        release_callback: ReleaseCallback,
    ) -> Self {
        let data_guard = frame.data.read();
        // The frame is kept alive via the Arc in the base
        let data_guard: RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>> =
            std::mem::transmute(data_guard);

        Self {
            base: PageGuardBase::new(page_id, frame, release_callback),
            data_guard: Some(data_guard),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.base.page_id
    }

    /// Returns a reference to the page data.
    pub fn data(&self) -> &[u8] {
        &self.data_guard.as_ref().unwrap()[..]
    }

    /// Drops this guard, releasing the latch and the pin.
    pub fn drop_guard(self) {
        drop(self);
    }
}

impl Deref for ReadPageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl Drop for ReadPageGuard {
    fn drop(&mut self) {
        // Release the latch before the pin
        self.data_guard.take();
        self.base.drop_impl();
    }
}

/// RAII guard for write access to a page: a pin plus the exclusive latch.
/// The first mutable access marks the frame dirty. Dropping releases the
/// latch first, then the pin.
pub struct WritePageGuard {
    base: PageGuardBase,
    /// Exclusive latch on the page data
    data_guard: Option<RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>>>,
}

impl WritePageGuard {
    /// Creates a new WritePageGuard, acquiring the exclusive latch.
    /// # Safety
    /// As for [`ReadPageGuard::new`].
    pub(crate) unsafe fn new(
        page_id: PageId,
        frame: Arc<FrameHeader>,
        release_callback: ReleaseCallback,
    ) -> Self {
        let data_guard = frame.data.write();
        // The frame is kept alive via the Arc in the base
        let data_guard: RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>> =
            std::mem::transmute(data_guard);

        Self {
            base: PageGuardBase::new(page_id, frame, release_callback),
            data_guard: Some(data_guard),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.base.page_id
    }

    /// Returns a reference to the page data.
    pub fn data(&self) -> &[u8] {
        &self.data_guard.as_ref().unwrap()[..]
    }

    /// Returns a mutable reference to the page data and marks the page
    /// dirty.
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.base.is_dirty = true;
        &mut self.data_guard.as_mut().unwrap()[..]
    }

    /// Drops this guard, releasing the latch and the pin.
    pub fn drop_guard(self) {
        drop(self);
    }
}

impl Deref for WritePageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl DerefMut for WritePageGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data_mut()
    }
}

impl Drop for WritePageGuard {
    fn drop(&mut self) {
        // Release the latch before the pin
        self.data_guard.take();
        self.base.drop_impl();
    }
}
