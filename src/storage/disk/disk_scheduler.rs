use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::common::{PageId, Result, ShaleError, PAGE_SIZE};

use super::DiskManager;

/// Represents a disk I/O request
pub struct DiskRequest {
    /// Whether this is a write (true) or read (false) request
    pub is_write: bool,
    /// The page ID to read/write
    pub page_id: PageId,
    /// Pointer to the data buffer (must be PAGE_SIZE bytes)
    /// For reads: data will be written here
    /// For writes: data will be read from here
    pub data: *mut u8,
    /// Promise to signal completion; carries the success of the operation
    pub callback: Option<std::sync::mpsc::Sender<bool>>,
}

// Safety: DiskRequest is only consumed by the disk scheduler thread
// and the caller must ensure the data pointer remains valid until the
// completion promise is fulfilled
unsafe impl Send for DiskRequest {}

impl DiskRequest {
    /// Creates a new read request
    pub fn read(page_id: PageId, data: *mut u8) -> Self {
        Self {
            is_write: false,
            page_id,
            data,
            callback: None,
        }
    }

    /// Creates a new write request
    pub fn write(page_id: PageId, data: *mut u8) -> Self {
        Self {
            is_write: true,
            page_id,
            data,
            callback: None,
        }
    }

    /// Sets the completion promise for this request
    pub fn with_callback(mut self, callback: std::sync::mpsc::Sender<bool>) -> Self {
        self.callback = Some(callback);
        self
    }
}

/// DiskScheduler serializes disk I/O on a single background worker thread.
/// Requests are queued in FIFO order; `None` on the queue is the shutdown
/// sentinel, posted exactly once when the scheduler is dropped.
pub struct DiskScheduler {
    /// The disk manager for actual I/O operations
    disk_manager: Arc<DiskManager>,
    /// Channel sender for queuing requests
    request_sender: Sender<Option<DiskRequest>>,
    /// Handle to the background worker thread
    worker_handle: Option<JoinHandle<()>>,
}

impl DiskScheduler {
    /// Creates a new DiskScheduler and spawns its worker thread.
    pub fn new(disk_manager: Arc<DiskManager>) -> Self {
        let (sender, receiver) = unbounded::<Option<DiskRequest>>();

        let dm_clone = Arc::clone(&disk_manager);
        let worker_handle = thread::spawn(move || {
            Self::start_worker_thread(dm_clone, receiver);
        });

        Self {
            disk_manager,
            request_sender: sender,
            worker_handle: Some(worker_handle),
        }
    }

    /// Queues a disk request for the background worker. Never blocks on
    /// disk; the caller blocks on the request's completion promise.
    pub fn schedule(&self, request: DiskRequest) -> Result<()> {
        self.request_sender
            .send(Some(request))
            .map_err(|e| ShaleError::DiskScheduler(format!("Failed to schedule request: {}", e)))
    }

    /// Schedules a read request and waits for completion.
    pub fn schedule_read_sync(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);

        let (tx, rx) = std::sync::mpsc::channel();
        let request = DiskRequest::read(page_id, data.as_mut_ptr()).with_callback(tx);

        self.schedule(request)?;

        let success = rx.recv().map_err(|e| {
            ShaleError::DiskScheduler(format!("Failed to receive completion: {}", e))
        })?;
        if !success {
            return Err(ShaleError::DiskScheduler(format!(
                "Read of {} failed",
                page_id
            )));
        }

        Ok(())
    }

    /// Schedules a write request and waits for completion.
    pub fn schedule_write_sync(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);

        let (tx, rx) = std::sync::mpsc::channel();
        // Safety: the worker only reads through the pointer for writes
        let request = DiskRequest::write(page_id, data.as_ptr() as *mut u8).with_callback(tx);

        self.schedule(request)?;

        let success = rx.recv().map_err(|e| {
            ShaleError::DiskScheduler(format!("Failed to receive completion: {}", e))
        })?;
        if !success {
            return Err(ShaleError::DiskScheduler(format!(
                "Write of {} failed",
                page_id
            )));
        }

        Ok(())
    }

    /// The background worker loop. Processes requests in arrival order
    /// until the `None` sentinel (or a closed channel) stops it.
    fn start_worker_thread(disk_manager: Arc<DiskManager>, receiver: Receiver<Option<DiskRequest>>) {
        while let Ok(request) = receiver.recv() {
            match request {
                Some(request) => Self::process_request(&disk_manager, request),
                None => break,
            }
        }
    }

    /// Processes a single disk request and fulfills its promise.
    fn process_request(disk_manager: &DiskManager, request: DiskRequest) {
        let success = if request.is_write {
            // Safety: caller ensures data pointer is valid for PAGE_SIZE bytes
            let data = unsafe { std::slice::from_raw_parts(request.data, PAGE_SIZE) };
            disk_manager.write_page(request.page_id, data).is_ok()
        } else {
            // Safety: caller ensures data pointer is valid for PAGE_SIZE bytes
            let data = unsafe { std::slice::from_raw_parts_mut(request.data, PAGE_SIZE) };
            disk_manager.read_page(request.page_id, data).is_ok()
        };

        // Signal completion
        if let Some(callback) = request.callback {
            let _ = callback.send(success);
        }
    }

    /// Returns a reference to the underlying DiskManager.
    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        // Post the shutdown sentinel; queued requests drain first
        let _ = self.request_sender.send(None);

        if let Some(handle) = self.worker_handle.take() {
            let _ = handle.join();
        }
    }
}
