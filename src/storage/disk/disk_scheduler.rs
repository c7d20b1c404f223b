use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

use crate::common::{PageId, Result, StrataError, PAGE_SIZE};

use super::DiskManager;

/// One queued I/O request. The buffers are raw pointers because the
/// caller blocks on the completion channel until the worker is done with
/// them; they must stay valid until the completion signal arrives.
pub enum DiskRequest {
    Read {
        page_id: PageId,
        buf: *mut u8,
        done: mpsc::Sender<bool>,
    },
    Write {
        page_id: PageId,
        buf: *const u8,
        done: mpsc::Sender<bool>,
    },
}

// Safety: the worker thread is the only consumer of a request, and the
// submitting thread keeps the buffer alive until `done` fires.
unsafe impl Send for DiskRequest {}

/// DiskScheduler funnels page I/O through a single background worker fed
/// by a bounded queue. The synchronous entry points block the caller
/// until the worker reports completion, which keeps the buffer pool's
/// "I/O happens inside the latch" discipline intact while still putting
/// every disk touch on one thread.
pub struct DiskScheduler {
    disk_manager: Arc<DiskManager>,
    request_sender: Sender<DiskRequest>,
    shutdown: Arc<AtomicBool>,
    worker_handle: Option<JoinHandle<()>>,
}

impl DiskScheduler {
    pub fn new(disk_manager: Arc<DiskManager>) -> Self {
        let (sender, receiver) = bounded::<DiskRequest>(128);
        let shutdown = Arc::new(AtomicBool::new(false));

        let dm = Arc::clone(&disk_manager);
        let shutdown_flag = Arc::clone(&shutdown);
        let worker_handle = thread::spawn(move || Self::run_worker(dm, receiver, shutdown_flag));

        Self {
            disk_manager,
            request_sender: sender,
            shutdown,
            worker_handle: Some(worker_handle),
        }
    }

    /// Queues a request without waiting for it.
    pub fn schedule(&self, request: DiskRequest) -> Result<()> {
        self.request_sender
            .send(request)
            .map_err(|e| StrataError::DiskScheduler(format!("failed to queue request: {}", e)))
    }

    /// Reads a page, blocking until the worker has filled `data`.
    pub fn schedule_read_sync(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);

        let (tx, rx) = mpsc::channel();
        self.schedule(DiskRequest::Read {
            page_id,
            buf: data.as_mut_ptr(),
            done: tx,
        })?;
        Self::wait_for(rx, page_id, "read")
    }

    /// Writes a page, blocking until the worker has consumed `data`.
    pub fn schedule_write_sync(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);

        let (tx, rx) = mpsc::channel();
        self.schedule(DiskRequest::Write {
            page_id,
            buf: data.as_ptr(),
            done: tx,
        })?;
        Self::wait_for(rx, page_id, "write")
    }

    fn wait_for(rx: mpsc::Receiver<bool>, page_id: PageId, op: &str) -> Result<()> {
        match rx.recv() {
            Ok(true) => Ok(()),
            Ok(false) => Err(StrataError::DiskScheduler(format!(
                "{} of {} failed on worker",
                op, page_id
            ))),
            Err(e) => Err(StrataError::DiskScheduler(format!(
                "lost completion for {} of {}: {}",
                op, page_id, e
            ))),
        }
    }

    fn run_worker(
        disk_manager: Arc<DiskManager>,
        receiver: Receiver<DiskRequest>,
        shutdown: Arc<AtomicBool>,
    ) {
        loop {
            if shutdown.load(Ordering::Relaxed) {
                // Drain whatever is still queued so no caller hangs.
                while let Ok(request) = receiver.try_recv() {
                    Self::process(&disk_manager, request);
                }
                break;
            }

            match receiver.recv_timeout(Duration::from_millis(100)) {
                Ok(request) => Self::process(&disk_manager, request),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    fn process(disk_manager: &DiskManager, request: DiskRequest) {
        match request {
            DiskRequest::Read { page_id, buf, done } => {
                // Safety: the submitter keeps the buffer alive until it
                // receives the completion signal sent below.
                let data = unsafe { std::slice::from_raw_parts_mut(buf, PAGE_SIZE) };
                let ok = disk_manager.read_page(page_id, data).is_ok();
                let _ = done.send(ok);
            }
            DiskRequest::Write { page_id, buf, done } => {
                // Safety: same as above.
                let data = unsafe { std::slice::from_raw_parts(buf, PAGE_SIZE) };
                let ok = disk_manager.write_page(page_id, data).is_ok();
                let _ = done.send(ok);
            }
        }
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.worker_handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_scheduler_read_write() {
        let temp = NamedTempFile::new().unwrap();
        let dm = Arc::new(DiskManager::new(temp.path()).unwrap());
        let scheduler = DiskScheduler::new(dm);

        let page_id = scheduler.disk_manager().allocate_page().unwrap();

        let mut data = [0u8; PAGE_SIZE];
        data[0] = 42;
        data[100] = 255;
        scheduler.schedule_write_sync(page_id, &data).unwrap();

        let mut out = [0u8; PAGE_SIZE];
        scheduler.schedule_read_sync(page_id, &mut out).unwrap();
        assert_eq!(out[0], 42);
        assert_eq!(out[100], 255);
    }

    #[test]
    fn test_scheduler_interleaved_requests() {
        let temp = NamedTempFile::new().unwrap();
        let dm = Arc::new(DiskManager::new(temp.path()).unwrap());
        let scheduler = DiskScheduler::new(dm);

        let pages: Vec<PageId> = (0..4)
            .map(|_| scheduler.disk_manager().allocate_page().unwrap())
            .collect();

        for (i, &page_id) in pages.iter().enumerate() {
            let data = [i as u8; PAGE_SIZE];
            scheduler.schedule_write_sync(page_id, &data).unwrap();
        }

        for (i, &page_id) in pages.iter().enumerate() {
            let mut out = [0u8; PAGE_SIZE];
            scheduler.schedule_read_sync(page_id, &mut out).unwrap();
            assert_eq!(out[0], i as u8);
        }
    }
}
