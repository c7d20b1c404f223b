use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::common::{FrameId, PageId, INVALID_PAGE_ID, PAGE_SIZE};

struct FrameMeta {
    page_id: PageId,
    pin_count: u32,
    is_dirty: bool,
}

/// One fixed-size cell of the buffer pool: the current tenant's metadata
/// plus the page payload.
///
/// A frame with `pin_count > 0` must never be chosen as a victim; a frame
/// with no tenant (`page_id == INVALID_PAGE_ID`) belongs on the free
/// list. The pool-wide latch serializes metadata transitions; the payload
/// has its own reader-writer latch so page guards can hold it across the
/// caller's critical section.
pub struct FrameHeader {
    frame_id: FrameId,
    meta: Mutex<FrameMeta>,
    data: RwLock<Box<[u8; PAGE_SIZE]>>,
}

impl FrameHeader {
    pub fn new(frame_id: FrameId) -> Self {
        Self {
            frame_id,
            meta: Mutex::new(FrameMeta {
                page_id: INVALID_PAGE_ID,
                pin_count: 0,
                is_dirty: false,
            }),
            data: RwLock::new(Box::new([0u8; PAGE_SIZE])),
        }
    }

    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    pub fn page_id(&self) -> PageId {
        self.meta.lock().page_id
    }

    pub fn pin_count(&self) -> u32 {
        self.meta.lock().pin_count
    }

    /// Increments the pin count and returns the new value.
    pub fn pin(&self) -> u32 {
        let mut meta = self.meta.lock();
        meta.pin_count += 1;
        meta.pin_count
    }

    /// Decrements the pin count and returns the new value, or `None` if
    /// the frame was not pinned (an unpin-mismatch bug in the caller).
    pub fn unpin(&self) -> Option<u32> {
        let mut meta = self.meta.lock();
        if meta.pin_count == 0 {
            return None;
        }
        meta.pin_count -= 1;
        Some(meta.pin_count)
    }

    pub fn is_dirty(&self) -> bool {
        self.meta.lock().is_dirty
    }

    pub fn set_dirty(&self, dirty: bool) {
        self.meta.lock().is_dirty = dirty;
    }

    /// Installs a new tenant: pinned once, clean. The payload is left
    /// untouched; callers load or zero it separately.
    pub fn assign(&self, page_id: PageId) {
        let mut meta = self.meta.lock();
        meta.page_id = page_id;
        meta.pin_count = 1;
        meta.is_dirty = false;
    }

    /// Returns the frame to its empty state: no tenant, unpinned, clean,
    /// zeroed payload.
    pub fn reset(&self) {
        {
            let mut meta = self.meta.lock();
            meta.page_id = INVALID_PAGE_ID;
            meta.pin_count = 0;
            meta.is_dirty = false;
        }
        self.data.write().fill(0);
    }

    pub fn zero_data(&self) {
        self.data.write().fill(0);
    }

    pub fn copy_from(&self, src: &[u8]) {
        assert_eq!(src.len(), PAGE_SIZE);
        self.data.write().copy_from_slice(src);
    }

    pub fn copy_to(&self, dst: &mut [u8]) {
        assert_eq!(dst.len(), PAGE_SIZE);
        dst.copy_from_slice(&**self.data.read());
    }

    pub(crate) fn read_data(&self) -> RwLockReadGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.data.read()
    }

    pub(crate) fn write_data(&self) -> RwLockWriteGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.data.write()
    }
}
