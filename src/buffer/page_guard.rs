use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::common::{PageId, PAGE_SIZE};

use super::buffer_pool_manager::PoolShared;
use super::FrameHeader;

/// RAII guard for shared read access to a pinned page.
///
/// The guard owns one pin on the frame and the payload read latch for its
/// whole lifetime; dropping it releases the latch and then unpins the
/// page clean. Every code path that fetches a page therefore unpins it,
/// including early returns and error paths.
pub struct ReadPageGuard {
    page_id: PageId,
    shared: Arc<PoolShared>,
    _frame: Arc<FrameHeader>,
    data: Option<RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>>>,
}

impl ReadPageGuard {
    /// # Safety
    /// The payload latch guard is extended to `'static`; this is sound
    /// because the `Arc<FrameHeader>` stored alongside it keeps the
    /// underlying lock alive for at least as long as the guard.
    pub(crate) unsafe fn new(
        page_id: PageId,
        frame: Arc<FrameHeader>,
        shared: Arc<PoolShared>,
    ) -> Self {
        let data = frame.read_data();
        let data: RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>> = std::mem::transmute(data);
        Self {
            page_id,
            shared,
            _frame: frame,
            data: Some(data),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn data(&self) -> &[u8] {
        &self.data.as_ref().unwrap()[..]
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
        // Release the payload latch before unpinning, so a concurrent
        // evictor never waits on this guard while the frame is evictable.
        self.data.take();
        self.shared.unpin_page(self.page_id, false);
    }
}

/// RAII guard for exclusive write access to a pinned page.
///
/// The first `data_mut` marks the guard dirty; the drop handler reports
/// the accumulated dirty flag to the pool along with the unpin.
pub struct WritePageGuard {
    page_id: PageId,
    shared: Arc<PoolShared>,
    _frame: Arc<FrameHeader>,
    data: Option<RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>>>,
    is_dirty: bool,
}

impl WritePageGuard {
    /// # Safety
    /// Same argument as [`ReadPageGuard::new`]: the `Arc<FrameHeader>`
    /// outlives the transmuted latch guard.
    pub(crate) unsafe fn new(
        page_id: PageId,
        frame: Arc<FrameHeader>,
        shared: Arc<PoolShared>,
    ) -> Self {
        let data = frame.write_data();
        let data: RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>> = std::mem::transmute(data);
        Self {
            page_id,
            shared,
            _frame: frame,
            data: Some(data),
            is_dirty: false,
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn data(&self) -> &[u8] {
        &self.data.as_ref().unwrap()[..]
    }

    /// Mutable view of the payload; marks the page dirty.
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.is_dirty = true;
        &mut self.data.as_mut().unwrap()[..]
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
        self.data.take();
        self.shared.unpin_page(self.page_id, self.is_dirty);
    }
}
