use std::collections::LinkedList;
use std::sync::Arc;

use log::{debug, trace};
use parking_lot::Mutex;

use crate::common::{FrameId, PageId, Result, StrataError, DEFAULT_BUCKET_SIZE, INVALID_PAGE_ID, PAGE_SIZE};
use crate::hash::ExtendibleHashTable;
use crate::storage::disk::{DiskManager, DiskScheduler};

use super::{FrameHeader, LruReplacer, ReadPageGuard, WritePageGuard};

/// Pool bookkeeping guarded by the pool-wide latch.
///
/// The page table is an extendible hash instance and the replacer an LRU
/// instance over frame ids; their internal latches are nested inside this
/// one and therefore uncontended.
struct PoolInner {
    page_table: ExtendibleHashTable<PageId, FrameId>,
    free_list: LinkedList<FrameId>,
    replacer: LruReplacer<FrameId>,
}

/// State shared between the manager and the page guards it hands out.
pub(crate) struct PoolShared {
    frames: Vec<Arc<FrameHeader>>,
    inner: Mutex<PoolInner>,
}

impl PoolShared {
    /// The unpin contract: absent pages and unpin mismatches report
    /// false; the dirty flag is OR-ed in before the pin check; a pin
    /// count reaching zero makes the frame evictable.
    pub(crate) fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let mut inner = self.inner.lock();
        let frame_id = match inner.page_table.find(&page_id) {
            Some(frame_id) => frame_id,
            None => return false,
        };
        let frame = &self.frames[frame_id.as_usize()];
        if is_dirty {
            frame.set_dirty(true);
        }
        match frame.unpin() {
            None => false,
            Some(0) => {
                inner.replacer.insert(frame_id);
                true
            }
            Some(_) => true,
        }
    }
}

/// BufferPoolManager caches disk pages in a fixed array of frames.
///
/// Pages are borrowed through RAII guards that hold a pin for their
/// lifetime; eviction candidates come from the free list first and the
/// LRU replacer second, and a dirty victim is always written back before
/// its frame changes tenant. All metadata paths run under one pool-wide
/// latch, including the synchronous disk I/O they trigger.
pub struct BufferPoolManager {
    pool_size: usize,
    shared: Arc<PoolShared>,
    disk_scheduler: DiskScheduler,
}

impl BufferPoolManager {
    /// Creates a pool of `pool_size` frames over the given disk manager.
    pub fn new(pool_size: usize, disk_manager: Arc<DiskManager>) -> Self {
        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = LinkedList::new();

        for i in 0..pool_size {
            let frame_id = FrameId::new(i as u32);
            frames.push(Arc::new(FrameHeader::new(frame_id)));
            free_list.push_back(frame_id);
        }

        let shared = Arc::new(PoolShared {
            frames,
            inner: Mutex::new(PoolInner {
                page_table: ExtendibleHashTable::new(DEFAULT_BUCKET_SIZE),
                free_list,
                replacer: LruReplacer::new(),
            }),
        });

        Self {
            pool_size,
            shared,
            disk_scheduler: DiskScheduler::new(disk_manager),
        }
    }

    /// Fetches a page for shared read access, pinning it for the guard's
    /// lifetime.
    pub fn fetch_read(&self, page_id: PageId) -> Result<ReadPageGuard> {
        let frame = self.pin_page(page_id)?;
        // Safety: the frame Arc stored in the guard outlives the latch guard.
        Ok(unsafe { ReadPageGuard::new(page_id, frame, Arc::clone(&self.shared)) })
    }

    /// Fetches a page for exclusive write access, pinning it for the
    /// guard's lifetime.
    pub fn fetch_write(&self, page_id: PageId) -> Result<WritePageGuard> {
        let frame = self.pin_page(page_id)?;
        // Safety: the frame Arc stored in the guard outlives the latch guard.
        Ok(unsafe { WritePageGuard::new(page_id, frame, Arc::clone(&self.shared)) })
    }

    /// Allocates a fresh page on disk and returns it pinned for writing.
    /// The payload starts zeroed and clean.
    pub fn new_page(&self) -> Result<WritePageGuard> {
        let frame = {
            let mut inner = self.shared.inner.lock();
            let frame_id = self.take_free_frame(&mut inner)?;
            let page_id = match self.disk_scheduler.disk_manager().allocate_page() {
                Ok(page_id) => page_id,
                Err(e) => {
                    inner.free_list.push_back(frame_id);
                    return Err(e);
                }
            };

            let frame = &self.shared.frames[frame_id.as_usize()];
            frame.zero_data();
            frame.assign(page_id);
            inner.page_table.insert(page_id, frame_id);
            trace!("new page {} in frame {}", page_id, frame_id);
            Arc::clone(frame)
        };

        let page_id = frame.page_id();
        // Safety: the frame Arc stored in the guard outlives the latch guard.
        Ok(unsafe { WritePageGuard::new(page_id, frame, Arc::clone(&self.shared)) })
    }

    /// Drops a page from the pool and deallocates it on disk. A resident
    /// pinned page cannot be deleted; otherwise the call always succeeds,
    /// whether or not the page was resident.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut inner = self.shared.inner.lock();
        if let Some(frame_id) = inner.page_table.find(&page_id) {
            let frame = &self.shared.frames[frame_id.as_usize()];
            if frame.pin_count() > 0 {
                return Err(StrataError::PageStillPinned(page_id));
            }
            inner.replacer.erase(&frame_id);
            inner.page_table.remove(&page_id);
            frame.reset();
            inner.free_list.push_back(frame_id);
        }
        self.disk_scheduler.disk_manager().deallocate_page(page_id);
        Ok(true)
    }

    /// Writes a resident page back to disk if it is dirty and clears the
    /// dirty flag, regardless of pin count. Returns false for the invalid
    /// sentinel or a page that is not resident. A second flush without an
    /// intervening write is a no-op.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        if page_id == INVALID_PAGE_ID {
            return Ok(false);
        }
        let inner = self.shared.inner.lock();
        let frame_id = match inner.page_table.find(&page_id) {
            Some(frame_id) => frame_id,
            None => return Ok(false),
        };
        let frame = &self.shared.frames[frame_id.as_usize()];
        if frame.is_dirty() {
            let mut buf = [0u8; PAGE_SIZE];
            frame.copy_to(&mut buf);
            self.disk_scheduler.schedule_write_sync(page_id, &buf)?;
            frame.set_dirty(false);
        }
        Ok(true)
    }

    /// Writes back every resident dirty page.
    pub fn flush_all_pages(&self) -> Result<()> {
        let _inner = self.shared.inner.lock();
        for frame in &self.shared.frames {
            if frame.page_id() != INVALID_PAGE_ID && frame.is_dirty() {
                let mut buf = [0u8; PAGE_SIZE];
                frame.copy_to(&mut buf);
                self.disk_scheduler.schedule_write_sync(frame.page_id(), &buf)?;
                frame.set_dirty(false);
            }
        }
        Ok(())
    }

    /// Current pin count of a resident page, `None` if not resident.
    pub fn get_pin_count(&self, page_id: PageId) -> Option<u32> {
        let inner = self.shared.inner.lock();
        inner
            .page_table
            .find(&page_id)
            .map(|frame_id| self.shared.frames[frame_id.as_usize()].pin_count())
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn free_frame_count(&self) -> usize {
        self.shared.inner.lock().free_list.len()
    }

    /// Number of frames with at least one outstanding pin.
    pub fn pinned_frame_count(&self) -> usize {
        let _inner = self.shared.inner.lock();
        self.shared
            .frames
            .iter()
            .filter(|f| f.pin_count() > 0)
            .count()
    }

    /// Brings a page into the pool (if needed) and pins it. A resident
    /// page is removed from the replacer; a miss claims a frame, reads
    /// the page from disk and installs the new page-table entry.
    fn pin_page(&self, page_id: PageId) -> Result<Arc<FrameHeader>> {
        if page_id == INVALID_PAGE_ID {
            return Err(StrataError::InvalidPageId(page_id));
        }

        let mut inner = self.shared.inner.lock();
        if let Some(frame_id) = inner.page_table.find(&page_id) {
            let frame = &self.shared.frames[frame_id.as_usize()];
            frame.pin();
            inner.replacer.erase(&frame_id);
            return Ok(Arc::clone(frame));
        }

        let frame_id = self.take_free_frame(&mut inner)?;
        let frame = &self.shared.frames[frame_id.as_usize()];

        let mut buf = [0u8; PAGE_SIZE];
        if let Err(e) = self.disk_scheduler.schedule_read_sync(page_id, &mut buf) {
            inner.free_list.push_back(frame_id);
            return Err(e);
        }
        frame.copy_from(&buf);
        frame.assign(page_id);
        inner.page_table.insert(page_id, frame_id);
        Ok(Arc::clone(frame))
    }

    /// Claims a frame for a new tenant: free list first, then an LRU
    /// victim. A dirty victim is written back before its page-table entry
    /// disappears.
    fn take_free_frame(&self, inner: &mut PoolInner) -> Result<FrameId> {
        if let Some(frame_id) = inner.free_list.pop_front() {
            return Ok(frame_id);
        }

        let frame_id = match inner.replacer.victim() {
            Some(frame_id) => frame_id,
            None => return Err(StrataError::BufferPoolFull),
        };
        let frame = &self.shared.frames[frame_id.as_usize()];
        let old_page_id = frame.page_id();

        if frame.is_dirty() {
            debug!("evicting dirty page {}, writing back", old_page_id);
            let mut buf = [0u8; PAGE_SIZE];
            frame.copy_to(&mut buf);
            self.disk_scheduler.schedule_write_sync(old_page_id, &buf)?;
        } else {
            trace!("evicting clean page {}", old_page_id);
        }

        inner.page_table.remove(&old_page_id);
        frame.reset();
        Ok(frame_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn create_pool(pool_size: usize) -> (BufferPoolManager, NamedTempFile) {
        let temp = NamedTempFile::new().unwrap();
        let dm = Arc::new(DiskManager::new(temp.path()).unwrap());
        (BufferPoolManager::new(pool_size, dm), temp)
    }

    #[test]
    fn test_pool_new() {
        let (pool, _temp) = create_pool(8);
        assert_eq!(pool.pool_size(), 8);
        assert_eq!(pool.free_frame_count(), 8);
        assert_eq!(pool.pinned_frame_count(), 0);
    }

    #[test]
    fn test_pool_new_page_is_pinned_and_zeroed() {
        let (pool, _temp) = create_pool(8);

        let guard = pool.new_page().unwrap();
        let page_id = guard.page_id();
        assert_eq!(pool.get_pin_count(page_id), Some(1));
        assert!(guard.data().iter().all(|&b| b == 0));

        drop(guard);
        assert_eq!(pool.get_pin_count(page_id), Some(0));
        assert_eq!(pool.free_frame_count(), 7);
    }

    #[test]
    fn test_pool_read_write_roundtrip() {
        let (pool, _temp) = create_pool(8);
        let page_id = {
            let mut guard = pool.new_page().unwrap();
            guard.data_mut()[0] = 42;
            guard.data_mut()[100] = 255;
            guard.page_id()
        };

        let guard = pool.fetch_read(page_id).unwrap();
        assert_eq!(guard.data()[0], 42);
        assert_eq!(guard.data()[100], 255);
    }

    #[test]
    fn test_pool_eviction_when_full() {
        let (pool, _temp) = create_pool(2);

        let p1 = pool.new_page().unwrap().page_id();
        let p2 = pool.new_page().unwrap().page_id();
        assert_eq!(pool.free_frame_count(), 0);

        // Both unpinned, so a third page evicts one of them.
        let p3 = pool.new_page().unwrap().page_id();
        assert_ne!(p3, p1);
        assert_ne!(p3, p2);

        let resident = [p1, p2]
            .iter()
            .filter(|p| pool.get_pin_count(**p).is_some())
            .count();
        assert_eq!(resident, 1);
    }

    #[test]
    fn test_pool_full_when_all_pinned() {
        let (pool, _temp) = create_pool(2);

        let _g1 = pool.new_page().unwrap();
        let _g2 = pool.new_page().unwrap();

        assert!(matches!(pool.new_page(), Err(StrataError::BufferPoolFull)));
    }

    #[test]
    fn test_pool_evicted_page_comes_back_from_disk() {
        let (pool, _temp) = create_pool(2);

        let mut page_ids = Vec::new();
        for i in 0..4u8 {
            let mut guard = pool.new_page().unwrap();
            guard.data_mut()[0] = i;
            page_ids.push(guard.page_id());
        }

        for (i, &page_id) in page_ids.iter().enumerate() {
            let guard = pool.fetch_read(page_id).unwrap();
            assert_eq!(guard.data()[0], i as u8);
        }
    }

    #[test]
    fn test_pool_delete_page() {
        let (pool, _temp) = create_pool(8);
        let page_id = pool.new_page().unwrap().page_id();

        assert!(pool.delete_page(page_id).unwrap());
        assert_eq!(pool.get_pin_count(page_id), None);
        assert_eq!(pool.free_frame_count(), 8);
    }

    #[test]
    fn test_pool_delete_pinned_page_fails() {
        let (pool, _temp) = create_pool(8);
        let guard = pool.new_page().unwrap();

        let result = pool.delete_page(guard.page_id());
        assert!(matches!(result, Err(StrataError::PageStillPinned(_))));
    }

    #[test]
    fn test_pool_delete_absent_page_still_deallocates() {
        let (pool, _temp) = create_pool(8);
        let page_id = pool.new_page().unwrap().page_id();
        assert!(pool.delete_page(page_id).unwrap());
        // A second delete finds nothing resident but still succeeds.
        assert!(pool.delete_page(page_id).unwrap());
    }

    #[test]
    fn test_pool_flush_page() {
        let (pool, temp) = create_pool(8);
        let page_id = {
            let mut guard = pool.new_page().unwrap();
            guard.data_mut()[0] = 0x77;
            guard.page_id()
        };

        assert!(pool.flush_page(page_id).unwrap());
        assert!(!pool.flush_page(INVALID_PAGE_ID).unwrap());
        assert!(!pool.flush_page(PageId::new(9999)).unwrap());

        let dm = DiskManager::new(temp.path()).unwrap();
        let mut buf = [0u8; PAGE_SIZE];
        dm.read_page(page_id, &mut buf).unwrap();
        assert_eq!(buf[0], 0x77);
    }

    #[test]
    fn test_pool_flush_is_idempotent_on_disk() {
        let (pool, _temp) = create_pool(8);
        let page_id = {
            let mut guard = pool.new_page().unwrap();
            guard.data_mut()[0] = 1;
            guard.page_id()
        };

        pool.flush_page(page_id).unwrap();
        let writes_after_first = pool.disk_scheduler.disk_manager().num_writes();
        pool.flush_page(page_id).unwrap();
        assert_eq!(pool.disk_scheduler.disk_manager().num_writes(), writes_after_first);
    }

    #[test]
    fn test_pool_pin_count_balances() {
        let (pool, _temp) = create_pool(4);
        let page_id = pool.new_page().unwrap().page_id();

        for _ in 0..5 {
            let _g = pool.fetch_read(page_id).unwrap();
        }
        assert_eq!(pool.get_pin_count(page_id), Some(0));
        assert_eq!(pool.pinned_frame_count(), 0);
    }

    #[test]
    fn test_pool_page_table_matches_frames() {
        let (pool, _temp) = create_pool(4);
        let mut page_ids = Vec::new();
        for _ in 0..8 {
            page_ids.push(pool.new_page().unwrap().page_id());
        }

        for page_id in page_ids {
            if pool.get_pin_count(page_id).is_some() {
                let guard = pool.fetch_read(page_id).unwrap();
                assert_eq!(guard.page_id(), page_id);
            }
        }
    }
}
