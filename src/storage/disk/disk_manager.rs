use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::common::{PageId, Result, StrataError, HEADER_PAGE_ID, PAGE_SIZE};
use crate::storage::page::{HeaderPage, HeaderPageRef};

/// DiskManager performs page-granular I/O against a single database file
/// and hands out page ids.
///
/// Page 0 is the header page: a fresh file gets it formatted on creation,
/// an existing file is validated against its magic on open. Deallocated
/// ids go on a free list for reuse; the file itself never shrinks.
pub struct DiskManager {
    db_file: Mutex<File>,
    db_path: PathBuf,
    num_pages: AtomicU32,
    free_pages: Mutex<Vec<PageId>>,
    num_reads: AtomicU32,
    num_writes: AtomicU32,
}

impl DiskManager {
    /// Opens (or creates) the database file at `db_path`.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&db_path)?;

        let file_size = file.metadata()?.len();
        let num_pages = (file_size / PAGE_SIZE as u64) as u32;

        let dm = Self {
            db_file: Mutex::new(file),
            db_path,
            num_pages: AtomicU32::new(num_pages.max(1)),
            free_pages: Mutex::new(Vec::new()),
            num_reads: AtomicU32::new(0),
            num_writes: AtomicU32::new(0),
        };

        if num_pages == 0 {
            dm.init_header_page()?;
        } else {
            dm.validate_header_page()?;
        }

        Ok(dm)
    }

    fn init_header_page(&self) -> Result<()> {
        let mut data = [0u8; PAGE_SIZE];
        HeaderPage::new(&mut data).init();
        self.write_page(HEADER_PAGE_ID, &data)
    }

    fn validate_header_page(&self) -> Result<()> {
        let mut data = [0u8; PAGE_SIZE];
        self.read_page(HEADER_PAGE_ID, &mut data)?;
        if !HeaderPageRef::new(&data).is_valid() {
            return Err(StrataError::InvalidDatabaseFile);
        }
        Ok(())
    }

    /// Reads one page into the provided buffer. A read past the current
    /// end of file yields zeroes.
    pub fn read_page(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "buffer must be PAGE_SIZE bytes");

        let offset = page_id.as_u64() * PAGE_SIZE as u64;
        let mut file = self.db_file.lock();
        file.seek(SeekFrom::Start(offset))?;

        let bytes_read = file.read(data)?;
        if bytes_read < PAGE_SIZE {
            data[bytes_read..].fill(0);
        }

        self.num_reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Writes one page from the provided buffer and flushes it.
    pub fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "buffer must be PAGE_SIZE bytes");

        let offset = page_id.as_u64() * PAGE_SIZE as u64;
        let mut file = self.db_file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        file.flush()?;

        self.num_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Hands out a page id, preferring previously deallocated ids, and
    /// zeroes the page on disk.
    pub fn allocate_page(&self) -> Result<PageId> {
        let page_id = match self.free_pages.lock().pop() {
            Some(page_id) => page_id,
            None => PageId::new(self.num_pages.fetch_add(1, Ordering::SeqCst)),
        };

        let zeros = [0u8; PAGE_SIZE];
        self.write_page(page_id, &zeros)?;
        Ok(page_id)
    }

    /// Returns a page id to the allocator. The header page is never
    /// recycled.
    pub fn deallocate_page(&self, page_id: PageId) {
        if page_id != HEADER_PAGE_ID {
            self.free_pages.lock().push(page_id);
        }
    }

    pub fn num_pages(&self) -> u32 {
        self.num_pages.load(Ordering::Relaxed)
    }

    pub fn num_reads(&self) -> u32 {
        self.num_reads.load(Ordering::Relaxed)
    }

    pub fn num_writes(&self) -> u32 {
        self.num_writes.load(Ordering::Relaxed)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn sync(&self) -> Result<()> {
        self.db_file.lock().sync_all()?;
        Ok(())
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        let _ = self.db_file.get_mut().sync_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disk_manager_formats_header_page() {
        let temp = tempfile::NamedTempFile::new().unwrap();
        let dm = DiskManager::new(temp.path()).unwrap();
        assert_eq!(dm.num_pages(), 1);

        let mut data = [0u8; PAGE_SIZE];
        dm.read_page(HEADER_PAGE_ID, &mut data).unwrap();
        assert!(HeaderPageRef::new(&data).is_valid());
    }

    #[test]
    fn test_disk_manager_rejects_garbage_file() {
        let temp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(temp.path(), vec![0xFFu8; PAGE_SIZE]).unwrap();

        assert!(matches!(
            DiskManager::new(temp.path()),
            Err(StrataError::InvalidDatabaseFile)
        ));
    }

    #[test]
    fn test_disk_manager_allocate_skips_header() {
        let temp = tempfile::NamedTempFile::new().unwrap();
        let dm = DiskManager::new(temp.path()).unwrap();

        let page_id = dm.allocate_page().unwrap();
        assert_eq!(page_id, PageId::new(1));
    }

    #[test]
    fn test_disk_manager_read_write_roundtrip() {
        let temp = tempfile::NamedTempFile::new().unwrap();
        let dm = DiskManager::new(temp.path()).unwrap();

        let page_id = dm.allocate_page().unwrap();
        let mut data = [0u8; PAGE_SIZE];
        data[0] = 42;
        data[PAGE_SIZE - 1] = 128;
        dm.write_page(page_id, &data).unwrap();

        let mut out = [0u8; PAGE_SIZE];
        dm.read_page(page_id, &mut out).unwrap();
        assert_eq!(out[0], 42);
        assert_eq!(out[PAGE_SIZE - 1], 128);
    }

    #[test]
    fn test_disk_manager_read_past_eof_is_zeroed() {
        let temp = tempfile::NamedTempFile::new().unwrap();
        let dm = DiskManager::new(temp.path()).unwrap();

        let mut data = [0xAAu8; PAGE_SIZE];
        dm.read_page(PageId::new(100), &mut data).unwrap();
        assert!(data.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_disk_manager_reuses_deallocated_ids() {
        let temp = tempfile::NamedTempFile::new().unwrap();
        let dm = DiskManager::new(temp.path()).unwrap();

        let p1 = dm.allocate_page().unwrap();
        dm.deallocate_page(p1);
        let p2 = dm.allocate_page().unwrap();
        assert_eq!(p1, p2);
    }

    #[test]
    fn test_disk_manager_persistence() {
        let temp = tempfile::NamedTempFile::new().unwrap();
        let page_id;
        {
            let dm = DiskManager::new(temp.path()).unwrap();
            page_id = dm.allocate_page().unwrap();
            let mut data = [0u8; PAGE_SIZE];
            data[0] = 123;
            dm.write_page(page_id, &data).unwrap();
        }
        {
            let dm = DiskManager::new(temp.path()).unwrap();
            assert_eq!(dm.num_pages(), 2);
            let mut data = [0u8; PAGE_SIZE];
            dm.read_page(page_id, &mut data).unwrap();
            assert_eq!(data[0], 123);
        }
    }
}
