use crate::common::{PageId, Result, StrataError, PAGE_SIZE};

const MAGIC_NUMBER: u32 = 0x5354_5241; // "STRA"
const VERSION: u32 = 1;

const MAGIC_OFFSET: usize = 0;
const VERSION_OFFSET: usize = 4;
const RECORD_COUNT_OFFSET: usize = 8;
const RECORDS_OFFSET: usize = 12;

/// 32 bytes of zero-padded name followed by the root page id.
const MAX_NAME_LEN: usize = 32;
const RECORD_SIZE: usize = MAX_NAME_LEN + 4;
const MAX_RECORDS: usize = (PAGE_SIZE - RECORDS_OFFSET) / RECORD_SIZE;

fn encode_name(name: &str) -> Result<[u8; MAX_NAME_LEN]> {
    let bytes = name.as_bytes();
    if bytes.is_empty() || bytes.len() > MAX_NAME_LEN {
        return Err(StrataError::InvalidIndexName(name.to_string()));
    }
    let mut out = [0u8; MAX_NAME_LEN];
    out[..bytes.len()].copy_from_slice(bytes);
    Ok(out)
}

/// Mutable view of the header page: a small directory of
/// `(index name, root page id)` records at the fixed page 0.
///
/// The B+Tree pins this page only long enough to record its root after a
/// root change; the buffer pool treats it as an ordinary page.
pub struct HeaderPage<'a> {
    data: &'a mut [u8],
}

impl<'a> HeaderPage<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn init(&mut self) {
        self.data.fill(0);
        self.data[MAGIC_OFFSET..MAGIC_OFFSET + 4].copy_from_slice(&MAGIC_NUMBER.to_le_bytes());
        self.data[VERSION_OFFSET..VERSION_OFFSET + 4].copy_from_slice(&VERSION.to_le_bytes());
        self.set_record_count(0);
    }

    pub fn is_valid(&self) -> bool {
        HeaderPageRef::new(self.data).is_valid()
    }

    pub fn record_count(&self) -> u32 {
        HeaderPageRef::new(self.data).record_count()
    }

    fn set_record_count(&mut self, count: u32) {
        self.data[RECORD_COUNT_OFFSET..RECORD_COUNT_OFFSET + 4]
            .copy_from_slice(&count.to_le_bytes());
    }

    /// Registers a new `(name, root)` record. Fails if the name is
    /// already present or the directory is full.
    pub fn insert_record(&mut self, name: &str, root_page_id: PageId) -> Result<()> {
        let encoded = encode_name(name)?;
        if self.find_slot(&encoded).is_some() {
            return Err(StrataError::IndexAlreadyExists(name.to_string()));
        }
        let count = self.record_count() as usize;
        if count >= MAX_RECORDS {
            return Err(StrataError::HeaderFull);
        }

        let offset = RECORDS_OFFSET + count * RECORD_SIZE;
        self.data[offset..offset + MAX_NAME_LEN].copy_from_slice(&encoded);
        self.data[offset + MAX_NAME_LEN..offset + RECORD_SIZE]
            .copy_from_slice(&root_page_id.as_u32().to_le_bytes());
        self.set_record_count(count as u32 + 1);
        Ok(())
    }

    /// Rewrites the root page id of an existing record. Fails if the
    /// name is absent.
    pub fn update_record(&mut self, name: &str, root_page_id: PageId) -> Result<()> {
        let encoded = encode_name(name)?;
        let slot = self
            .find_slot(&encoded)
            .ok_or_else(|| StrataError::IndexNotFound(name.to_string()))?;

        let offset = RECORDS_OFFSET + slot * RECORD_SIZE;
        self.data[offset + MAX_NAME_LEN..offset + RECORD_SIZE]
            .copy_from_slice(&root_page_id.as_u32().to_le_bytes());
        Ok(())
    }

    pub fn get_record(&self, name: &str) -> Option<PageId> {
        HeaderPageRef::new(self.data).get_record(name)
    }

    fn find_slot(&self, encoded: &[u8; MAX_NAME_LEN]) -> Option<usize> {
        let count = self.record_count() as usize;
        (0..count).find(|&i| {
            let offset = RECORDS_OFFSET + i * RECORD_SIZE;
            &self.data[offset..offset + MAX_NAME_LEN] == encoded
        })
    }
}

/// Read-only view of the header page.
pub struct HeaderPageRef<'a> {
    data: &'a [u8],
}

impl<'a> HeaderPageRef<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn is_valid(&self) -> bool {
        let magic = u32::from_le_bytes(self.data[MAGIC_OFFSET..MAGIC_OFFSET + 4].try_into().unwrap());
        magic == MAGIC_NUMBER
    }

    pub fn record_count(&self) -> u32 {
        u32::from_le_bytes(
            self.data[RECORD_COUNT_OFFSET..RECORD_COUNT_OFFSET + 4]
                .try_into()
                .unwrap(),
        )
    }

    /// Root page id registered under `name`, if any.
    pub fn get_record(&self, name: &str) -> Option<PageId> {
        let encoded = encode_name(name).ok()?;
        let count = self.record_count() as usize;
        for i in 0..count {
            let offset = RECORDS_OFFSET + i * RECORD_SIZE;
            if self.data[offset..offset + MAX_NAME_LEN] == encoded {
                let root = u32::from_le_bytes(
                    self.data[offset + MAX_NAME_LEN..offset + RECORD_SIZE]
                        .try_into()
                        .unwrap(),
                );
                return Some(PageId::new(root));
            }
        }
        None
    }
}
