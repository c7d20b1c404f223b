use std::sync::Arc;

use crate::buffer::{BufferPoolManager, ReadPageGuard};
use crate::common::{RecordId, Result, INVALID_PAGE_ID};

use super::btree_page::LeafNodeRef;
use super::key_comparator::IndexKey;

/// Forward iterator over leaf entries in key order.
///
/// Holds one pin: the read guard on the current leaf. Advancing past a
/// leaf fetches the right sibling before releasing the old guard;
/// dropping the iterator releases whatever it still holds. The invariant
/// between calls is that `leaf` is either `None` (end) or positioned so
/// that `index` addresses a real entry.
pub struct IndexIterator {
    bpm: Arc<BufferPoolManager>,
    leaf: Option<ReadPageGuard>,
    index: usize,
}

impl IndexIterator {
    pub(crate) fn at_end(bpm: Arc<BufferPoolManager>) -> Self {
        Self {
            bpm,
            leaf: None,
            index: 0,
        }
    }

    pub(crate) fn new(
        bpm: Arc<BufferPoolManager>,
        leaf: ReadPageGuard,
        index: usize,
    ) -> Result<Self> {
        let mut iter = Self {
            bpm,
            leaf: Some(leaf),
            index,
        };
        iter.skip_exhausted()?;
        Ok(iter)
    }

    /// Moves along the sibling chain until `index` addresses an entry or
    /// the chain runs out. Also covers the starting position `begin_at`
    /// produces when the target leaf holds no key at or above the bound.
    fn skip_exhausted(&mut self) -> Result<()> {
        loop {
            let next = match &self.leaf {
                None => return Ok(()),
                Some(guard) => {
                    let leaf = LeafNodeRef::new(guard.data());
                    if self.index < leaf.size() as usize {
                        return Ok(());
                    }
                    leaf.next_page_id()
                }
            };

            if next == INVALID_PAGE_ID {
                self.leaf = None;
                return Ok(());
            }
            let guard = self.bpm.fetch_read(next)?;
            self.leaf = Some(guard);
            self.index = 0;
        }
    }

    pub fn is_end(&self) -> bool {
        self.leaf.is_none()
    }

    /// Returns the current entry and advances, or `None` at the end.
    pub fn next_entry(&mut self) -> Result<Option<(IndexKey, RecordId)>> {
        let item = match &self.leaf {
            None => return Ok(None),
            Some(guard) => LeafNodeRef::new(guard.data()).item_at(self.index),
        };
        self.index += 1;
        self.skip_exhausted()?;
        Ok(Some(item))
    }
}

impl Iterator for IndexIterator {
    type Item = Result<(IndexKey, RecordId)>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_entry() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
