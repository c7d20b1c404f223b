use std::sync::Arc;

use crate::buffer::BufferPoolManager;
use crate::common::{PageId, RecordId, Result, StrataError, HEADER_PAGE_ID, INVALID_PAGE_ID};
use crate::storage::page::{HeaderPage, HeaderPageRef};

use super::btree_page::{
    InternalNode, LeafNode, LeafNodeRef, TreeNodeMut, TreeNodeRef, DEFAULT_INTERNAL_MAX_SIZE,
    DEFAULT_LEAF_MAX_SIZE,
};
use super::index_iterator::IndexIterator;
use super::key_comparator::{IndexKey, KeyComparator};

/// Unique-key B+Tree index whose nodes live in buffer pool pages.
///
/// Every node access borrows the page through a guard and releases it on
/// scope exit, so pins are balanced on all paths. The tree itself holds
/// no lock: `insert` takes `&mut self` and callers coordinate writers
/// externally; frame allocation is serialized by the pool underneath.
///
/// An empty tree is represented by `INVALID_PAGE_ID` as the root. The
/// current root is mirrored into the header page whenever it changes, so
/// the index can be reopened by name.
pub struct BPlusTree<C: KeyComparator> {
    index_name: String,
    root_page_id: PageId,
    bpm: Arc<BufferPoolManager>,
    comparator: C,
    leaf_max_size: u16,
    internal_max_size: u16,
}

impl<C: KeyComparator> BPlusTree<C> {
    /// Creates a handle over an index whose root is already known
    /// (`INVALID_PAGE_ID` for a new, empty index).
    pub fn new(
        index_name: impl Into<String>,
        bpm: Arc<BufferPoolManager>,
        comparator: C,
        root_page_id: PageId,
    ) -> Self {
        Self {
            index_name: index_name.into(),
            root_page_id,
            bpm,
            comparator,
            leaf_max_size: DEFAULT_LEAF_MAX_SIZE,
            internal_max_size: DEFAULT_INTERNAL_MAX_SIZE,
        }
    }

    /// Overrides the node capacities for newly created nodes. Small
    /// capacities force splits early, which the tests rely on.
    pub fn with_node_capacity(mut self, leaf_max_size: u16, internal_max_size: u16) -> Self {
        self.leaf_max_size = leaf_max_size;
        self.internal_max_size = internal_max_size;
        self
    }

    /// Opens an index by name, reading its root page id from the header
    /// page. An unregistered name yields an empty tree.
    pub fn open(index_name: impl Into<String>, bpm: Arc<BufferPoolManager>, comparator: C) -> Result<Self> {
        let index_name = index_name.into();
        let root_page_id = {
            let guard = bpm.fetch_read(HEADER_PAGE_ID)?;
            HeaderPageRef::new(guard.data())
                .get_record(&index_name)
                .unwrap_or(INVALID_PAGE_ID)
        };
        Ok(Self::new(index_name, bpm, comparator, root_page_id))
    }

    pub fn is_empty(&self) -> bool {
        self.root_page_id == INVALID_PAGE_ID
    }

    pub fn root_page_id(&self) -> PageId {
        self.root_page_id
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// Point lookup. On a hit the result is exactly the stored value; a
    /// miss leaves nothing behind.
    pub fn get_value(&self, key: IndexKey) -> Result<Option<RecordId>> {
        if self.is_empty() {
            return Ok(None);
        }
        let leaf_page_id = self.find_leaf(key, false)?;
        let guard = self.bpm.fetch_read(leaf_page_id)?;
        Ok(LeafNodeRef::new(guard.data()).lookup(key, &self.comparator))
    }

    /// Inserts a unique key. Returns false (with no side effect) when the
    /// key is already present.
    pub fn insert(&mut self, key: IndexKey, value: RecordId) -> Result<bool> {
        if self.is_empty() {
            self.start_new_tree(key, value)?;
            return Ok(true);
        }

        let leaf_page_id = self.find_leaf(key, false)?;

        {
            let guard = self.bpm.fetch_read(leaf_page_id)?;
            if LeafNodeRef::new(guard.data())
                .lookup(key, &self.comparator)
                .is_some()
            {
                return Ok(false);
            }
        }

        let (new_size, max_size) = {
            let mut guard = self.bpm.fetch_write(leaf_page_id)?;
            let mut leaf = LeafNode::new(guard.data_mut());
            (leaf.insert(key, value, &self.comparator), leaf.max_size())
        };

        // One overflow rule for leaves and internals alike: insert first,
        // split once the size passes max_size.
        if new_size > max_size {
            self.split_leaf(leaf_page_id)?;
        }
        Ok(true)
    }

    /// Deletion is declared for interface completeness but not
    /// implemented; see DESIGN.md.
    pub fn remove(&mut self, _key: IndexKey) -> Result<bool> {
        Err(StrataError::Unsupported("B+Tree deletion"))
    }

    /// Iterator over the whole tree in key order.
    pub fn begin(&self) -> Result<IndexIterator> {
        if self.is_empty() {
            return Ok(IndexIterator::at_end(Arc::clone(&self.bpm)));
        }
        let leaf_page_id = self.find_leaf(0, true)?;
        let guard = self.bpm.fetch_read(leaf_page_id)?;
        IndexIterator::new(Arc::clone(&self.bpm), guard, 0)
    }

    /// Iterator positioned at the first entry with key `>= key`.
    pub fn begin_at(&self, key: IndexKey) -> Result<IndexIterator> {
        if self.is_empty() {
            return Ok(IndexIterator::at_end(Arc::clone(&self.bpm)));
        }
        let leaf_page_id = self.find_leaf(key, false)?;
        let guard = self.bpm.fetch_read(leaf_page_id)?;
        let index = LeafNodeRef::new(guard.data()).key_index(key, &self.comparator);
        IndexIterator::new(Arc::clone(&self.bpm), guard, index)
    }

    /// Walks from the root to the leaf that does (or would) hold `key`,
    /// unpinning each parent as soon as the child page id is known.
    fn find_leaf(&self, key: IndexKey, leftmost: bool) -> Result<PageId> {
        let mut page_id = self.root_page_id;
        loop {
            let guard = self.bpm.fetch_read(page_id)?;
            let next = match TreeNodeRef::parse(guard.data())? {
                TreeNodeRef::Leaf(_) => return Ok(page_id),
                TreeNodeRef::Internal(node) => {
                    if leftmost {
                        node.child_at(0)
                    } else {
                        node.lookup(key, &self.comparator)
                    }
                }
            };
            drop(guard);
            page_id = next;
        }
    }

    /// First insert into an empty tree: a fresh leaf becomes the root and
    /// gets registered in the header page.
    fn start_new_tree(&mut self, key: IndexKey, value: RecordId) -> Result<()> {
        let mut guard = self.bpm.new_page()?;
        let root_page_id = guard.page_id();
        {
            let mut root = LeafNode::new(guard.data_mut());
            root.init(root_page_id, INVALID_PAGE_ID, self.leaf_max_size);
            root.insert(key, value, &self.comparator);
        }
        drop(guard);

        self.root_page_id = root_page_id;
        self.update_root_page_id(true)
    }

    /// Splits an overflowing leaf: the upper half moves to a new right
    /// sibling, the sibling chain is spliced, and the sibling's first key
    /// goes up as the separator.
    fn split_leaf(&mut self, leaf_page_id: PageId) -> Result<()> {
        let mut new_guard = self.bpm.new_page()?;
        let new_page_id = new_guard.page_id();

        let mut old_guard = self.bpm.fetch_write(leaf_page_id)?;
        let (separator, parent_page_id) = {
            let mut old_leaf = LeafNode::new(old_guard.data_mut());
            let parent = old_leaf.parent_page_id();
            let next = old_leaf.next_page_id();
            let max_size = old_leaf.max_size();

            let mut new_leaf = LeafNode::new(new_guard.data_mut());
            new_leaf.init(new_page_id, parent, max_size);
            old_leaf.move_half_to(&mut new_leaf);
            new_leaf.set_next_page_id(next);
            old_leaf.set_next_page_id(new_page_id);

            (new_leaf.key_at(0), parent)
        };
        drop(old_guard);
        drop(new_guard);

        self.insert_into_parent(leaf_page_id, separator, new_page_id, parent_page_id)
    }

    /// Splits an overflowing internal node; the separator returned by
    /// `move_half_to` goes up, and the moved children are reparented.
    fn split_internal(&mut self, node_page_id: PageId, parent_page_id: PageId) -> Result<()> {
        let mut new_guard = self.bpm.new_page()?;
        let new_page_id = new_guard.page_id();

        let mut old_guard = self.bpm.fetch_write(node_page_id)?;
        let (separator, moved_children) = {
            let mut old_node = InternalNode::new(old_guard.data_mut());
            let max_size = old_node.max_size();

            let mut new_node = InternalNode::new(new_guard.data_mut());
            new_node.init(new_page_id, parent_page_id, max_size);
            old_node.move_half_to(&mut new_node)
        };
        drop(old_guard);
        drop(new_guard);

        for child in moved_children {
            let mut guard = self.bpm.fetch_write(child)?;
            TreeNodeMut::parse(guard.data_mut())?.set_parent_page_id(new_page_id);
        }

        self.insert_into_parent(node_page_id, separator, new_page_id, parent_page_id)
    }

    /// Hangs a freshly split-off `right_page_id` next to `left_page_id`
    /// under their parent, growing a new root when the left node was the
    /// root and recursing when the parent overflows in turn.
    fn insert_into_parent(
        &mut self,
        left_page_id: PageId,
        key: IndexKey,
        right_page_id: PageId,
        parent_page_id: PageId,
    ) -> Result<()> {
        if parent_page_id == INVALID_PAGE_ID {
            let mut root_guard = self.bpm.new_page()?;
            let root_page_id = root_guard.page_id();
            {
                let mut root = InternalNode::new(root_guard.data_mut());
                root.init(root_page_id, INVALID_PAGE_ID, self.internal_max_size);
                root.populate_new_root(left_page_id, key, right_page_id);
            }
            drop(root_guard);

            for child in [left_page_id, right_page_id] {
                let mut guard = self.bpm.fetch_write(child)?;
                TreeNodeMut::parse(guard.data_mut())?.set_parent_page_id(root_page_id);
            }

            self.root_page_id = root_page_id;
            return self.update_root_page_id(false);
        }

        let (new_size, max_size, grandparent_page_id) = {
            let mut guard = self.bpm.fetch_write(parent_page_id)?;
            let mut parent = InternalNode::new(guard.data_mut());
            let new_size = parent.insert_node_after(left_page_id, key, right_page_id)?;
            (new_size, parent.max_size(), parent.parent_page_id())
        };

        if new_size > max_size {
            self.split_internal(parent_page_id, grandparent_page_id)?;
        }
        Ok(())
    }

    /// Records the current root in the header page: a new record when the
    /// tree is first created, an update on later root changes.
    fn update_root_page_id(&self, insert_record: bool) -> Result<()> {
        let mut guard = self.bpm.fetch_write(HEADER_PAGE_ID)?;
        let mut header = HeaderPage::new(guard.data_mut());
        if insert_record {
            header.insert_record(&self.index_name, self.root_page_id)
        } else {
            header.update_record(&self.index_name, self.root_page_id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::SlotId;
    use crate::index::IntegerComparator;
    use crate::storage::disk::DiskManager;
    use tempfile::NamedTempFile;

    fn create_tree(pool_size: usize) -> (BPlusTree<IntegerComparator>, NamedTempFile) {
        let temp = NamedTempFile::new().unwrap();
        let dm = Arc::new(DiskManager::new(temp.path()).unwrap());
        let bpm = Arc::new(BufferPoolManager::new(pool_size, dm));
        let tree = BPlusTree::new("test_idx", bpm, IntegerComparator, INVALID_PAGE_ID);
        (tree, temp)
    }

    fn rid(n: u32) -> RecordId {
        RecordId::new(PageId::new(n), SlotId::new(0))
    }

    #[test]
    fn test_tree_empty_lookup() {
        let (tree, _temp) = create_tree(8);
        assert!(tree.is_empty());
        assert_eq!(tree.get_value(1).unwrap(), None);
        assert!(tree.begin().unwrap().is_end());
    }

    #[test]
    fn test_tree_first_insert_creates_root() {
        let (mut tree, _temp) = create_tree(8);
        assert!(tree.insert(5, rid(5)).unwrap());

        assert!(!tree.is_empty());
        assert_eq!(tree.get_value(5).unwrap(), Some(rid(5)));
        assert_eq!(tree.get_value(6).unwrap(), None);
    }

    #[test]
    fn test_tree_duplicate_insert_rejected() {
        let (mut tree, _temp) = create_tree(8);
        assert!(tree.insert(5, rid(1)).unwrap());
        assert!(!tree.insert(5, rid(2)).unwrap());

        // The original value survives.
        assert_eq!(tree.get_value(5).unwrap(), Some(rid(1)));
    }

    #[test]
    fn test_tree_remove_unsupported() {
        let (mut tree, _temp) = create_tree(8);
        tree.insert(1, rid(1)).unwrap();
        assert!(matches!(tree.remove(1), Err(StrataError::Unsupported(_))));
    }

    #[test]
    fn test_tree_root_registered_in_header() {
        let (mut tree, _temp) = create_tree(8);
        tree.insert(1, rid(1)).unwrap();

        let guard = tree.bpm.fetch_read(HEADER_PAGE_ID).unwrap();
        let header = HeaderPageRef::new(guard.data());
        assert_eq!(header.get_record("test_idx"), Some(tree.root_page_id()));
    }
}
