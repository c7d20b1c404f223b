mod b_plus_tree;
mod btree_page;
mod index_iterator;
mod key_comparator;

pub use b_plus_tree::BPlusTree;
pub use btree_page::{
    InternalNode, InternalNodeRef, LeafNode, LeafNodeRef, PageType, TreeNodeMut, TreeNodeRef,
    DEFAULT_INTERNAL_MAX_SIZE, DEFAULT_LEAF_MAX_SIZE,
};
pub use index_iterator::IndexIterator;
pub use key_comparator::{IndexKey, IntegerComparator, KeyComparator};
