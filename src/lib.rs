//! Strata - the in-memory storage kernel of a disk-backed database
//!
//! The crate caches fixed-size disk pages in a bounded pool of frames and
//! builds an ordered index on top of that pool.
//!
//! # Architecture
//!
//! - **Storage layer** (`storage`): page-granular disk I/O
//!   - `DiskManager`: reads, writes and allocates pages in one database file
//!   - `DiskScheduler`: funnels I/O through a background worker thread
//!   - `HeaderPage`: the fixed page 0 directory of index roots
//!
//! - **Buffer pool** (`buffer`): memory management for database pages
//!   - `BufferPoolManager`: pins pages into frames and evicts by LRU
//!   - `LruReplacer`: least-recently-used victim selection
//!   - `FrameHeader`: per-frame metadata plus the page payload
//!   - `ReadPageGuard`/`WritePageGuard`: RAII pins with automatic unpin
//!
//! - **Hash** (`hash`): `ExtendibleHashTable`, the split-on-overflow
//!   directory the pool uses as its page table
//!
//! - **Index** (`index`): `BPlusTree` over `(key, record id)` entries,
//!   with point lookup, split-propagating insert and forward range scans
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use strata::buffer::BufferPoolManager;
//! use strata::index::{BPlusTree, IntegerComparator};
//! use strata::storage::disk::DiskManager;
//! use strata::{PageId, RecordId, SlotId, INVALID_PAGE_ID};
//!
//! fn main() -> strata::Result<()> {
//!     let disk_manager = Arc::new(DiskManager::new("demo.db")?);
//!     let bpm = Arc::new(BufferPoolManager::new(64, disk_manager));
//!
//!     // An invalid root page id means the index starts out empty.
//!     let mut index =
//!         BPlusTree::new("demo_pk", Arc::clone(&bpm), IntegerComparator, INVALID_PAGE_ID);
//!     index.insert(42, RecordId::new(PageId::new(7), SlotId::new(0)))?;
//!     assert!(index.get_value(42)?.is_some());
//!
//!     bpm.flush_all_pages()?;
//!     Ok(())
//! }
//! ```

pub mod buffer;
pub mod common;
pub mod hash;
pub mod index;
pub mod storage;

// Re-export commonly used types at the crate root
pub use common::{
    FrameId, PageId, RecordId, Result, SlotId, StrataError, HEADER_PAGE_ID, INVALID_PAGE_ID,
    PAGE_SIZE,
};
