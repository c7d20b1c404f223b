use thiserror::Error;

use super::types::PageId;

/// Crate-wide error type
#[derive(Error, Debug)]
pub enum StrataError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid page ID: {0}")]
    InvalidPageId(PageId),

    #[error("Buffer pool is full, no evictable frames available")]
    BufferPoolFull,

    #[error("Page {0} is still pinned")]
    PageStillPinned(PageId),

    #[error("Disk scheduler error: {0}")]
    DiskScheduler(String),

    #[error("Invalid database file")]
    InvalidDatabaseFile,

    #[error("Header page is full")]
    HeaderFull,

    #[error("Invalid index name {0:?}")]
    InvalidIndexName(String),

    #[error("Index {0:?} already registered in header page")]
    IndexAlreadyExists(String),

    #[error("Index {0:?} not found in header page")]
    IndexNotFound(String),

    #[error("Index corrupted: {0}")]
    IndexCorrupted(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),
}

pub type Result<T> = std::result::Result<T, StrataError>;
