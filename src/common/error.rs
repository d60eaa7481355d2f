use thiserror::Error;

use super::types::{FrameId, PageId};

/// Storage kernel error types
#[derive(Error, Debug)]
pub enum KeelError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Page {0} not found")]
    PageNotFound(PageId),

    #[error("Buffer pool is full, no unpinned frames available")]
    BufferPoolFull,

    #[error("Invalid page ID: {0}")]
    InvalidPageId(PageId),

    #[error("Invalid frame ID: {0}")]
    InvalidFrameId(FrameId),

    #[error("Disk scheduler error: {0}")]
    DiskScheduler(String),

    #[error("Header page is full")]
    HeaderPageFull,

    #[error("Key {0} not found")]
    KeyNotFound(u32),

    #[error("Index corrupted: {0}")]
    IndexCorrupted(String),

    #[error("Table {0} not found")]
    TableNotFound(u32),

    #[error("Executor aborted: {0}")]
    ExecutorAborted(String),
}

pub type Result<T> = std::result::Result<T, KeelError>;
