use std::io;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("corrupt page: {0}")]
    CorruptPage(String),

    #[error("key of {0} bytes exceeds the 255 byte limit")]
    KeyTooLarge(usize),

    #[error("value of {0} bytes exceeds the 255 byte limit")]
    ValueTooLarge(usize),

    #[error("node needs {needed} bytes but pages hold {page_size}")]
    NodeOverflow { needed: usize, page_size: usize },

    #[error("free list of {count} pages exceeds page capacity of {capacity}")]
    FreeListOverflow { count: usize, capacity: usize },

    #[error("released page {page} outside 1..={max_page}")]
    ReleasedOutOfRange { page: u64, max_page: u64 },

    #[error("buffer of {got} bytes where {expected} expected")]
    BufferSize { expected: usize, got: usize },

    #[error("invalid node: {0}")]
    InvalidNode(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
