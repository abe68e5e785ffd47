//! Storage layer error types.

use thiserror::Error;

/// Errors that can occur in the storage layer.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Buffer store needs at least one frame")]
    ZeroCapacity,

    #[error("Invalid page bits: {bits} (must be in 1..{max})")]
    InvalidPageBits { bits: u32, max: u32 },

    #[error("Eviction batch size must be greater than zero")]
    ZeroBatchSize,

    #[error("Frame size mismatch: expected {expected} bytes, got {actual}")]
    FrameSizeMismatch { expected: usize, actual: usize },

    #[error("Cannot allocate a frame of {bytes} bytes")]
    FrameAllocation { bytes: usize },

    #[error("Page {0} lies beyond the addressable range")]
    PageOffsetOverflow(crate::storage::page::PageId),

    #[error("Address range overflows: {len} bytes at {address}")]
    AddressOverflow { address: u64, len: usize },

    #[error("No frame available for eviction")]
    NoEvictableFrame,

    #[error("Corrupt index: {0}")]
    CorruptIndex(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
