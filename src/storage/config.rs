//! Buffer store configuration.

use crate::storage::{StorageError, StorageResult};

pub const DEFAULT_PAGE_BITS: u32 = 12;
pub const DEFAULT_CAPACITY: usize = 64;
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Addresses are `u64`, so a page must be strictly narrower than that.
pub const ADDRESS_BITS: u32 = u64::BITS;

/// Largest accepted page size (1 GiB pages).
pub const MAX_PAGE_BITS: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    /// Page size as a power of two.
    pub page_bits: u32,
    /// Number of page frames held in memory.
    pub capacity: usize,
    /// Pages written back or dropped per eviction round.
    pub batch_size: usize,
    /// Seed for the pool generators; `None` draws from OS entropy.
    pub seed: Option<u64>,
}

impl StoreConfig {
    pub fn with_page_bits(mut self, page_bits: u32) -> Self {
        self.page_bits = page_bits;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn page_size(&self) -> usize {
        1usize << self.page_bits
    }

    pub fn validate(&self) -> StorageResult<()> {
        // Exclusive bound; a page must also fit in a usize-sized buffer.
        let max = (MAX_PAGE_BITS + 1).min(ADDRESS_BITS).min(usize::BITS);
        if self.page_bits == 0 || self.page_bits >= max {
            return Err(StorageError::InvalidPageBits {
                bits: self.page_bits,
                max,
            });
        }
        if self.capacity == 0 {
            return Err(StorageError::ZeroCapacity);
        }
        if self.batch_size == 0 {
            return Err(StorageError::ZeroBatchSize);
        }
        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            page_bits: DEFAULT_PAGE_BITS,
            capacity: DEFAULT_CAPACITY,
            batch_size: DEFAULT_BATCH_SIZE,
            seed: None,
        }
    }
}
