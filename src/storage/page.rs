use crate::storage::buffer::treap::{Link, TreapNode};
use crate::storage::{StorageError, StorageResult};
use std::fmt;

/// Logical page number on the backing medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PageId(pub u64);

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A fixed-size page buffer owned by the buffer store.
///
/// The page id is only meaningful while the frame sits in the clean or dirty
/// pool; in the free pool it is a leftover from the last page it held.
#[derive(Debug)]
pub struct Frame {
    data: Box<[u8]>,
    page_id: PageId,
    link: Link,
}

impl Frame {
    /// Allocates a zeroed frame, failing instead of aborting when the
    /// allocator cannot provide `page_size` bytes.
    pub fn new(page_size: usize) -> StorageResult<Self> {
        let mut data = Vec::new();
        data.try_reserve_exact(page_size)
            .map_err(|_| StorageError::FrameAllocation { bytes: page_size })?;
        data.resize(page_size, 0u8);

        Ok(Self {
            data: data.into_boxed_slice(),
            page_id: PageId(0),
            link: Link::default(),
        })
    }

    /// Allocates `count` frames of `page_size` bytes each.
    pub fn pool(count: usize, page_size: usize) -> StorageResult<Vec<Frame>> {
        (0..count).map(|_| Frame::new(page_size)).collect()
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub(crate) fn set_page_id(&mut self, page_id: PageId) {
        self.page_id = page_id;
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}

impl TreapNode for Frame {
    fn key(&self) -> u64 {
        self.page_id.0
    }

    fn link(&self) -> &Link {
        &self.link
    }

    fn link_mut(&mut self) -> &mut Link {
        &mut self.link
    }
}
