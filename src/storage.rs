//! Page-granular buffer store.
//!
//! Presents byte-addressable access to an arbitrarily large backing medium
//! while caching a bounded number of fixed-size pages in memory. Key
//! components:
//!
//! - **Frame**: a fixed-size page buffer tagged with its page number
//! - **Treap**: randomized order-statistics tree indexing frames by page number
//! - **BufferStore**: keeps every frame in one of the free, clean and dirty
//!   pools and decides what to write back or drop when it runs out of frames
//! - **PageManager**: page-sized reads and writes on any seekable medium,
//!   zero-filling short reads and gaps left by sparse writes

pub mod buffer;
pub mod config;
pub mod disk;
pub mod error;
pub mod page;

pub use buffer::treap::{FrameId, Treap, TreapNode};
pub use buffer::{BufferStore, Pool, StoreStats};
pub use config::StoreConfig;
pub use disk::PageManager;
pub use error::{StorageError, StorageResult};
pub use page::{Frame, PageId};
