pub mod treap;

use crate::storage::config::StoreConfig;
use crate::storage::{Frame, PageId, PageManager, StorageError, StorageResult};
use log::{debug, error, trace};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io::{Read, Seek, Write};
use treap::{FrameId, Treap};

/// The pool a resident page currently belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pool {
    Clean,
    Dirty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub capacity: usize,
    pub free: usize,
    pub clean: usize,
    pub dirty: usize,
}

/// Byte-addressable cache of fixed-size pages over a backing medium.
///
/// Every frame sits in exactly one of three pools: `free` (holds nothing),
/// `clean` (matches the medium) or `dirty` (must be written back). When no
/// frame is free, victims are drawn uniformly at random: dirty pages are
/// written back while they outnumber clean ones, otherwise clean pages are
/// dropped. Dirty pages are flushed when the store is dropped.
pub struct BufferStore<M: Read + Write + Seek> {
    frames: Vec<Frame>,
    free: Treap,
    clean: Treap,
    dirty: Treap,
    disk: PageManager<M>,
    page_bits: u32,
    batch_size: usize,
}

impl<M: Read + Write + Seek> BufferStore<M> {
    pub fn new(medium: M, config: StoreConfig) -> StorageResult<Self> {
        config.validate()?;
        let frames = Frame::pool(config.capacity, config.page_size())?;
        Self::from_frames(medium, frames, config)
    }

    /// Builds a store over caller-provided frames. `config.capacity` is
    /// ignored in favour of the number of frames handed over.
    pub fn from_frames(
        medium: M,
        mut frames: Vec<Frame>,
        config: StoreConfig,
    ) -> StorageResult<Self> {
        let config = StoreConfig {
            capacity: frames.len(),
            ..config
        };
        config.validate()?;
        let page_size = config.page_size();
        if let Some(frame) = frames.iter().find(|f| f.size() != page_size) {
            return Err(StorageError::FrameSizeMismatch {
                expected: page_size,
                actual: frame.size(),
            });
        }

        let (mut free, clean, dirty) = match config.seed {
            Some(seed) => {
                let mut rng = StdRng::seed_from_u64(seed);
                (
                    Treap::with_seed(rng.gen()),
                    Treap::with_seed(rng.gen()),
                    Treap::with_seed(rng.gen()),
                )
            }
            None => (Treap::new(), Treap::new(), Treap::new()),
        };

        // Free frames are keyed by their own index so the free tree never
        // degenerates into a chain of equal keys.
        for id in 0..frames.len() {
            frames[id].set_page_id(PageId(id as u64));
            free.insert(&mut frames, id);
        }

        debug!(
            "Created buffer store with {} frames of {} bytes",
            frames.len(),
            page_size
        );

        Ok(Self {
            frames,
            free,
            clean,
            dirty,
            disk: PageManager::new(medium, config.page_bits),
            page_bits: config.page_bits,
            batch_size: config.batch_size,
        })
    }

    pub fn get(&mut self, address: u64) -> StorageResult<u8> {
        let (page_id, offset) = self.split_address(address);
        let (id, _) = self.fetch_page(page_id)?;
        Ok(self.frames[id].data()[offset])
    }

    /// Stores `value` at `address` and returns it. Writing the value a byte
    /// already holds leaves the page's pool untouched.
    pub fn set(&mut self, address: u64, value: u8) -> StorageResult<u8> {
        let (page_id, offset) = self.split_address(address);
        let (id, pool) = self.fetch_page(page_id)?;
        if self.frames[id].data()[offset] == value {
            return Ok(value);
        }
        if pool == Pool::Clean {
            self.mark_dirty(id)?;
        }
        self.frames[id].data_mut()[offset] = value;
        Ok(value)
    }

    /// Fills `buf` with the bytes starting at `address`.
    pub fn read(&mut self, address: u64, buf: &mut [u8]) -> StorageResult<()> {
        Self::check_range(address, buf.len())?;
        let mut done = 0;
        while done < buf.len() {
            let (page_id, offset) = self.split_address(address + done as u64);
            let n = (self.page_size() - offset).min(buf.len() - done);
            let (id, _) = self.fetch_page(page_id)?;
            buf[done..done + n].copy_from_slice(&self.frames[id].data()[offset..offset + n]);
            done += n;
        }
        Ok(())
    }

    /// Writes `data` starting at `address`. Only pages whose bytes actually
    /// change become dirty.
    pub fn write(&mut self, address: u64, data: &[u8]) -> StorageResult<()> {
        Self::check_range(address, data.len())?;
        let mut done = 0;
        while done < data.len() {
            let (page_id, offset) = self.split_address(address + done as u64);
            let n = (self.page_size() - offset).min(data.len() - done);
            let chunk = &data[done..done + n];
            let (id, pool) = self.fetch_page(page_id)?;
            if self.frames[id].data()[offset..offset + n] != *chunk {
                if pool == Pool::Clean {
                    self.mark_dirty(id)?;
                }
                self.frames[id].data_mut()[offset..offset + n].copy_from_slice(chunk);
            }
            done += n;
        }
        Ok(())
    }

    /// Writes back up to one batch of dirty pages. Returns how many were written.
    pub fn flush_some(&mut self) -> StorageResult<usize> {
        let mut written = 0;
        for _ in 0..self.batch_size {
            let Some(id) = self.dirty.erase_random(&mut self.frames) else {
                break;
            };
            let frame = &self.frames[id];
            if let Err(e) = self.disk.write_page(frame.page_id(), frame.data()) {
                self.dirty.insert(&mut self.frames, id);
                return Err(e);
            }
            self.clean.insert(&mut self.frames, id);
            written += 1;
        }
        if written > 0 {
            debug!(
                "Wrote back {} pages, {} still dirty",
                written,
                self.dirty.len()
            );
        }
        Ok(written)
    }

    /// Writes back every dirty page.
    pub fn flush(&mut self) -> StorageResult<()> {
        while !self.dirty.is_empty() {
            self.flush_some()?;
        }
        self.disk.sync()
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Number of resident pages, clean or dirty.
    pub fn pages(&self) -> usize {
        self.clean.len() + self.dirty.len()
    }

    pub fn capacity(&self) -> usize {
        self.frames.len()
    }

    pub fn page_size(&self) -> usize {
        1usize << self.page_bits
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            capacity: self.frames.len(),
            free: self.free.len(),
            clean: self.clean.len(),
            dirty: self.dirty.len(),
        }
    }

    /// Which pool holds `page_id`, if it is resident.
    pub fn resident(&self, page_id: PageId) -> Option<Pool> {
        if self.dirty.find(&self.frames, page_id.0).is_some() {
            Some(Pool::Dirty)
        } else if self.clean.find(&self.frames, page_id.0).is_some() {
            Some(Pool::Clean)
        } else {
            None
        }
    }

    /// Resident page numbers per pool, ascending.
    pub fn resident_pages(&self) -> (Vec<u64>, Vec<u64>) {
        (self.clean.keys(&self.frames), self.dirty.keys(&self.frames))
    }

    pub fn medium(&self) -> &M {
        self.disk.get_ref()
    }

    /// Checks every pool's tree and that the pools partition the frames.
    pub fn validate(&self) -> StorageResult<()> {
        self.free.validate(&self.frames)?;
        self.clean.validate(&self.frames)?;
        self.dirty.validate(&self.frames)?;

        let total = self.free.len() + self.clean.len() + self.dirty.len();
        if total != self.frames.len() {
            return Err(StorageError::CorruptIndex(format!(
                "pools hold {} frames out of {}",
                total,
                self.frames.len()
            )));
        }

        for id in 0..self.frames.len() {
            let owners = [&self.free, &self.clean, &self.dirty]
                .iter()
                .filter(|pool| pool.contains(&self.frames, id))
                .count();
            if owners != 1 {
                return Err(StorageError::CorruptIndex(format!(
                    "frame {} belongs to {} pools",
                    id, owners
                )));
            }
        }

        for key in self.dirty.keys(&self.frames) {
            if self.clean.find(&self.frames, key).is_some() {
                return Err(StorageError::CorruptIndex(format!(
                    "page {} is both clean and dirty",
                    key
                )));
            }
        }
        Ok(())
    }

    /// Resolves a page to a resident frame, loading it into `clean` on a miss.
    fn fetch_page(&mut self, page_id: PageId) -> StorageResult<(FrameId, Pool)> {
        if let Some(id) = self.dirty.find(&self.frames, page_id.0) {
            return Ok((id, Pool::Dirty));
        }
        if let Some(id) = self.clean.find(&self.frames, page_id.0) {
            return Ok((id, Pool::Clean));
        }

        self.make_room()?;
        let id = self
            .free
            .erase_min(&mut self.frames)
            .ok_or(StorageError::NoEvictableFrame)?;

        let frame = &mut self.frames[id];
        frame.set_page_id(page_id);
        match self.disk.read_page(page_id, frame.data_mut()) {
            Ok(n) => {
                trace!(
                    "Loaded page {} into frame {} ({} bytes from medium)",
                    page_id,
                    id,
                    n
                );
            }
            Err(e) => {
                self.release(id);
                return Err(e);
            }
        }

        self.clean.insert(&mut self.frames, id);
        Ok((id, Pool::Clean))
    }

    /// Evicts until at least one frame is free.
    fn make_room(&mut self) -> StorageResult<()> {
        while self.free.is_empty() {
            if self.clean.is_empty() && self.dirty.is_empty() {
                return Err(StorageError::NoEvictableFrame);
            }
            if self.dirty.len() >= self.clean.len() {
                self.flush_some()?;
            } else {
                self.drop_some();
            }
        }
        Ok(())
    }

    /// Moves up to one batch of random clean pages to `free`.
    fn drop_some(&mut self) -> usize {
        let mut dropped = 0;
        for _ in 0..self.batch_size {
            let Some(id) = self.clean.erase_random(&mut self.frames) else {
                break;
            };
            self.release(id);
            dropped += 1;
        }
        debug!("Dropped {} clean pages", dropped);
        dropped
    }

    fn mark_dirty(&mut self, id: FrameId) -> StorageResult<()> {
        self.clean.erase(&mut self.frames, id).ok_or_else(|| {
            StorageError::CorruptIndex(format!("frame {} missing from clean pool", id))
        })?;
        self.dirty.insert(&mut self.frames, id);
        Ok(())
    }

    fn release(&mut self, id: FrameId) {
        self.frames[id].set_page_id(PageId(id as u64));
        self.free.insert(&mut self.frames, id);
    }

    fn split_address(&self, address: u64) -> (PageId, usize) {
        let mask = (1u64 << self.page_bits) - 1;
        (PageId(address >> self.page_bits), (address & mask) as usize)
    }

    fn check_range(address: u64, len: usize) -> StorageResult<()> {
        if address.checked_add(len as u64).is_none() {
            return Err(StorageError::AddressOverflow { address, len });
        }
        Ok(())
    }
}

impl<M: Read + Write + Seek> Drop for BufferStore<M> {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            error!(
                "Failed to flush {} dirty pages on drop: {}",
                self.dirty.len(),
                e
            );
        }
    }
}
