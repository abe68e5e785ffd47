use crate::storage::page::PageId;
use crate::storage::{StorageError, StorageResult};
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Page-granular access to a seekable backing medium.
///
/// Reads past the end of the medium are short and zero-filled. Writes past
/// the end first pad the gap with zeroed pages so the medium never has an
/// undefined hole.
pub struct PageManager<M> {
    medium: M,
    page_bits: u32,
}

impl PageManager<File> {
    pub fn create(path: &Path, page_bits: u32) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        Ok(Self::new(file, page_bits))
    }

    pub fn open(path: &Path, page_bits: u32) -> StorageResult<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;

        Ok(Self::new(file, page_bits))
    }

    /// Opens an existing file, keeping its content, or creates an empty one.
    pub fn open_or_create(path: &Path, page_bits: u32) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        Ok(Self::new(file, page_bits))
    }
}

impl<M: Read + Write + Seek> PageManager<M> {
    pub fn new(medium: M, page_bits: u32) -> Self {
        Self { medium, page_bits }
    }

    pub fn page_size(&self) -> usize {
        1usize << self.page_bits
    }

    /// Reads a page into `buf`, returning how many bytes the medium held.
    /// Anything beyond that is zeroed.
    pub fn read_page(&mut self, page_id: PageId, buf: &mut [u8]) -> StorageResult<usize> {
        self.check_size(buf.len())?;

        let offset = self.page_offset(page_id)?;
        self.medium.seek(SeekFrom::Start(offset))?;
        let mut filled = 0;
        while filled < buf.len() {
            match self.medium.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        buf[filled..].fill(0);

        Ok(filled)
    }

    pub fn write_page(&mut self, page_id: PageId, data: &[u8]) -> StorageResult<()> {
        self.check_size(data.len())?;

        let offset = self.page_offset(page_id)?;
        let len = self.len()?;

        // Pad the gap between the current end and the target page
        if len < offset {
            let zeros = vec![0u8; self.page_size()];
            self.medium.seek(SeekFrom::Start(len))?;
            let mut remaining = offset - len;
            while remaining > 0 {
                let chunk = remaining.min(zeros.len() as u64) as usize;
                self.medium.write_all(&zeros[..chunk])?;
                remaining -= chunk as u64;
            }
        }

        self.medium.seek(SeekFrom::Start(offset))?;
        self.medium.write_all(data)?;

        Ok(())
    }

    /// Current length of the medium in bytes.
    pub fn len(&mut self) -> StorageResult<u64> {
        Ok(self.medium.seek(SeekFrom::End(0))?)
    }

    pub fn is_empty(&mut self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Number of pages the medium touches, counting a partial last page.
    pub fn num_pages(&mut self) -> StorageResult<u64> {
        let len = self.len()?;
        Ok(len.div_ceil(self.page_size() as u64))
    }

    pub fn sync(&mut self) -> StorageResult<()> {
        self.medium.flush()?;
        Ok(())
    }

    pub fn get_ref(&self) -> &M {
        &self.medium
    }

    pub fn get_mut(&mut self) -> &mut M {
        &mut self.medium
    }

    pub fn into_inner(self) -> M {
        self.medium
    }

    fn check_size(&self, actual: usize) -> StorageResult<()> {
        let expected = self.page_size();
        if actual != expected {
            return Err(StorageError::FrameSizeMismatch { expected, actual });
        }
        Ok(())
    }

    /// Byte offset of the page, provided the whole page stays addressable.
    fn page_offset(&self, page_id: PageId) -> StorageResult<u64> {
        let size = self.page_size() as u64;
        page_id
            .0
            .checked_mul(size)
            .filter(|offset| offset.checked_add(size).is_some())
            .ok_or(StorageError::PageOffsetOverflow(page_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::io::Cursor;
    use tempfile::tempdir;

    const BITS: u32 = 4;
    const SIZE: usize = 1 << BITS;

    #[test]
    fn test_create_and_open() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("test.db");

        {
            let mut pm = PageManager::create(&file_path, BITS)?;
            assert_eq!(pm.num_pages()?, 0);
        }

        {
            let mut pm = PageManager::open(&file_path, BITS)?;
            assert_eq!(pm.num_pages()?, 0);
        }

        Ok(())
    }

    #[test]
    fn test_open_nonexistent_file() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("nonexistent.db");

        let result = PageManager::open(&file_path, BITS);
        assert!(matches!(result, Err(StorageError::Io(_))));

        Ok(())
    }

    #[test]
    fn test_write_and_read_page() -> Result<()> {
        let mut pm = PageManager::new(Cursor::new(Vec::new()), BITS);

        let mut write_buf = vec![0u8; SIZE];
        write_buf[0] = 42;
        write_buf[SIZE - 1] = 24;
        pm.write_page(PageId(0), &write_buf)?;

        let mut read_buf = vec![0u8; SIZE];
        assert_eq!(pm.read_page(PageId(0), &mut read_buf)?, SIZE);
        assert_eq!(read_buf, write_buf);

        Ok(())
    }

    #[test]
    fn test_short_read_is_zero_filled() -> Result<()> {
        let mut pm = PageManager::new(Cursor::new(b"abc".to_vec()), BITS);

        let mut buf = vec![0xffu8; SIZE];
        assert_eq!(pm.read_page(PageId(0), &mut buf)?, 3);
        assert_eq!(&buf[..3], b"abc");
        assert!(buf[3..].iter().all(|&b| b == 0));

        Ok(())
    }

    #[test]
    fn test_read_past_end() -> Result<()> {
        let mut pm = PageManager::new(Cursor::new(b"abc".to_vec()), BITS);

        let mut buf = vec![0xffu8; SIZE];
        assert_eq!(pm.read_page(PageId(10), &mut buf)?, 0);
        assert!(buf.iter().all(|&b| b == 0));

        Ok(())
    }

    #[test]
    fn test_invalid_buffer_size() -> Result<()> {
        let mut pm = PageManager::new(Cursor::new(Vec::new()), BITS);

        let mut small_buf = vec![0u8; SIZE - 1];
        let result = pm.read_page(PageId(0), &mut small_buf);
        assert!(matches!(
            result,
            Err(StorageError::FrameSizeMismatch { expected: SIZE, actual }) if actual == SIZE - 1
        ));

        let big_data = vec![0u8; SIZE + 1];
        assert!(pm.write_page(PageId(0), &big_data).is_err());

        Ok(())
    }

    #[test]
    fn test_unaddressable_page() -> Result<()> {
        let mut pm = PageManager::new(Cursor::new(b"abc".to_vec()), BITS);
        let last = u64::MAX >> BITS;

        let mut buf = vec![0u8; SIZE];
        for page_id in [PageId(u64::MAX), PageId(last + 1), PageId(last)] {
            assert!(matches!(
                pm.read_page(page_id, &mut buf),
                Err(StorageError::PageOffsetOverflow(p)) if p == page_id
            ));
            assert!(matches!(
                pm.write_page(page_id, &buf),
                Err(StorageError::PageOffsetOverflow(p)) if p == page_id
            ));
        }
        assert_eq!(pm.len()?, 3);

        assert_eq!(pm.read_page(PageId(last - 1), &mut buf)?, 0);

        Ok(())
    }

    #[test]
    fn test_sparse_extension() -> Result<()> {
        let mut pm = PageManager::new(Cursor::new(b"abc".to_vec()), BITS);

        let buf = vec![5u8; SIZE];
        pm.write_page(PageId(5), &buf)?;

        assert_eq!(pm.len()?, 6 * SIZE as u64);
        assert_eq!(pm.num_pages()?, 6);

        let medium = pm.into_inner().into_inner();
        assert_eq!(&medium[..3], b"abc");
        assert!(medium[3..5 * SIZE].iter().all(|&b| b == 0));
        assert!(medium[5 * SIZE..].iter().all(|&b| b == 5));

        Ok(())
    }

    #[test]
    fn test_overwrite_keeps_neighbours() -> Result<()> {
        let mut pm = PageManager::new(Cursor::new(Vec::new()), BITS);

        pm.write_page(PageId(0), &[1u8; SIZE])?;
        pm.write_page(PageId(1), &[2u8; SIZE])?;
        pm.write_page(PageId(0), &[3u8; SIZE])?;

        let mut read_buf = vec![0u8; SIZE];
        pm.read_page(PageId(0), &mut read_buf)?;
        assert!(read_buf.iter().all(|&b| b == 3));
        pm.read_page(PageId(1), &mut read_buf)?;
        assert!(read_buf.iter().all(|&b| b == 2));

        Ok(())
    }

    #[test]
    fn test_file_persistence() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("test.db");

        {
            let mut pm = PageManager::create(&file_path, BITS)?;
            pm.write_page(PageId(2), &[99u8; SIZE])?;
            pm.sync()?;
        }

        {
            let mut pm = PageManager::open_or_create(&file_path, BITS)?;
            assert_eq!(pm.num_pages()?, 3);
            let mut buf = vec![0u8; SIZE];
            pm.read_page(PageId(2), &mut buf)?;
            assert!(buf.iter().all(|&b| b == 99));
            pm.read_page(PageId(1), &mut buf)?;
            assert!(buf.iter().all(|&b| b == 0));
        }

        Ok(())
    }
}
