use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::common::{PageId, Result, PAGE_SIZE};

/// Reads and writes fixed-size pages against a single flat database file.
///
/// Page `n` lives at byte offset `n * PAGE_SIZE`. Page 0 is reserved for the
/// header page and is zero-initialized when the file is created. Allocation
/// is a monotonic counter; deallocation only keeps count, the file never
/// shrinks.
pub struct DiskManager {
    db_file: Mutex<File>,
    num_pages: AtomicU32,
    num_deallocated: AtomicU32,
    num_reads: AtomicU32,
    num_writes: AtomicU32,
}

impl DiskManager {
    /// Opens the database file at `path`, creating it (with a zeroed header
    /// page) if it does not exist.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.as_ref())?;

        let file_size = file.metadata()?.len();
        let mut num_pages = (file_size / PAGE_SIZE as u64) as u32;
        if num_pages == 0 {
            let zeros = [0u8; PAGE_SIZE];
            file.seek(SeekFrom::Start(0))?;
            file.write_all(&zeros)?;
            file.flush()?;
            num_pages = 1;
        }

        Ok(Self {
            db_file: Mutex::new(file),
            num_pages: AtomicU32::new(num_pages),
            num_deallocated: AtomicU32::new(0),
            num_reads: AtomicU32::new(0),
            num_writes: AtomicU32::new(0),
        })
    }

    /// Reads the page into `data`, zero-filling past the end of file.
    pub fn read_page(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);
        let offset = page_id.as_u32() as u64 * PAGE_SIZE as u64;

        let mut file = self.db_file.lock();
        file.seek(SeekFrom::Start(offset))?;
        let bytes_read = file.read(data)?;
        if bytes_read < PAGE_SIZE {
            data[bytes_read..].fill(0);
        }

        self.num_reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Writes the page from `data`.
    pub fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);
        let offset = page_id.as_u32() as u64 * PAGE_SIZE as u64;

        let mut file = self.db_file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        file.flush()?;

        self.num_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Allocates the next page id and zero-fills it on disk.
    pub fn allocate_page(&self) -> Result<PageId> {
        let page_id = PageId::new(self.num_pages.fetch_add(1, Ordering::SeqCst));
        let zeros = [0u8; PAGE_SIZE];
        self.write_page(page_id, &zeros)?;
        Ok(page_id)
    }

    /// Releases a page id. Space is not reclaimed.
    pub fn deallocate_page(&self, _page_id: PageId) -> Result<()> {
        self.num_deallocated.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn num_pages(&self) -> u32 {
        self.num_pages.load(Ordering::Relaxed)
    }

    pub fn num_reads(&self) -> u32 {
        self.num_reads.load(Ordering::Relaxed)
    }

    pub fn num_writes(&self) -> u32 {
        self.num_writes.load(Ordering::Relaxed)
    }

    pub fn sync(&self) -> Result<()> {
        self.db_file.lock().sync_all()?;
        Ok(())
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        let _ = self.db_file.get_mut().sync_all();
    }
}
