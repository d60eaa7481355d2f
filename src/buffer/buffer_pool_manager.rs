use std::collections::VecDeque;
use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use crate::common::{FrameId, KeelError, PageId, Result, DEFAULT_BUCKET_SIZE, INVALID_PAGE_ID, PAGE_SIZE};
use crate::container::ExtendibleHashTable;
use crate::storage::disk::{DiskManager, DiskScheduler};

use super::{FrameHeader, LruKReplacer, PageWriteGuard, ReadPageGuard};

struct PoolInner {
    /// Maps resident page ids to frame indices
    page_table: ExtendibleHashTable<PageId, FrameId>,
    /// Frames known to hold no valid page
    free_list: VecDeque<FrameId>,
}

/// Shared pool state; page guards keep it alive so they can unpin on drop.
pub(crate) struct PoolState {
    frames: Vec<Arc<FrameHeader>>,
    inner: Mutex<PoolInner>,
    replacer: LruKReplacer,
}

impl PoolState {
    /// Drops one lease on `page_id`. ORs in the dirty bit (never clears it
    /// through this path) and hands the frame to the replacer once the pin
    /// count reaches zero. Returns false for a page that is not resident or
    /// not pinned.
    pub(crate) fn release_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let inner = self.inner.lock();
        let frame_id = match inner.page_table.find(&page_id) {
            Some(frame_id) => frame_id,
            None => return false,
        };
        let frame = &self.frames[frame_id.as_usize()];
        if frame.pin_count() == 0 {
            debug!("unpin of {page_id} ignored, pin count already zero");
            return false;
        }
        if is_dirty {
            frame.set_dirty(true);
        }
        if frame.unpin() == Some(0) {
            let _ = self.replacer.set_evictable(frame_id, true);
        }
        true
    }
}

/// Multiplexes a bounded set of in-memory frames over the disk-resident
/// page space.
///
/// Frames are recycled from the free list first and by LRU-K eviction once
/// the free list is empty; a dirty victim is written back before reuse.
/// Every public operation serializes on the pool-wide mutex, which stays
/// held across eviction disk writes - callers must tolerate blocking.
pub struct BufferPoolManager {
    pool_size: usize,
    state: Arc<PoolState>,
    disk_scheduler: DiskScheduler,
}

impl BufferPoolManager {
    pub fn new(pool_size: usize, replacer_k: usize, disk_manager: Arc<DiskManager>) -> Self {
        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);
        for i in 0..pool_size {
            let frame_id = FrameId::new(i as u32);
            frames.push(Arc::new(FrameHeader::new(frame_id)));
            free_list.push_back(frame_id);
        }

        Self {
            pool_size,
            state: Arc::new(PoolState {
                frames,
                inner: Mutex::new(PoolInner {
                    page_table: ExtendibleHashTable::new(DEFAULT_BUCKET_SIZE),
                    free_list,
                }),
                replacer: LruKReplacer::new(pool_size, replacer_k),
            }),
            disk_scheduler: DiskScheduler::new(disk_manager),
        }
    }

    /// Allocates a fresh page and returns it pinned behind a write guard.
    ///
    /// Fails with [`KeelError::BufferPoolFull`] when every frame is pinned.
    /// Dropping the guard unpins the page.
    pub fn new_page(&self) -> Result<(PageId, PageWriteGuard)> {
        let mut inner = self.state.inner.lock();
        if !self.has_unpinned_frame() {
            return Err(KeelError::BufferPoolFull);
        }

        let page_id = self.disk_scheduler.disk_manager().allocate_page()?;
        let frame_id = self.acquire_frame(&mut inner)?;
        let frame = &self.state.frames[frame_id.as_usize()];
        frame.set_page_id(page_id);
        frame.pin();
        inner.page_table.insert(page_id, frame_id);
        self.state.replacer.record_access(frame_id)?;
        self.state.replacer.set_evictable(frame_id, false)?;
        drop(inner);

        let frame = Arc::clone(&self.state.frames[frame_id.as_usize()]);
        let guard = unsafe { PageWriteGuard::new(page_id, frame, Arc::clone(&self.state)) };
        Ok((page_id, guard))
    }

    /// Pins `page_id` and latches it shared.
    pub fn fetch_page_read(&self, page_id: PageId) -> Result<ReadPageGuard> {
        let frame_id = self.pin_page_frame(page_id)?;
        let frame = Arc::clone(&self.state.frames[frame_id.as_usize()]);
        Ok(unsafe { ReadPageGuard::new(page_id, frame, Arc::clone(&self.state)) })
    }

    /// Pins `page_id` and latches it exclusive.
    pub fn fetch_page_write(&self, page_id: PageId) -> Result<PageWriteGuard> {
        let frame_id = self.pin_page_frame(page_id)?;
        let frame = Arc::clone(&self.state.frames[frame_id.as_usize()]);
        Ok(unsafe { PageWriteGuard::new(page_id, frame, Arc::clone(&self.state)) })
    }

    /// Pins `page_id` without latching it. The pin must be returned through
    /// [`BufferPoolManager::unpin_page`].
    pub(crate) fn pin_page(&self, page_id: PageId) -> Result<()> {
        self.pin_page_frame(page_id).map(|_| ())
    }

    /// Drops one lease on `page_id`; `is_dirty` is ORed into the frame's
    /// dirty bit. Returns false if the page is not resident or not pinned.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        self.state.release_page(page_id, is_dirty)
    }

    /// Writes a resident page back to disk unconditionally.
    ///
    /// The dirty bit is left untouched; only eviction resets it. The page
    /// is pinned for the duration of the write instead of holding the pool
    /// mutex, so a latch holder calling back into the pool cannot wedge
    /// against the flush.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        if page_id == INVALID_PAGE_ID {
            return Ok(false);
        }
        let frame = match self.pin_resident(page_id) {
            Some(frame) => frame,
            None => return Ok(false),
        };
        let mut data = [0u8; PAGE_SIZE];
        frame.copy_to(&mut data);
        let result = self.disk_scheduler.schedule_write_sync(page_id, &data);
        self.unpin_page(page_id, false);
        result?;
        Ok(true)
    }

    /// Writes back whatever page each frame currently holds, skipping
    /// frames with no valid page.
    pub fn flush_all_pages(&self) -> Result<()> {
        for frame in &self.state.frames {
            let page_id = frame.page_id();
            if page_id == INVALID_PAGE_ID {
                continue;
            }
            self.flush_page(page_id)?;
        }
        Ok(())
    }

    /// Removes a page from the pool and deallocates it on disk.
    ///
    /// A page that is not resident counts as already deleted. A pinned page
    /// cannot be deleted and reports `Ok(false)`.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut inner = self.state.inner.lock();
        let frame_id = match inner.page_table.find(&page_id) {
            Some(frame_id) => frame_id,
            None => return Ok(true),
        };
        let frame = &self.state.frames[frame_id.as_usize()];
        if frame.pin_count() > 0 {
            debug!("cannot delete {page_id}, pin count is {}", frame.pin_count());
            return Ok(false);
        }
        inner.page_table.remove(&page_id);
        self.state.replacer.remove(frame_id)?;
        frame.reset();
        inner.free_list.push_back(frame_id);
        self.disk_scheduler.disk_manager().deallocate_page(page_id)?;
        Ok(true)
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn free_frame_count(&self) -> usize {
        self.state.inner.lock().free_list.len()
    }

    /// Pin count of a resident page, `None` if not resident.
    pub fn get_pin_count(&self, page_id: PageId) -> Option<u32> {
        let inner = self.state.inner.lock();
        inner
            .page_table
            .find(&page_id)
            .map(|frame_id| self.state.frames[frame_id.as_usize()].pin_count())
    }

    /// Dirty bit of a resident page, `None` if not resident.
    pub fn is_page_dirty(&self, page_id: PageId) -> Option<bool> {
        let inner = self.state.inner.lock();
        inner
            .page_table
            .find(&page_id)
            .map(|frame_id| self.state.frames[frame_id.as_usize()].is_dirty())
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        self.disk_scheduler.disk_manager()
    }

    /// Pins the frame holding `page_id` only if it is already resident.
    fn pin_resident(&self, page_id: PageId) -> Option<Arc<FrameHeader>> {
        let inner = self.state.inner.lock();
        let frame_id = inner.page_table.find(&page_id)?;
        let frame = &self.state.frames[frame_id.as_usize()];
        frame.pin();
        let _ = self.state.replacer.record_access(frame_id);
        let _ = self.state.replacer.set_evictable(frame_id, false);
        Some(Arc::clone(frame))
    }

    /// Pins the frame holding `page_id`, reading the page in from disk on a
    /// miss. Runs under the pool mutex.
    fn pin_page_frame(&self, page_id: PageId) -> Result<FrameId> {
        if page_id == INVALID_PAGE_ID {
            return Err(KeelError::InvalidPageId(page_id));
        }
        let mut inner = self.state.inner.lock();

        if let Some(frame_id) = inner.page_table.find(&page_id) {
            let frame = &self.state.frames[frame_id.as_usize()];
            frame.pin();
            self.state.replacer.record_access(frame_id)?;
            self.state.replacer.set_evictable(frame_id, false)?;
            return Ok(frame_id);
        }

        if !self.has_unpinned_frame() {
            return Err(KeelError::BufferPoolFull);
        }
        let frame_id = self.acquire_frame(&mut inner)?;
        let frame = &self.state.frames[frame_id.as_usize()];

        let mut data = [0u8; PAGE_SIZE];
        self.disk_scheduler.schedule_read_sync(page_id, &mut data)?;
        frame.copy_from(&data);
        frame.set_page_id(page_id);
        frame.set_dirty(false);
        frame.pin();
        inner.page_table.insert(page_id, frame_id);
        self.state.replacer.record_access(frame_id)?;
        self.state.replacer.set_evictable(frame_id, false)?;
        Ok(frame_id)
    }

    /// Pops a free frame, or evicts one via the replacer, writing back its
    /// contents first when dirty. The pool mutex is held across the write.
    fn acquire_frame(&self, inner: &mut PoolInner) -> Result<FrameId> {
        if let Some(frame_id) = inner.free_list.pop_front() {
            return Ok(frame_id);
        }

        let frame_id = self.state.replacer.evict().ok_or(KeelError::BufferPoolFull)?;
        let frame = &self.state.frames[frame_id.as_usize()];
        let old_page_id = frame.page_id();
        if frame.is_dirty() {
            let mut data = [0u8; PAGE_SIZE];
            frame.copy_to(&mut data);
            self.disk_scheduler.schedule_write_sync(old_page_id, &data)?;
        }
        debug!("evicting {old_page_id} from frame {frame_id}");
        inner.page_table.remove(&old_page_id);
        frame.reset();
        Ok(frame_id)
    }

    fn has_unpinned_frame(&self) -> bool {
        self.state.frames.iter().any(|f| f.pin_count() == 0)
    }
}
