use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::common::{PageId, PAGE_SIZE};

use super::buffer_pool_manager::PoolState;
use super::FrameHeader;

/// RAII lease on a page: shared access to the bytes, pinned for the guard's
/// lifetime.
///
/// Holds the frame's page latch in read mode. Dropping the guard releases
/// the latch and then unpins the page through the buffer pool, so the frame
/// becomes evictable again once the last lease is gone.
pub struct ReadPageGuard {
    page_id: PageId,
    /// Keeps the latched frame alive; the transmuted guard below borrows it
    _frame: Arc<FrameHeader>,
    pool: Arc<PoolState>,
    data: Option<RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>>>,
}

impl ReadPageGuard {
    /// # Safety
    /// `frame` must stay alive for the guard's lifetime; the `Arc` held in
    /// the struct guarantees this, which is what makes the lifetime
    /// extension of the latch guard sound.
    pub(crate) unsafe fn new(page_id: PageId, frame: Arc<FrameHeader>, pool: Arc<PoolState>) -> Self {
        let data = frame.data_latch().read();
        let data: RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>> = std::mem::transmute(data);
        Self {
            page_id,
            _frame: frame,
            pool,
            data: Some(data),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn data(&self) -> &[u8] {
        match &self.data {
            Some(d) => &***d,
            None => &[],
        }
    }
}

impl Deref for ReadPageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl Drop for ReadPageGuard {
    fn drop(&mut self) {
        // Latch first, pin second: once the pin drops the frame may be
        // evicted, and eviction copies the bytes out under the latch
        self.data.take();
        self.pool.release_page(self.page_id, false);
    }
}

/// RAII lease on a page with exclusive access to the bytes.
///
/// Holds the frame's page latch in write mode. The page is marked dirty on
/// release if `data_mut` was ever called.
pub struct PageWriteGuard {
    page_id: PageId,
    _frame: Arc<FrameHeader>,
    pool: Arc<PoolState>,
    dirty: bool,
    data: Option<RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>>>,
}

impl PageWriteGuard {
    /// # Safety
    /// Same contract as [`ReadPageGuard::new`].
    pub(crate) unsafe fn new(page_id: PageId, frame: Arc<FrameHeader>, pool: Arc<PoolState>) -> Self {
        let data = frame.data_latch().write();
        let data: RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>> = std::mem::transmute(data);
        Self {
            page_id,
            _frame: frame,
            pool,
            dirty: false,
            data: Some(data),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn data(&self) -> &[u8] {
        match &self.data {
            Some(d) => &***d,
            None => &[],
        }
    }

    /// Exclusive access to the page bytes; marks the page dirty.
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.dirty = true;
        match self.data.as_mut() {
            Some(d) => &mut ***d,
            None => &mut [],
        }
    }
}

impl Deref for PageWriteGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl DerefMut for PageWriteGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data_mut()
    }
}

impl Drop for PageWriteGuard {
    fn drop(&mut self) {
        self.data.take();
        self.pool.release_page(self.page_id, self.dirty);
    }
}
