use std::sync::Arc;

use crate::buffer::{BufferPoolManager, ReadPageGuard};
use crate::common::{RecordId, Result, INVALID_PAGE_ID};
use crate::storage::page::LeafPage;

/// Cursor over the leaf chain.
///
/// Holds at most one read-latched, pinned leaf at a time. Crossing to the
/// next leaf pins it first, releases the current leaf, then takes the next
/// leaf's read latch - never two leaf latches at once, so scans cannot
/// deadlock against writers working right-to-left.
pub struct IndexIterator {
    bpm: Arc<BufferPoolManager>,
    guard: Option<ReadPageGuard>,
    index: usize,
}

impl IndexIterator {
    pub(crate) fn new(bpm: Arc<BufferPoolManager>, guard: Option<ReadPageGuard>, index: usize) -> Self {
        Self { bpm, guard, index }
    }

    /// True once the cursor has moved past the last entry.
    pub fn is_end(&self) -> bool {
        self.guard.is_none()
    }

    fn advance(&mut self) -> Result<Option<(u32, RecordId)>> {
        loop {
            let next_page_id = {
                let guard = match &self.guard {
                    Some(guard) => guard,
                    None => return Ok(None),
                };
                let leaf = LeafPage::new(guard.data());
                if self.index < leaf.size() {
                    let entry = (leaf.key_at(self.index), leaf.rid_at(self.index));
                    self.index += 1;
                    return Ok(Some(entry));
                }
                leaf.next_page_id()
            };

            if next_page_id == INVALID_PAGE_ID {
                self.guard = None;
                return Ok(None);
            }

            // Pin the next leaf before letting go of this one, then latch
            // it once the current latch is released
            self.bpm.pin_page(next_page_id)?;
            self.guard = None;
            let next_guard = self.bpm.fetch_page_read(next_page_id);
            self.bpm.unpin_page(next_page_id, false);
            self.guard = Some(next_guard?);
            self.index = 0;
        }
    }
}

impl Iterator for IndexIterator {
    type Item = Result<(u32, RecordId)>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.advance() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
