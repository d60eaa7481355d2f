use crate::common::{PageId, PAGE_SIZE};

use super::b_plus_tree_page::{read_u32, write_u32};

// Header page (page 0): record_count at 0, then fixed-width records of
// (name: 32 bytes zero-padded, root_page_id: u32).
const RECORD_COUNT_OFFSET: usize = 0;
const RECORDS_OFFSET: usize = 4;
const NAME_SIZE: usize = 32;
const RECORD_SIZE: usize = NAME_SIZE + 4;
const MAX_RECORDS: usize = (PAGE_SIZE - RECORDS_OFFSET) / RECORD_SIZE;

fn record_offset(index: usize) -> usize {
    RECORDS_OFFSET + index * RECORD_SIZE
}

fn pad_name(name: &str) -> Option<[u8; NAME_SIZE]> {
    let bytes = name.as_bytes();
    if bytes.is_empty() || bytes.len() > NAME_SIZE {
        return None;
    }
    let mut padded = [0u8; NAME_SIZE];
    padded[..bytes.len()].copy_from_slice(bytes);
    Some(padded)
}

/// Read-only view of the header page, a small directory of
/// `(index_name, root_page_id)` records.
pub struct HeaderPage<'a> {
    data: &'a [u8],
}

impl<'a> HeaderPage<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn record_count(&self) -> usize {
        read_u32(self.data, RECORD_COUNT_OFFSET) as usize
    }

    /// Root page id registered under `name`, if any.
    pub fn get_root_id(&self, name: &str) -> Option<PageId> {
        let padded = pad_name(name)?;
        self.find_record(&padded)
            .map(|index| PageId::new(read_u32(self.data, record_offset(index) + NAME_SIZE)))
    }

    fn find_record(&self, padded: &[u8; NAME_SIZE]) -> Option<usize> {
        (0..self.record_count()).find(|&i| {
            let offset = record_offset(i);
            &self.data[offset..offset + NAME_SIZE] == padded
        })
    }
}

/// Mutable view of the header page.
pub struct HeaderPageMut<'a> {
    data: &'a mut [u8],
}

impl<'a> HeaderPageMut<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn init(&mut self) {
        self.data.fill(0);
    }

    pub fn view(&self) -> HeaderPage<'_> {
        HeaderPage {
            data: &self.data[..],
        }
    }

    /// Registers a new record. Fails if the name is invalid, already
    /// present, or the directory is full.
    pub fn insert_record(&mut self, name: &str, root_page_id: PageId) -> bool {
        let padded = match pad_name(name) {
            Some(padded) => padded,
            None => return false,
        };
        let count = self.view().record_count();
        if count >= MAX_RECORDS || self.view().find_record(&padded).is_some() {
            return false;
        }
        let offset = record_offset(count);
        self.data[offset..offset + NAME_SIZE].copy_from_slice(&padded);
        write_u32(self.data, offset + NAME_SIZE, root_page_id.as_u32());
        write_u32(self.data, RECORD_COUNT_OFFSET, (count + 1) as u32);
        true
    }

    /// Rewrites the root page id of an existing record.
    pub fn update_record(&mut self, name: &str, root_page_id: PageId) -> bool {
        let padded = match pad_name(name) {
            Some(padded) => padded,
            None => return false,
        };
        match self.view().find_record(&padded) {
            Some(index) => {
                write_u32(self.data, record_offset(index) + NAME_SIZE, root_page_id.as_u32());
                true
            }
            None => false,
        }
    }

    /// Drops a record, compacting the array.
    pub fn delete_record(&mut self, name: &str) -> bool {
        let padded = match pad_name(name) {
            Some(padded) => padded,
            None => return false,
        };
        let count = self.view().record_count();
        match self.view().find_record(&padded) {
            Some(index) => {
                self.data
                    .copy_within(record_offset(index + 1)..record_offset(count), record_offset(index));
                write_u32(self.data, RECORD_COUNT_OFFSET, (count - 1) as u32);
                true
            }
            None => false,
        }
    }
}
