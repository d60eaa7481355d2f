//! Integration tests for the buffer pool manager

use std::sync::Arc;
use std::thread;

use keel::buffer::BufferPoolManager;
use keel::common::{KeelError, PageId, PAGE_SIZE};
use keel::storage::disk::DiskManager;
use tempfile::NamedTempFile;

fn create_bpm(pool_size: usize) -> (BufferPoolManager, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    (BufferPoolManager::new(pool_size, 2, dm), temp_file)
}

#[test]
fn test_basic_write_read() {
    let (bpm, _temp) = create_bpm(10);

    // Page 0 is the header page, data pages start at 1
    let (page_id, mut guard) = bpm.new_page().unwrap();
    assert_eq!(page_id, PageId::new(1));

    guard.data_mut()[0] = 0xDE;
    guard.data_mut()[1] = 0xAD;
    guard.data_mut()[PAGE_SIZE - 1] = 0xEF;
    drop(guard);

    let guard = bpm.fetch_page_read(page_id).unwrap();
    assert_eq!(guard.data()[0], 0xDE);
    assert_eq!(guard.data()[1], 0xAD);
    assert_eq!(guard.data()[PAGE_SIZE - 1], 0xEF);
}

#[test]
fn test_new_page_fails_when_all_frames_pinned() {
    let (bpm, _temp) = create_bpm(3);

    let mut guards = Vec::new();
    for _ in 0..3 {
        guards.push(bpm.new_page().unwrap());
    }

    // Every frame is pinned by a live guard
    assert!(matches!(bpm.new_page(), Err(KeelError::BufferPoolFull)));

    // Releasing one page frees a frame
    guards.pop();
    assert!(bpm.new_page().is_ok());
}

#[test]
fn test_evicted_dirty_page_survives_round_trip() {
    let (bpm, _temp) = create_bpm(3);

    let (victim, mut guard) = bpm.new_page().unwrap();
    for (i, byte) in guard.data_mut().iter_mut().take(64).enumerate() {
        *byte = i as u8;
    }
    drop(guard);

    // Cycle enough fresh pages through the pool to force the victim out
    for _ in 0..6 {
        let (_, mut g) = bpm.new_page().unwrap();
        g.data_mut()[0] = 0xFF;
    }

    let guard = bpm.fetch_page_read(victim).unwrap();
    for i in 0..64 {
        assert_eq!(guard.data()[i], i as u8);
    }
}

#[test]
fn test_flush_page_keeps_dirty_bit() {
    let (bpm, _temp) = create_bpm(10);

    let (page_id, mut guard) = bpm.new_page().unwrap();
    guard.data_mut()[0] = 7;
    drop(guard);

    assert_eq!(bpm.is_page_dirty(page_id), Some(true));
    assert!(bpm.flush_page(page_id).unwrap());
    // Flushing writes the bytes but does not clean the frame
    assert_eq!(bpm.is_page_dirty(page_id), Some(true));
}

#[test]
fn test_flush_page_of_unknown_page() {
    let (bpm, _temp) = create_bpm(10);
    assert!(!bpm.flush_page(PageId::new(99)).unwrap());
}

#[test]
fn test_flush_persists_across_reopen() {
    let temp_file = NamedTempFile::new().unwrap();
    let page_id;
    {
        let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
        let bpm = BufferPoolManager::new(10, 2, dm);
        let (pid, mut guard) = bpm.new_page().unwrap();
        page_id = pid;
        guard.data_mut()[0] = 42;
        drop(guard);
        bpm.flush_page(page_id).unwrap();
    }

    let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    let bpm = BufferPoolManager::new(10, 2, dm);
    let guard = bpm.fetch_page_read(page_id).unwrap();
    assert_eq!(guard.data()[0], 42);
}

#[test]
fn test_flush_all_pages_persists_everything_resident() {
    let temp_file = NamedTempFile::new().unwrap();
    let mut page_ids = Vec::new();
    {
        let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
        let bpm = BufferPoolManager::new(10, 2, dm);
        for i in 0..5u8 {
            let (pid, mut guard) = bpm.new_page().unwrap();
            guard.data_mut()[0] = i + 1;
            page_ids.push(pid);
        }
        bpm.flush_all_pages().unwrap();
    }

    let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    let bpm = BufferPoolManager::new(10, 2, dm);
    for (i, pid) in page_ids.iter().enumerate() {
        let guard = bpm.fetch_page_read(*pid).unwrap();
        assert_eq!(guard.data()[0], i as u8 + 1);
    }
}

#[test]
fn test_unpin_semantics() {
    let (bpm, _temp) = create_bpm(10);

    let (page_id, guard) = bpm.new_page().unwrap();
    assert_eq!(bpm.get_pin_count(page_id), Some(1));
    drop(guard);
    assert_eq!(bpm.get_pin_count(page_id), Some(0));

    // A second unpin is refused
    assert!(!bpm.unpin_page(page_id, false));
    // Unknown pages are refused too
    assert!(!bpm.unpin_page(PageId::new(1234), false));
}

#[test]
fn test_unpin_dirty_bit_is_sticky() {
    let (bpm, _temp) = create_bpm(10);

    let (page_id, mut guard) = bpm.new_page().unwrap();
    guard.data_mut()[0] = 1;
    drop(guard);
    assert_eq!(bpm.is_page_dirty(page_id), Some(true));

    // A clean unpin does not clear the dirty bit
    let guard = bpm.fetch_page_read(page_id).unwrap();
    drop(guard);
    assert_eq!(bpm.is_page_dirty(page_id), Some(true));
}

#[test]
fn test_delete_page() {
    let (bpm, _temp) = create_bpm(10);

    let (page_id, guard) = bpm.new_page().unwrap();
    assert!(!bpm.delete_page(page_id).unwrap());

    drop(guard);
    let free_before = bpm.free_frame_count();
    assert!(bpm.delete_page(page_id).unwrap());
    assert_eq!(bpm.free_frame_count(), free_before + 1);
    assert_eq!(bpm.get_pin_count(page_id), None);

    // Deleting a page that is not resident reports success
    assert!(bpm.delete_page(page_id).unwrap());
}

#[test]
fn test_fetch_shares_pin_counts() {
    let (bpm, _temp) = create_bpm(10);
    let (page_id, guard) = bpm.new_page().unwrap();
    drop(guard);

    let g1 = bpm.fetch_page_read(page_id).unwrap();
    let g2 = bpm.fetch_page_read(page_id).unwrap();
    assert_eq!(bpm.get_pin_count(page_id), Some(2));
    drop(g1);
    assert_eq!(bpm.get_pin_count(page_id), Some(1));
    drop(g2);
    assert_eq!(bpm.get_pin_count(page_id), Some(0));
}

#[test]
fn test_concurrent_page_traffic() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    let bpm = Arc::new(BufferPoolManager::new(16, 2, dm));

    let handles: Vec<_> = (0..4u8)
        .map(|t| {
            let bpm = Arc::clone(&bpm);
            thread::spawn(move || {
                let mut pages = Vec::new();
                for i in 0..8u8 {
                    let (pid, mut guard) = bpm.new_page().unwrap();
                    guard.data_mut()[0] = t;
                    guard.data_mut()[1] = i;
                    pages.push(pid);
                }
                for (i, pid) in pages.iter().enumerate() {
                    let guard = bpm.fetch_page_read(*pid).unwrap();
                    assert_eq!(guard.data()[0], t);
                    assert_eq!(guard.data()[1], i as u8);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}
