use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

use crate::common::{KeelError, PageId, Result, PAGE_SIZE};

use super::DiskManager;

type PageBuf = Box<[u8; PAGE_SIZE]>;

/// A disk I/O request owning its page buffer. The buffer travels to the
/// worker and back through the completion channel, so no request ever
/// aliases caller memory.
enum DiskRequest {
    Read {
        page_id: PageId,
        buf: PageBuf,
        done: mpsc::Sender<(PageBuf, bool)>,
    },
    Write {
        page_id: PageId,
        buf: PageBuf,
        done: mpsc::Sender<bool>,
    },
}

/// Queues disk requests for a background worker thread and exposes
/// synchronous completion to callers. The buffer pool blocks on the
/// completion channel, so its I/O stays synchronous end to end.
pub struct DiskScheduler {
    disk_manager: Arc<DiskManager>,
    request_sender: Sender<DiskRequest>,
    shutdown: Arc<AtomicBool>,
    worker_handle: Option<JoinHandle<()>>,
}

impl DiskScheduler {
    pub fn new(disk_manager: Arc<DiskManager>) -> Self {
        let (sender, receiver) = bounded::<DiskRequest>(64);
        let shutdown = Arc::new(AtomicBool::new(false));

        let worker_dm = Arc::clone(&disk_manager);
        let worker_shutdown = Arc::clone(&shutdown);
        let worker_handle = thread::spawn(move || {
            Self::worker_loop(worker_dm, receiver, worker_shutdown);
        });

        Self {
            disk_manager,
            request_sender: sender,
            shutdown,
            worker_handle: Some(worker_handle),
        }
    }

    /// Reads `page_id` into `data`, blocking until the worker completes.
    pub fn schedule_read_sync(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);
        let (tx, rx) = mpsc::channel();
        let request = DiskRequest::Read {
            page_id,
            buf: Box::new([0u8; PAGE_SIZE]),
            done: tx,
        };
        self.request_sender
            .send(request)
            .map_err(|e| KeelError::DiskScheduler(format!("failed to queue read: {e}")))?;

        let (buf, ok) = rx
            .recv()
            .map_err(|e| KeelError::DiskScheduler(format!("read completion lost: {e}")))?;
        if !ok {
            return Err(KeelError::DiskScheduler(format!("read of {page_id} failed")));
        }
        data.copy_from_slice(&buf[..]);
        Ok(())
    }

    /// Writes `data` to `page_id`, blocking until the worker completes.
    pub fn schedule_write_sync(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);
        let mut buf = Box::new([0u8; PAGE_SIZE]);
        buf.copy_from_slice(data);

        let (tx, rx) = mpsc::channel();
        let request = DiskRequest::Write {
            page_id,
            buf,
            done: tx,
        };
        self.request_sender
            .send(request)
            .map_err(|e| KeelError::DiskScheduler(format!("failed to queue write: {e}")))?;

        let ok = rx
            .recv()
            .map_err(|e| KeelError::DiskScheduler(format!("write completion lost: {e}")))?;
        if !ok {
            return Err(KeelError::DiskScheduler(format!("write of {page_id} failed")));
        }
        Ok(())
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }

    fn worker_loop(
        disk_manager: Arc<DiskManager>,
        receiver: Receiver<DiskRequest>,
        shutdown: Arc<AtomicBool>,
    ) {
        loop {
            if shutdown.load(Ordering::Relaxed) {
                // Drain whatever is still queued before exiting
                while let Ok(request) = receiver.try_recv() {
                    Self::process(&disk_manager, request);
                }
                break;
            }
            match receiver.recv_timeout(Duration::from_millis(100)) {
                Ok(request) => Self::process(&disk_manager, request),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    fn process(disk_manager: &DiskManager, request: DiskRequest) {
        match request {
            DiskRequest::Read {
                page_id,
                mut buf,
                done,
            } => {
                let ok = disk_manager.read_page(page_id, &mut buf[..]).is_ok();
                let _ = done.send((buf, ok));
            }
            DiskRequest::Write { page_id, buf, done } => {
                let ok = disk_manager.write_page(page_id, &buf[..]).is_ok();
                let _ = done.send(ok);
            }
        }
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.worker_handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_scheduler_read_write() {
        let temp = NamedTempFile::new().unwrap();
        let dm = Arc::new(DiskManager::new(temp.path()).unwrap());
        let scheduler = DiskScheduler::new(dm);

        let page_id = scheduler.disk_manager().allocate_page().unwrap();

        let mut data = [0u8; PAGE_SIZE];
        data[0] = 42;
        data[100] = 255;
        scheduler.schedule_write_sync(page_id, &data).unwrap();

        let mut out = [0u8; PAGE_SIZE];
        scheduler.schedule_read_sync(page_id, &mut out).unwrap();
        assert_eq!(out[0], 42);
        assert_eq!(out[100], 255);
    }

    #[test]
    fn test_scheduler_interleaved_requests() {
        let temp = NamedTempFile::new().unwrap();
        let dm = Arc::new(DiskManager::new(temp.path()).unwrap());
        let scheduler = DiskScheduler::new(dm);

        let p1 = scheduler.disk_manager().allocate_page().unwrap();
        let p2 = scheduler.disk_manager().allocate_page().unwrap();

        scheduler.schedule_write_sync(p1, &[1u8; PAGE_SIZE]).unwrap();
        scheduler.schedule_write_sync(p2, &[2u8; PAGE_SIZE]).unwrap();

        let mut out1 = [0u8; PAGE_SIZE];
        let mut out2 = [0u8; PAGE_SIZE];
        scheduler.schedule_read_sync(p1, &mut out1).unwrap();
        scheduler.schedule_read_sync(p2, &mut out2).unwrap();
        assert_eq!(out1[0], 1);
        assert_eq!(out2[0], 2);
    }
}
