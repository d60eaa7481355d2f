use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use crate::common::{FrameId, KeelError, Result};

#[derive(Debug, Default)]
struct FrameEntry {
    access_count: usize,
    evictable: bool,
}

#[derive(Debug, Default)]
struct ReplacerState {
    entries: HashMap<FrameId, FrameEntry>,
    /// Frames with fewer than k accesses, front = newest first access.
    /// Evicted FIFO from the back.
    history: VecDeque<FrameId>,
    /// Frames with at least k accesses, front = most recently accessed.
    /// Evicted LRU from the back.
    cache: VecDeque<FrameId>,
    /// Number of tracked frames whose evictable flag is set.
    curr_size: usize,
}

impl ReplacerState {
    fn unlink(&mut self, frame_id: FrameId, from_cache: bool) {
        let list = if from_cache {
            &mut self.cache
        } else {
            &mut self.history
        };
        if let Some(pos) = list.iter().position(|&f| f == frame_id) {
            list.remove(pos);
        }
    }
}

/// LRU-K replacement policy.
///
/// Frames touched fewer than K times live on the history queue and are
/// evicted FIFO by their first access; once a frame reaches K accesses it
/// migrates to the cache queue, which evicts by least recent access. A frame
/// is an eviction candidate only while its evictable flag is set, and
/// history frames are always preferred over cache frames.
pub struct LruKReplacer {
    k: usize,
    num_frames: usize,
    state: Mutex<ReplacerState>,
}

impl LruKReplacer {
    /// Creates a replacer tracking up to `num_frames` frames with the given K.
    pub fn new(num_frames: usize, k: usize) -> Self {
        assert!(k > 0);
        Self {
            k,
            num_frames,
            state: Mutex::new(ReplacerState::default()),
        }
    }

    fn check_frame(&self, frame_id: FrameId) -> Result<()> {
        if frame_id.as_usize() > self.num_frames {
            return Err(KeelError::InvalidFrameId(frame_id));
        }
        Ok(())
    }

    /// Picks an eviction victim and stops tracking it.
    ///
    /// The oldest evictable history frame wins; only when the history queue
    /// holds no evictable frame does the least recently used evictable cache
    /// frame get chosen. Returns `None` when nothing is evictable.
    pub fn evict(&self) -> Option<FrameId> {
        let mut s = self.state.lock();
        if s.curr_size == 0 {
            return None;
        }
        for list in [false, true] {
            let queue = if list { &s.cache } else { &s.history };
            let victim = queue
                .iter()
                .rev()
                .copied()
                .find(|f| s.entries.get(f).map(|e| e.evictable).unwrap_or(false));
            if let Some(frame_id) = victim {
                s.unlink(frame_id, list);
                s.entries.remove(&frame_id);
                s.curr_size -= 1;
                return Some(frame_id);
            }
        }
        None
    }

    /// Records an access to `frame_id`, moving it between the two queues as
    /// its access count crosses K.
    pub fn record_access(&self, frame_id: FrameId) -> Result<()> {
        self.check_frame(frame_id)?;
        let mut s = self.state.lock();
        let count = {
            let entry = s.entries.entry(frame_id).or_default();
            entry.access_count += 1;
            entry.access_count
        };
        if count == 1 {
            s.history.push_front(frame_id);
        } else if count == self.k {
            s.unlink(frame_id, false);
            s.cache.push_front(frame_id);
        } else if count > self.k {
            s.unlink(frame_id, true);
            s.cache.push_front(frame_id);
        }
        Ok(())
    }

    /// Flips the evictable flag of a tracked frame, adjusting the candidate
    /// count. Untracked frames are ignored.
    pub fn set_evictable(&self, frame_id: FrameId, evictable: bool) -> Result<()> {
        self.check_frame(frame_id)?;
        let mut s = self.state.lock();
        let delta = match s.entries.get_mut(&frame_id) {
            Some(entry) if entry.evictable != evictable => {
                entry.evictable = evictable;
                if evictable {
                    1
                } else {
                    -1
                }
            }
            _ => 0,
        };
        if delta > 0 {
            s.curr_size += 1;
        } else if delta < 0 {
            s.curr_size -= 1;
        }
        Ok(())
    }

    /// Stops tracking `frame_id` entirely. The caller only removes frames
    /// that are evictable or untracked; untracked ids are ignored.
    pub fn remove(&self, frame_id: FrameId) -> Result<()> {
        self.check_frame(frame_id)?;
        let mut s = self.state.lock();
        if let Some(entry) = s.entries.remove(&frame_id) {
            let from_cache = entry.access_count >= self.k;
            s.unlink(frame_id, from_cache);
            if entry.evictable {
                s.curr_size -= 1;
            }
        }
        Ok(())
    }

    /// Returns the number of evictable frames.
    pub fn size(&self) -> usize {
        self.state.lock().curr_size
    }

    /// Returns the K value of this replacer.
    pub fn k(&self) -> usize {
        self.k
    }
}
