use std::collections::{HashSet, VecDeque};
use parking_lot::Mutex;

use crate::common::types::FrameId;

/// LRU replacement policy over the buffer pool's frames.
///
/// A frame is tracked here iff it has been `unpin`ned and not re-`pin`ned
/// since, i.e. exactly the frames whose pin count has dropped to zero.
/// Recency is defined by the order of `unpin` calls: most recently unpinned
/// at the front, eviction victim taken from the back.
pub struct LruReplacer {
    inner: Mutex<LruState>,
}

struct LruState {
    list: VecDeque<FrameId>,
    members: HashSet<FrameId>,
    capacity: usize,
}

impl LruReplacer {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(LruState {
                list: VecDeque::with_capacity(capacity),
                members: HashSet::with_capacity(capacity),
                capacity,
            }),
        }
    }

    /// Evict the least recently unpinned frame, if any.
    pub fn victim(&self) -> Option<FrameId> {
        let mut state = self.inner.lock();
        let frame_id = state.list.pop_back()?;
        state.members.remove(&frame_id);
        Some(frame_id)
    }

    /// Mark a frame ineligible for eviction. No-op when the frame is not
    /// tracked.
    pub fn pin(&self, frame_id: FrameId) {
        let mut state = self.inner.lock();
        if state.members.remove(&frame_id) {
            if let Some(pos) = state.list.iter().position(|&id| id == frame_id) {
                state.list.remove(pos);
            }
        }
    }

    /// Mark a frame eligible for eviction, placed at the MRU end. No-op when
    /// the frame is already tracked or the replacer is at capacity.
    pub fn unpin(&self, frame_id: FrameId) {
        let mut state = self.inner.lock();
        if state.members.contains(&frame_id) || state.list.len() >= state.capacity {
            return;
        }
        state.list.push_front(frame_id);
        state.members.insert(frame_id);
    }

    /// Number of frames currently eligible for eviction.
    pub fn size(&self) -> usize {
        self.inner.lock().list.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unpin_victim_cycle() {
        let replacer = LruReplacer::new(7);

        for frame_id in 1..=6 {
            replacer.unpin(frame_id);
        }
        assert_eq!(replacer.size(), 6);

        // Victims come back in unpin order, oldest first
        assert_eq!(replacer.victim(), Some(1));
        assert_eq!(replacer.victim(), Some(2));
        assert_eq!(replacer.victim(), Some(3));
        assert_eq!(replacer.victim(), Some(4));
        assert_eq!(replacer.victim(), Some(5));
        assert_eq!(replacer.victim(), Some(6));
        assert_eq!(replacer.victim(), None);

        // Pinning an untracked frame is a no-op
        replacer.pin(1);
        replacer.unpin(1);
        assert_eq!(replacer.victim(), Some(1));
    }

    #[test]
    fn test_pin_removes_candidate() {
        let replacer = LruReplacer::new(4);

        replacer.unpin(1);
        replacer.unpin(2);
        replacer.unpin(3);
        replacer.pin(2);

        assert_eq!(replacer.size(), 2);
        assert_eq!(replacer.victim(), Some(1));
        assert_eq!(replacer.victim(), Some(3));
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_unpin_is_idempotent() {
        let replacer = LruReplacer::new(4);

        replacer.unpin(5);
        replacer.unpin(5);
        assert_eq!(replacer.size(), 1);
        assert_eq!(replacer.victim(), Some(5));
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_capacity_bound() {
        let replacer = LruReplacer::new(2);

        replacer.unpin(1);
        replacer.unpin(2);
        // At capacity: further unpins are dropped
        replacer.unpin(3);

        assert_eq!(replacer.size(), 2);
        assert_eq!(replacer.victim(), Some(1));
        assert_eq!(replacer.victim(), Some(2));
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_reunpin_moves_to_front() {
        let replacer = LruReplacer::new(4);

        replacer.unpin(1);
        replacer.unpin(2);
        replacer.unpin(3);

        // Re-pin then unpin frame 1: it becomes the most recently used
        replacer.pin(1);
        replacer.unpin(1);

        assert_eq!(replacer.victim(), Some(2));
        assert_eq!(replacer.victim(), Some(3));
        assert_eq!(replacer.victim(), Some(1));
    }
}
