use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use crate::common::{FrameId, Timestamp};

/// Tracks access history for a single frame
#[derive(Debug)]
struct FrameAccessInfo {
    /// History of access timestamps (most recent at back), bounded to k
    history: VecDeque<Timestamp>,
    /// Whether this frame may currently be evicted
    is_evictable: bool,
}

impl FrameAccessInfo {
    fn new() -> Self {
        Self {
            history: VecDeque::new(),
            is_evictable: false,
        }
    }

    fn record_access(&mut self, timestamp: Timestamp, k: usize) {
        self.history.push_back(timestamp);
        while self.history.len() > k {
            self.history.pop_front();
        }
    }

    /// Returns the backward k-distance from the current timestamp, or None
    /// when the frame has fewer than k recorded accesses (+inf distance).
    fn k_distance(&self, current_timestamp: Timestamp, k: usize) -> Option<Timestamp> {
        if self.history.len() < k {
            None
        } else {
            Some(current_timestamp - self.history[self.history.len() - k])
        }
    }

    fn earliest_timestamp(&self) -> Option<Timestamp> {
        self.history.front().copied()
    }
}

/// Inner state, all mutated under one mutex so the operations are
/// linearizable with respect to one another.
struct ReplacerState {
    /// Logical clock, bumped once per recorded access
    current_timestamp: Timestamp,
    /// Access information per tracked frame
    frames: HashMap<FrameId, FrameAccessInfo>,
    /// Number of evictable frames
    num_evictable: usize,
}

/// LRU-K replacement policy.
///
/// Evicts the evictable frame whose backward k-distance is largest, where
/// backward k-distance is the difference between the current timestamp and
/// the timestamp of the kth most recent access. A frame with fewer than k
/// recorded accesses has +inf backward k-distance; ties among +inf frames
/// are broken by the earliest recorded access (classical LRU).
///
/// A frame is tracked from its first `record_access` until it is removed
/// or evicted. New frames default to non-evictable.
pub struct LruKReplacer {
    /// K value for the LRU-K algorithm
    k: usize,
    /// Maximum number of frames the replacer can track
    max_frames: usize,
    state: Mutex<ReplacerState>,
}

impl LruKReplacer {
    /// Creates a new LRU-K replacer with the given k value and maximum frame count.
    pub fn new(k: usize, max_frames: usize) -> Self {
        assert!(k > 0, "LRU-K requires k >= 1");
        Self {
            k,
            max_frames,
            state: Mutex::new(ReplacerState {
                current_timestamp: 0,
                frames: HashMap::new(),
                num_evictable: 0,
            }),
        }
    }

    /// Evicts the evictable frame with the largest backward k-distance and
    /// stops tracking it. Returns None if no frame is evictable.
    pub fn evict(&self) -> Option<FrameId> {
        let mut state = self.state.lock();

        if state.num_evictable == 0 {
            return None;
        }

        let current_ts = state.current_timestamp;

        // +inf frames (fewer than k accesses) take priority over any finite
        // distance; among them the earliest first access wins.
        let mut victim: Option<FrameId> = None;
        let mut victim_k_dist: Option<Timestamp> = None;
        let mut victim_earliest_ts: Option<Timestamp> = None;

        for (frame_id, info) in state.frames.iter() {
            if !info.is_evictable {
                continue;
            }

            let k_dist = info.k_distance(current_ts, self.k);
            let earliest_ts = info.earliest_timestamp();

            let should_replace = match (victim_k_dist, k_dist) {
                // Current victim has +inf, candidate has finite -> keep victim
                (None, Some(_)) => false,
                // Current victim has finite, candidate has +inf -> replace
                (Some(_), None) => true,
                // Both +inf -> compare earliest timestamps
                (None, None) => match (victim_earliest_ts, earliest_ts) {
                    (Some(v_ts), Some(c_ts)) => c_ts < v_ts,
                    (None, Some(_)) => true,
                    _ => false,
                },
                // Both finite -> larger k-distance wins
                (Some(v_dist), Some(c_dist)) => c_dist > v_dist,
            };

            if victim.is_none() || should_replace {
                victim = Some(*frame_id);
                victim_k_dist = k_dist;
                victim_earliest_ts = earliest_ts;
            }
        }

        if let Some(frame_id) = victim {
            state.frames.remove(&frame_id);
            state.num_evictable -= 1;
        }

        victim
    }

    /// Records that the given frame was accessed now. Starts tracking the
    /// frame on its first access; new frames are not evictable.
    pub fn record_access(&self, frame_id: FrameId) {
        if frame_id.as_usize() >= self.max_frames {
            return;
        }

        let mut state = self.state.lock();
        let timestamp = state.current_timestamp;
        state.current_timestamp += 1;

        state
            .frames
            .entry(frame_id)
            .or_insert_with(FrameAccessInfo::new)
            .record_access(timestamp, self.k);
    }

    /// Sets whether a frame is evictable. A frame whose pin count dropped
    /// to zero should be marked evictable; pinning marks it non-evictable.
    /// Untracked frames are ignored.
    pub fn set_evictable(&self, frame_id: FrameId, is_evictable: bool) {
        let mut state = self.state.lock();
        let state = &mut *state;

        if let Some(info) = state.frames.get_mut(&frame_id) {
            if info.is_evictable != is_evictable {
                info.is_evictable = is_evictable;
                if is_evictable {
                    state.num_evictable += 1;
                } else {
                    state.num_evictable -= 1;
                }
            }
        }
    }

    /// Stops tracking a frame, dropping its access history. Called when a
    /// page is deleted from the buffer pool.
    ///
    /// # Panics
    ///
    /// Panics if the frame is tracked but not evictable; removing a pinned
    /// frame is a programming error.
    pub fn remove(&self, frame_id: FrameId) {
        let mut state = self.state.lock();
        let state = &mut *state;

        if let Some(info) = state.frames.get(&frame_id) {
            assert!(
                info.is_evictable,
                "cannot remove non-evictable frame {} from the replacer",
                frame_id
            );
            state.frames.remove(&frame_id);
            state.num_evictable -= 1;
        }
    }

    /// Returns the number of evictable frames.
    pub fn size(&self) -> usize {
        self.state.lock().num_evictable
    }

    /// Returns the k value of this replacer.
    pub fn k(&self) -> usize {
        self.k
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lru_k_replacer_new() {
        let replacer = LruKReplacer::new(2, 10);
        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.k(), 2);
    }

    #[test]
    fn test_lru_k_replacer_evict_empty() {
        let replacer = LruKReplacer::new(2, 10);
        assert_eq!(replacer.evict(), None);
    }

    #[test]
    fn test_lru_k_replacer_basic() {
        let replacer = LruKReplacer::new(2, 10);

        replacer.record_access(FrameId::new(0));
        replacer.record_access(FrameId::new(1));
        replacer.record_access(FrameId::new(2));

        replacer.set_evictable(FrameId::new(0), true);
        replacer.set_evictable(FrameId::new(1), true);
        replacer.set_evictable(FrameId::new(2), true);

        assert_eq!(replacer.size(), 3);

        // All have a single access (< k=2), so all have +inf distance;
        // the earliest first access goes first
        assert_eq!(replacer.evict(), Some(FrameId::new(0)));
        assert_eq!(replacer.size(), 2);
    }

    #[test]
    fn test_lru_k_replacer_inf_beats_finite() {
        let replacer = LruKReplacer::new(2, 10);

        replacer.record_access(FrameId::new(0));
        replacer.record_access(FrameId::new(0));

        replacer.record_access(FrameId::new(1));

        replacer.set_evictable(FrameId::new(0), true);
        replacer.set_evictable(FrameId::new(1), true);

        // Frame 1 has only one access, so +inf distance; evicted first
        assert_eq!(replacer.evict(), Some(FrameId::new(1)));
    }

    #[test]
    fn test_lru_k_replacer_scan_resistance() {
        // Accesses 1,2,3,1,2 with k=2: frame 3 has a single access and
        // therefore +inf backward 2-distance, while 1 and 2 are finite
        let replacer = LruKReplacer::new(2, 10);

        replacer.record_access(FrameId::new(1));
        replacer.record_access(FrameId::new(2));
        replacer.record_access(FrameId::new(3));
        replacer.record_access(FrameId::new(1));
        replacer.record_access(FrameId::new(2));

        for i in 1..=3 {
            replacer.set_evictable(FrameId::new(i), true);
        }

        assert_eq!(replacer.evict(), Some(FrameId::new(3)));
    }

    #[test]
    fn test_lru_k_replacer_not_evictable() {
        let replacer = LruKReplacer::new(2, 10);

        replacer.record_access(FrameId::new(0));
        replacer.record_access(FrameId::new(1));

        replacer.set_evictable(FrameId::new(1), true);

        assert_eq!(replacer.size(), 1);
        assert_eq!(replacer.evict(), Some(FrameId::new(1)));
        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.evict(), None);
    }

    #[test]
    fn test_lru_k_replacer_remove() {
        let replacer = LruKReplacer::new(2, 10);

        replacer.record_access(FrameId::new(0));
        replacer.set_evictable(FrameId::new(0), true);

        assert_eq!(replacer.size(), 1);

        replacer.remove(FrameId::new(0));

        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.evict(), None);

        // Removing an untracked frame is a no-op
        replacer.remove(FrameId::new(0));
    }

    #[test]
    #[should_panic(expected = "non-evictable")]
    fn test_lru_k_replacer_remove_pinned_panics() {
        let replacer = LruKReplacer::new(2, 10);

        replacer.record_access(FrameId::new(0));
        replacer.remove(FrameId::new(0));
    }

    #[test]
    fn test_lru_k_replacer_toggle_evictable() {
        let replacer = LruKReplacer::new(2, 10);

        replacer.record_access(FrameId::new(0));
        replacer.set_evictable(FrameId::new(0), true);
        assert_eq!(replacer.size(), 1);

        replacer.set_evictable(FrameId::new(0), false);
        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.evict(), None);

        replacer.set_evictable(FrameId::new(0), true);
        assert_eq!(replacer.size(), 1);
        assert_eq!(replacer.evict(), Some(FrameId::new(0)));
    }

    #[test]
    fn test_lru_k_replacer_largest_k_distance() {
        let replacer = LruKReplacer::new(2, 10);

        // Frame 0: accesses at t=0, t=1
        replacer.record_access(FrameId::new(0));
        replacer.record_access(FrameId::new(0));

        // Frame 1: accesses at t=2, t=3
        replacer.record_access(FrameId::new(1));
        replacer.record_access(FrameId::new(1));

        // Frame 2: accesses at t=4, t=5
        replacer.record_access(FrameId::new(2));
        replacer.record_access(FrameId::new(2));

        replacer.set_evictable(FrameId::new(0), true);
        replacer.set_evictable(FrameId::new(1), true);
        replacer.set_evictable(FrameId::new(2), true);

        // Frame 0's 2nd-most-recent access is oldest, so its k-distance
        // is largest
        assert_eq!(replacer.evict(), Some(FrameId::new(0)));
        assert_eq!(replacer.evict(), Some(FrameId::new(1)));
        assert_eq!(replacer.evict(), Some(FrameId::new(2)));
    }

    #[test]
    fn test_lru_k_replacer_history_bounded() {
        let replacer = LruKReplacer::new(2, 10);

        // Many accesses to frame 0; only the last k matter
        for _ in 0..10 {
            replacer.record_access(FrameId::new(0));
        }

        replacer.record_access(FrameId::new(1));
        replacer.record_access(FrameId::new(1));

        replacer.set_evictable(FrameId::new(0), true);
        replacer.set_evictable(FrameId::new(1), true);

        // Frame 1 was accessed more recently, so frame 0 goes first
        assert_eq!(replacer.evict(), Some(FrameId::new(0)));
        assert_eq!(replacer.evict(), Some(FrameId::new(1)));
    }
}
