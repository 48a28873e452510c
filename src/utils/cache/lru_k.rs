use super::Replacer;
use crate::buffer::FrameId;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

#[derive(Debug)]
struct LruKNode {
    // Last k access ticks, oldest first.
    history: VecDeque<u64>,
    evictable: bool,
}

impl LruKNode {
    fn new(k: usize) -> Self {
        Self {
            history: VecDeque::with_capacity(k),
            evictable: false,
        }
    }

    fn first_access(&self) -> u64 {
        *self.history.front().expect("tracked frame has history")
    }

    /// Backward k-distance: the spread of the retained k ticks, or
    /// `u64::MAX` while fewer than k accesses have been seen.
    fn k_distance(&self, k: usize) -> u64 {
        if self.history.len() < k {
            u64::MAX
        } else {
            self.history.back().unwrap() - self.history.front().unwrap()
        }
    }
}

#[derive(Debug)]
struct LruKState {
    node_store: HashMap<FrameId, LruKNode>,
    // Count of evictable frames.
    current_size: usize,
    ticks: u64,
}

/// LRU-K replacer: evicts the frame whose backward k-distance is largest,
/// where frames with fewer than k recorded accesses count as infinitely
/// distant. Ties (including all-infinite ones) fall back to plain LRU on
/// the earliest retained access tick.
#[derive(Debug)]
pub struct LRUKReplacer {
    replacer_size: usize,
    k: usize,
    state: Mutex<LruKState>,
}

impl LRUKReplacer {
    pub fn new(num_frames: usize, k: usize) -> Self {
        assert!(k > 0, "LRU-K requires k > 0");
        Self {
            replacer_size: num_frames,
            k,
            state: Mutex::new(LruKState {
                node_store: HashMap::with_capacity(num_frames),
                current_size: 0,
                ticks: 0,
            }),
        }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    fn check_frame_id(&self, frame_id: FrameId) {
        assert!(
            frame_id < self.replacer_size,
            "frame id {} out of range (capacity {})",
            frame_id,
            self.replacer_size
        );
    }
}

impl Replacer for LRUKReplacer {
    fn record_access(&self, frame_id: FrameId) {
        self.check_frame_id(frame_id);
        let mut state = self.state.lock();
        let tick = state.ticks;
        state.ticks += 1;
        let k = self.k;
        let node = state
            .node_store
            .entry(frame_id)
            .or_insert_with(|| LruKNode::new(k));
        if node.history.len() == k {
            node.history.pop_front();
        }
        node.history.push_back(tick);
    }

    fn evict(&self) -> Option<FrameId> {
        let mut state = self.state.lock();
        if state.current_size == 0 {
            return None;
        }
        let mut victim: Option<(FrameId, u64, u64)> = None;
        for (&frame_id, node) in state.node_store.iter() {
            if !node.evictable {
                continue;
            }
            let distance = node.k_distance(self.k);
            let first = node.first_access();
            let better = match victim {
                None => true,
                Some((_, best_distance, best_first)) => {
                    distance > best_distance
                        || (distance == best_distance && first < best_first)
                }
            };
            if better {
                victim = Some((frame_id, distance, first));
            }
        }
        let (frame_id, _, _) = victim.expect("current_size > 0 implies an evictable frame");
        state.node_store.remove(&frame_id);
        state.current_size -= 1;
        Some(frame_id)
    }

    fn set_evictable(&self, frame_id: FrameId, evictable: bool) {
        self.check_frame_id(frame_id);
        let mut state = self.state.lock();
        let node = state
            .node_store
            .get_mut(&frame_id)
            .unwrap_or_else(|| panic!("frame {} not tracked by replacer", frame_id));
        let was_evictable = node.evictable;
        node.evictable = evictable;
        if evictable && !was_evictable {
            state.current_size += 1;
        } else if !evictable && was_evictable {
            state.current_size -= 1;
        }
    }

    fn remove(&self, frame_id: FrameId) {
        self.check_frame_id(frame_id);
        let mut state = self.state.lock();
        if let Some(node) = state.node_store.get(&frame_id) {
            assert!(node.evictable, "removing non-evictable frame {}", frame_id);
            state.node_store.remove(&frame_id);
            state.current_size -= 1;
        }
    }

    fn size(&self) -> usize {
        self.state.lock().current_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_evictable_adjusts_size() {
        let replacer = LRUKReplacer::new(3, 2);
        replacer.record_access(1);
        assert_eq!(replacer.size(), 0);
        replacer.set_evictable(1, true);
        assert_eq!(replacer.size(), 1);
        // Repeating the same flag is not a transition.
        replacer.set_evictable(1, true);
        assert_eq!(replacer.size(), 1);
        replacer.set_evictable(1, false);
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn evict_prefers_largest_k_distance() {
        let replacer = LRUKReplacer::new(4, 3);
        replacer.record_access(1); // ts=0
        replacer.record_access(2); // ts=1
        replacer.record_access(2); // ts=2
        replacer.record_access(1); // ts=3
        replacer.record_access(2); // ts=4
        replacer.record_access(1); // ts=5
        replacer.set_evictable(1, true);
        replacer.set_evictable(2, true);
        // Frame 1 history [0,3,5] spread 5; frame 2 history [1,2,4] spread 3.
        assert_eq!(replacer.evict(), Some(1));
        assert_eq!(replacer.evict(), Some(2));
        assert_eq!(replacer.evict(), None);
    }

    #[test]
    fn frames_below_k_history_evicted_first() {
        let replacer = LRUKReplacer::new(7, 2);
        for frame_id in 1..=6 {
            replacer.record_access(frame_id); // ts = frame_id - 1
        }
        for frame_id in 1..=6 {
            replacer.set_evictable(frame_id, true);
        }
        for frame_id in 1..=4 {
            replacer.record_access(frame_id); // ts 6..=9
        }
        // Frames 5 and 6 still have a single access: infinite distance,
        // LRU order among them.
        assert_eq!(replacer.evict(), Some(5));
        assert_eq!(replacer.evict(), Some(6));
        // Frames 1..=4 all have spread 6; earliest first access wins.
        assert_eq!(replacer.evict(), Some(1));
        assert_eq!(replacer.size(), 3);
    }

    #[test]
    fn mixed_workload_victim_order() {
        let replacer = LRUKReplacer::new(7, 2);

        for frame_id in 1..=6 {
            replacer.record_access(frame_id); // ts 0..=5
        }
        for frame_id in 1..=5 {
            replacer.set_evictable(frame_id, true);
        }
        replacer.set_evictable(6, false);
        assert_eq!(replacer.size(), 5);

        replacer.record_access(1); // ts=6, history [0,6]

        // Single-access frames go first, oldest access first.
        assert_eq!(replacer.evict(), Some(2));
        assert_eq!(replacer.evict(), Some(3));
        assert_eq!(replacer.evict(), Some(4));
        assert_eq!(replacer.size(), 2);

        replacer.record_access(3); // ts=7
        replacer.record_access(4); // ts=8
        replacer.record_access(5); // ts=9, history [4,9]
        replacer.record_access(4); // ts=10, history [8,10]
        replacer.set_evictable(3, true);
        replacer.set_evictable(4, true);
        assert_eq!(replacer.size(), 4);

        // Frame 3 is the only one below k history.
        assert_eq!(replacer.evict(), Some(3));

        replacer.set_evictable(6, true);
        assert_eq!(replacer.size(), 4);
        // Frame 6 history [5]: infinite distance.
        assert_eq!(replacer.evict(), Some(6));

        replacer.set_evictable(1, false);
        // Evictable: frame 5 spread 5, frame 4 spread 2.
        assert_eq!(replacer.evict(), Some(5));

        replacer.record_access(1); // ts=11, history [6,11]
        replacer.record_access(1); // ts=12, history [11,12]
        replacer.set_evictable(1, true);
        // Frame 4 spread 2 beats frame 1 spread 1.
        assert_eq!(replacer.evict(), Some(4));
        assert_eq!(replacer.evict(), Some(1));
        assert_eq!(replacer.evict(), None);
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn remove_absent_frame_is_noop() {
        let replacer = LRUKReplacer::new(3, 2);
        replacer.remove(1);
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    #[should_panic(expected = "non-evictable")]
    fn remove_pinned_frame_panics() {
        let replacer = LRUKReplacer::new(3, 2);
        replacer.record_access(1);
        replacer.remove(1);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn record_access_out_of_range_panics() {
        let replacer = LRUKReplacer::new(3, 2);
        replacer.record_access(3);
    }
}
