//! LRU-K replacement policy.
//!
//! Tracks per-frame access history and answers eviction queries for the
//! buffer pool. Frames with fewer than K recorded accesses ("young") have
//! infinite backward k-distance and are evicted first, in LRU order of their
//! last access; frames with K or more accesses ("mature") are evicted by
//! largest k-distance, i.e. oldest K-th most recent access. Requiring K
//! references before a frame earns the hot tier keeps one sequential scan
//! from flushing the whole pool.
//!
//! Internally the evictable frames are segmented into two eviction queues,
//! one per tier, each an ordered map keyed by the tier's ordering timestamp
//! (last access while young, K-th most recent access once mature). Picking
//! a victim pops the first entry of the young queue, then of the mature
//! queue. Non-evictable frames keep their history in the node store but sit
//! in neither queue.
//!
//! The replacer never touches frames or disk; evictability is driven solely
//! by the pool's pin accounting through [`LruKReplacer::set_evictable`].

use crate::FrameId;
use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap, VecDeque};
use surge_common::prelude::*;

/// Per-frame access record.
struct LruKNode {
    /// Last <= K access timestamps, oldest at the front
    history: VecDeque<u64>,
    /// Whether the pool currently allows this frame to be a victim
    evictable: bool,
}

impl LruKNode {
    fn is_mature(&self, k: usize) -> bool {
        self.history.len() >= k
    }

    /// Position of this node in its tier's eviction queue: last access
    /// while young, K-th most recent access once mature.
    fn order_key(&self, k: usize) -> u64 {
        let ts = if self.is_mature(k) {
            self.history.front()
        } else {
            self.history.back()
        };
        *ts.expect("tracked node has a history")
    }
}

struct ReplacerState {
    /// Tracked frames keyed by frame id
    node_store: HashMap<FrameId, LruKNode>,
    /// Evictable young frames (< K accesses), keyed by last access
    young: BTreeMap<u64, FrameId>,
    /// Evictable mature frames (>= K accesses), keyed by K-th most recent
    /// access; the first entry has the largest k-distance
    mature: BTreeMap<u64, FrameId>,
    /// Monotonic logical clock, bumped on every recorded access
    current_timestamp: u64,
}

impl ReplacerState {
    /// Eviction queue a node belongs in while evictable.
    fn queue_for(&mut self, mature: bool) -> &mut BTreeMap<u64, FrameId> {
        if mature {
            &mut self.mature
        } else {
            &mut self.young
        }
    }
}

/// LRU-K replacer over a fixed universe of `num_frames` frame ids.
pub struct LruKReplacer {
    state: Mutex<ReplacerState>,
    num_frames: usize,
    k: usize,
}

impl LruKReplacer {
    /// Create a replacer tracking frame ids in `[0, num_frames)`.
    ///
    /// # Panics
    ///
    /// Panics if `k` is zero.
    pub fn new(num_frames: usize, k: usize) -> Self {
        assert!(k >= 1, "LRU-K requires k >= 1");
        Self {
            state: Mutex::new(ReplacerState {
                node_store: HashMap::with_capacity(num_frames),
                young: BTreeMap::new(),
                mature: BTreeMap::new(),
                current_timestamp: 0,
            }),
            num_frames,
            k,
        }
    }

    /// Record an access to `frame_id` at the next logical timestamp.
    ///
    /// A frame seen for the first time starts non-evictable; the pool flips
    /// it once the pin count drops to zero. An access to an evictable frame
    /// re-keys it in its queue, migrating it from young to mature when this
    /// access is its K-th.
    ///
    /// # Panics
    ///
    /// Panics if `frame_id` is outside `[0, num_frames)`.
    pub fn record_access(&self, frame_id: FrameId) {
        self.check_frame_id(frame_id);
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.current_timestamp += 1;
        let ts = state.current_timestamp;

        let node = match state.node_store.entry(frame_id) {
            Entry::Vacant(slot) => {
                let mut history = VecDeque::with_capacity(self.k);
                history.push_back(ts);
                slot.insert(LruKNode {
                    history,
                    evictable: false,
                });
                return;
            }
            Entry::Occupied(slot) => slot.into_mut(),
        };

        let old_slot = node
            .evictable
            .then(|| (node.is_mature(self.k), node.order_key(self.k)));
        node.history.push_back(ts);
        if node.history.len() > self.k {
            node.history.pop_front();
        }
        let new_slot = node
            .evictable
            .then(|| (node.is_mature(self.k), node.order_key(self.k)));

        if let Some((mature, key)) = old_slot {
            state.queue_for(mature).remove(&key);
        }
        if let Some((mature, key)) = new_slot {
            state.queue_for(mature).insert(key, frame_id);
        }
    }

    /// Choose and remove a victim frame.
    ///
    /// Young evictable frames (fewer than K accesses) are preferred, oldest
    /// last access first; otherwise the mature frame with the largest
    /// k-distance loses. Returns `None` when nothing is evictable.
    pub fn evict(&self) -> Option<FrameId> {
        let mut state = self.state.lock();
        let victim = match state.young.pop_first() {
            Some((_, fid)) => fid,
            None => state.mature.pop_first()?.1,
        };
        state.node_store.remove(&victim);
        trace!(frame_id = victim, "evicted frame from replacer");
        Some(victim)
    }

    /// Toggle whether `frame_id` may be chosen as a victim, inserting it
    /// into or withdrawing it from its tier's eviction queue.
    ///
    /// No-op when the flag already matches or the frame is untracked.
    ///
    /// # Panics
    ///
    /// Panics if `frame_id` is outside `[0, num_frames)`.
    pub fn set_evictable(&self, frame_id: FrameId, evictable: bool) {
        self.check_frame_id(frame_id);
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let Some(node) = state.node_store.get_mut(&frame_id) else {
            return;
        };
        if node.evictable == evictable {
            return;
        }
        node.evictable = evictable;
        let mature = node.is_mature(self.k);
        let key = node.order_key(self.k);

        let queue = state.queue_for(mature);
        if evictable {
            queue.insert(key, frame_id);
        } else {
            queue.remove(&key);
        }
    }

    /// Drop a tracked frame and its history.
    ///
    /// Untracked frames are a silent no-op.
    ///
    /// # Panics
    ///
    /// Panics if `frame_id` is outside `[0, num_frames)`, or if the frame is
    /// tracked but not evictable; callers must unpin before removing.
    pub fn remove(&self, frame_id: FrameId) {
        self.check_frame_id(frame_id);
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let Some(node) = state.node_store.get(&frame_id) else {
            return;
        };
        assert!(
            node.evictable,
            "remove called on non-evictable frame {frame_id}"
        );
        let mature = node.is_mature(self.k);
        let key = node.order_key(self.k);

        state.queue_for(mature).remove(&key);
        state.node_store.remove(&frame_id);
    }

    /// Number of evictable tracked frames.
    pub fn size(&self) -> usize {
        let state = self.state.lock();
        state.young.len() + state.mature.len()
    }

    #[inline]
    fn check_frame_id(&self, frame_id: FrameId) {
        assert!(
            frame_id < self.num_frames,
            "frame id {frame_id} out of range for replacer of {} frames",
            self.num_frames
        );
    }
}
