#![forbid(unsafe_code)]
//! Start/end bookkeeping for the walks seeded by this worker.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::RwLock;

use crate::types::WalkerId;

const UNSET: u64 = 0;

struct Slots {
    epoch: Instant,
    start: Vec<AtomicU64>,
    end: Vec<AtomicU64>,
    life: Vec<AtomicU32>,
}

impl Slots {
    fn new(total: usize) -> Self {
        Self {
            epoch: Instant::now(),
            start: (0..total).map(|_| AtomicU64::new(UNSET)).collect(),
            end: (0..total).map(|_| AtomicU64::new(UNSET)).collect(),
            life: (0..total).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    // Offset from the epoch, shifted by one so that zero can mean "unset".
    fn now(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64 + 1
    }
}

/// Tracks when each walk of the current run started and ended.
///
/// Slots are indexed by walker id and sized by [`WalkStatsTracker::reset`].
pub struct WalkStatsTracker {
    slots: RwLock<Slots>,
    run: AtomicU32,
    completed: AtomicU64,
    completed_hops: AtomicU64,
}

impl Default for WalkStatsTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl WalkStatsTracker {
    /// Creates a tracker with no run armed.
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(Slots::new(0)),
            run: AtomicU32::new(0),
            completed: AtomicU64::new(0),
            completed_hops: AtomicU64::new(0),
        }
    }

    /// Clears all counters, sizes the tracker for `total` walks and opens a
    /// new run.
    pub fn reset(&self, total: usize) {
        let mut slots = self.slots.write();
        *slots = Slots::new(total);
        self.run.fetch_add(1, Ordering::AcqRel);
        self.completed.store(0, Ordering::Release);
        self.completed_hops.store(0, Ordering::Release);
    }

    /// Tag of the current run; walkers seeded under another tag are not counted.
    pub fn run(&self) -> u32 {
        self.run.load(Ordering::Acquire)
    }

    /// Number of walks the current run was sized for.
    pub fn capacity(&self) -> usize {
        self.slots.read().start.len()
    }

    /// Stamps the start of walk `id` with its initial `life`.
    pub fn record_start(&self, id: WalkerId, life: u16) {
        let slots = self.slots.read();
        let now = slots.now();
        if let (Some(start), Some(slot_life)) = (slots.start.get(id.index()), slots.life.get(id.index())) {
            start.store(now, Ordering::Release);
            slot_life.store(u32::from(life), Ordering::Release);
        }
    }

    /// Stamps the end of walk `id`. Returns false if the walk is unknown to
    /// this run or already ended.
    pub fn record_end(&self, id: WalkerId) -> bool {
        let slots = self.slots.read();
        let (Some(start), Some(end)) = (slots.start.get(id.index()), slots.end.get(id.index())) else {
            return false;
        };
        if start.load(Ordering::Acquire) == UNSET {
            return false;
        }
        let now = slots.now();
        if end
            .compare_exchange(UNSET, now, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        self.completed.fetch_add(1, Ordering::AcqRel);
        let life = slots.life[id.index()].load(Ordering::Acquire);
        self.completed_hops
            .fetch_add(u64::from(life), Ordering::AcqRel);
        true
    }

    /// Walks that ended during the current run.
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }

    /// Sum of the initial lives of the completed walks.
    pub fn completed_hops(&self) -> u64 {
        self.completed_hops.load(Ordering::Acquire)
    }

    /// Seconds between the earliest recorded start and the latest recorded end.
    pub fn execution_time(&self) -> f64 {
        let slots = self.slots.read();
        let first = slots
            .start
            .iter()
            .map(|s| s.load(Ordering::Acquire))
            .filter(|t| *t != UNSET)
            .min();
        let last = slots
            .end
            .iter()
            .map(|s| s.load(Ordering::Acquire))
            .max()
            .filter(|t| *t != UNSET);
        match (first, last) {
            (Some(first), Some(last)) if last >= first => (last - first) as f64 / 1e9,
            _ => 0.0,
        }
    }
}
