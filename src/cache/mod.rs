#![forbid(unsafe_code)]
//! Size-capped store of what finished walks observed about remote vertices.
//!
//! Entries are only ever added by folding walker paths back in and are never
//! evicted. Admission stops for good once cached adjacency entries plus the
//! local edge count reach the configured cap; at that point both
//! [`CacheSignals`] flags drop so that warming stops generating and
//! processing walkers.

mod table;

pub use table::CacheLayout;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::{info, trace};

use crate::graph::PartitionGraph;
use crate::types::{EdgeIndex, HostId, VertexId};
use crate::walker::{PathEntry, Walker};
use table::VertexTable;

type AdjacencyShard = RwLock<FxHashMap<VertexId, FxHashMap<EdgeIndex, VertexId>>>;

/// Outcome of one admission attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// The entry was stored.
    Inserted,
    /// An entry for the same vertex and index already exists and was kept.
    Exists,
    /// The cache is at capacity; nothing was stored.
    Full,
}

/// Process-wide stop flags raised when the cache fills up.
#[derive(Debug)]
pub struct CacheSignals {
    tracking: AtomicBool,
    generating: AtomicBool,
}

impl Default for CacheSignals {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheSignals {
    /// Both flags raised.
    pub fn new() -> Self {
        Self {
            tracking: AtomicBool::new(true),
            generating: AtomicBool::new(true),
        }
    }

    /// True while warm walkers should still be processed and folded.
    pub fn tracking(&self) -> bool {
        self.tracking.load(Ordering::Acquire)
    }

    /// True while warm walkers should still be generated.
    pub fn generating(&self) -> bool {
        self.generating.load(Ordering::Acquire)
    }

    /// True once the cache closed admission.
    pub fn halted(&self) -> bool {
        !self.tracking() && !self.generating()
    }

    /// Lowers both flags.
    pub fn halt(&self) {
        self.tracking.store(false, Ordering::Release);
        self.generating.store(false, Ordering::Release);
    }

    /// Raises both flags for a new warming run.
    pub fn arm(&self) {
        self.tracking.store(true, Ordering::Release);
        self.generating.store(true, Ordering::Release);
    }
}

/// Sizing of a [`RemoteVertexCache`].
#[derive(Clone, Copy, Debug)]
pub struct CacheOptions {
    /// Maximum of cached adjacency entries plus local edges.
    pub cap: u64,
    /// Layout of the degree and owner table.
    pub layout: CacheLayout,
    /// Slots preallocated by the dense layout.
    pub dense_capacity: usize,
    /// Number of lock shards.
    pub shards: usize,
}

/// Concurrent cache of remote vertex degree, owner and partial adjacency.
pub struct RemoteVertexCache {
    table: VertexTable,
    adjacency: Vec<AdjacencyShard>,
    size: AtomicU64,
    local_edges: u64,
    cap: u64,
    signals: Arc<CacheSignals>,
}

impl RemoteVertexCache {
    /// Creates an empty cache sharing `signals` with the engine.
    pub fn new(opts: CacheOptions, local_edges: u64, signals: Arc<CacheSignals>) -> Self {
        let adjacency = (0..opts.shards.max(1))
            .map(|_| RwLock::new(FxHashMap::default()))
            .collect();
        Self {
            table: VertexTable::new(opts.layout, opts.dense_capacity, opts.shards),
            adjacency,
            size: AtomicU64::new(0),
            local_edges,
            cap: opts.cap,
            signals,
        }
    }

    /// Stop flags shared with the engine.
    pub fn signals(&self) -> &Arc<CacheSignals> {
        &self.signals
    }

    /// Adjacency entries admitted so far.
    pub fn size(&self) -> u64 {
        self.size.load(Ordering::Acquire)
    }

    /// Configured cap on entries plus local edges.
    pub fn cap(&self) -> u64 {
        self.cap
    }

    /// True once no further entry will be admitted.
    pub fn is_full(&self) -> bool {
        self.size() + self.local_edges >= self.cap
    }

    /// True if a degree is cached for `vertex`.
    pub fn has_degree(&self, vertex: VertexId) -> bool {
        self.table.degree(vertex).is_some()
    }

    /// Cached degree of `vertex`.
    pub fn degree(&self, vertex: VertexId) -> Option<u64> {
        self.table.degree(vertex)
    }

    /// Cached owner of `vertex`.
    pub fn host_of(&self, vertex: VertexId) -> Option<HostId> {
        self.table.host(vertex)
    }

    /// Records the degree of `vertex`.
    pub fn set_degree(&self, vertex: VertexId, degree: u64) {
        self.table.set_degree(vertex, degree);
    }

    /// Records the owner of `vertex`.
    pub fn set_host(&self, vertex: VertexId, host: HostId) {
        self.table.set_host(vertex, host);
    }

    /// Cached neighbor at `index` in the list of `vertex`.
    pub fn neighbor(&self, vertex: VertexId, index: EdgeIndex) -> Option<VertexId> {
        self.shard_for(vertex)
            .read()
            .get(&vertex)
            .and_then(|edges| edges.get(&index))
            .copied()
    }

    /// Stores `vertex[index] = neighbor` unless the cache is full or the slot is taken.
    ///
    /// The slot is checked under the read lock first and re-checked under the
    /// write lock. The size counter is compared after the insert, so a few
    /// concurrent inserts may land past the cap before the flags drop.
    pub fn set_index(&self, vertex: VertexId, index: EdgeIndex, neighbor: VertexId) -> Admission {
        if self.is_full() {
            self.signals.halt();
            return Admission::Full;
        }
        let shard = self.shard_for(vertex);
        if shard
            .read()
            .get(&vertex)
            .is_some_and(|edges| edges.contains_key(&index))
        {
            return Admission::Exists;
        }
        {
            let mut guard = shard.write();
            let edges = guard.entry(vertex).or_default();
            if edges.contains_key(&index) {
                return Admission::Exists;
            }
            edges.insert(index, neighbor);
        }
        let size = self.size.fetch_add(1, Ordering::AcqRel) + 1;
        if size + self.local_edges >= self.cap {
            self.signals.halt();
            info!(
                size,
                local_edges = self.local_edges,
                cap = self.cap,
                "cache.admission.closed"
            );
        }
        Admission::Inserted
    }

    /// Folds the path of a finished walker into the cache.
    ///
    /// For every consecutive pair `(u, v)` on the path, whichever endpoint is
    /// not owned by `graph` gets its owner, degree and the edge towards the
    /// other endpoint recorded. Returns the number of entries admitted.
    pub fn add_walker<G>(&self, walker: &Walker, graph: &G) -> usize
    where
        G: PartitionGraph + ?Sized,
    {
        let path = walker.path();
        let mut admitted = 0;
        for pair in path.windows(2) {
            let (u, v) = (&pair[0], &pair[1]);
            if !graph.has_vertex(u.vertex) {
                self.learn(u);
                if let Some(index) = v.forward {
                    admitted += usize::from(self.set_index(u.vertex, index, v.vertex) == Admission::Inserted);
                }
            }
            if !graph.has_vertex(v.vertex) {
                self.learn(v);
                if let Some(index) = v.reverse {
                    admitted += usize::from(self.set_index(v.vertex, index, u.vertex) == Admission::Inserted);
                }
            }
        }
        trace!(walker = %walker.id(), hops = path.len(), admitted, "cache.fold");
        admitted
    }

    fn learn(&self, entry: &PathEntry) {
        self.set_host(entry.vertex, entry.host);
        if let Some(degree) = entry.degree {
            self.set_degree(entry.vertex, degree);
        }
    }

    fn shard_for(&self, vertex: VertexId) -> &AdjacencyShard {
        let idx = (vertex.0 as usize) % self.adjacency.len();
        &self.adjacency[idx]
    }
}
