use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::Deserialize;

use crate::types::{HostId, VertexId};

const ABSENT: u64 = u64::MAX;

/// Storage layout of the per-vertex degree and owner records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheLayout {
    /// Flat arrays indexed by vertex id, for small dense id spaces.
    #[default]
    Dense,
    /// Sharded hash maps, for sparse or very large id spaces.
    Sparse,
}

#[derive(Clone, Copy, Default)]
struct Meta {
    degree: Option<u64>,
    host: Option<HostId>,
}

pub(crate) struct SparseTable {
    shards: Vec<RwLock<FxHashMap<VertexId, Meta>>>,
}

impl SparseTable {
    fn new(shards: usize) -> Self {
        let shards = (0..shards.max(1))
            .map(|_| RwLock::new(FxHashMap::default()))
            .collect();
        Self { shards }
    }

    fn shard_for(&self, vertex: VertexId) -> &RwLock<FxHashMap<VertexId, Meta>> {
        let idx = (vertex.0 as usize) % self.shards.len();
        &self.shards[idx]
    }

    fn get(&self, vertex: VertexId) -> Meta {
        self.shard_for(vertex)
            .read()
            .get(&vertex)
            .copied()
            .unwrap_or_default()
    }

    fn update(&self, vertex: VertexId, f: impl FnOnce(&mut Meta)) {
        let mut guard = self.shard_for(vertex).write();
        f(guard.entry(vertex).or_default());
    }
}

/// Degree and owner of remote vertices.
///
/// The dense layout keeps ids below its capacity in atomic arrays and spills
/// anything larger into a sparse overflow table.
pub(crate) enum VertexTable {
    Dense {
        degree: Vec<AtomicU64>,
        host: Vec<AtomicU64>,
        overflow: SparseTable,
    },
    Sparse(SparseTable),
}

impl VertexTable {
    pub(crate) fn new(layout: CacheLayout, capacity: usize, shards: usize) -> Self {
        match layout {
            CacheLayout::Dense => Self::Dense {
                degree: (0..capacity).map(|_| AtomicU64::new(ABSENT)).collect(),
                host: (0..capacity).map(|_| AtomicU64::new(ABSENT)).collect(),
                overflow: SparseTable::new(shards),
            },
            CacheLayout::Sparse => Self::Sparse(SparseTable::new(shards)),
        }
    }

    pub(crate) fn degree(&self, vertex: VertexId) -> Option<u64> {
        match self {
            Self::Dense {
                degree, overflow, ..
            } => match slot(degree, vertex) {
                Some(cell) => present(cell.load(Ordering::Acquire)),
                None => overflow.get(vertex).degree,
            },
            Self::Sparse(table) => table.get(vertex).degree,
        }
    }

    pub(crate) fn host(&self, vertex: VertexId) -> Option<HostId> {
        match self {
            Self::Dense { host, overflow, .. } => match slot(host, vertex) {
                Some(cell) => present(cell.load(Ordering::Acquire)).map(|h| HostId(h as u32)),
                None => overflow.get(vertex).host,
            },
            Self::Sparse(table) => table.get(vertex).host,
        }
    }

    pub(crate) fn set_degree(&self, vertex: VertexId, value: u64) {
        match self {
            Self::Dense {
                degree, overflow, ..
            } => match slot(degree, vertex) {
                Some(cell) if value != ABSENT => cell.store(value, Ordering::Release),
                Some(_) => {}
                None => overflow.update(vertex, |m| m.degree = Some(value)),
            },
            Self::Sparse(table) => table.update(vertex, |m| m.degree = Some(value)),
        }
    }

    pub(crate) fn set_host(&self, vertex: VertexId, value: HostId) {
        match self {
            Self::Dense { host, overflow, .. } => match slot(host, vertex) {
                Some(cell) => cell.store(u64::from(value.0), Ordering::Release),
                None => overflow.update(vertex, |m| m.host = Some(value)),
            },
            Self::Sparse(table) => table.update(vertex, |m| m.host = Some(value)),
        }
    }
}

fn slot(cells: &[AtomicU64], vertex: VertexId) -> Option<&AtomicU64> {
    usize::try_from(vertex.0).ok().and_then(|i| cells.get(i))
}

fn present(raw: u64) -> Option<u64> {
    (raw != ABSENT).then_some(raw)
}
