use std::path::Path;

use rustc_hash::FxHashMap;
use tracing::info;

use super::shard::{self, ShardEdge};
use super::PartitionGraph;
use crate::types::{EdgeIndex, HostId, Result, VertexId};

/// Adjacency lists of the owned vertices, kept in shard order.
#[derive(Debug, Default)]
pub struct MemoryPartition {
    host: HostId,
    adjacency: FxHashMap<VertexId, Vec<VertexId>>,
    // first position of each (src, dst) pair in the adjacency list of src
    positions: FxHashMap<(VertexId, VertexId), EdgeIndex>,
    owners: FxHashMap<VertexId, HostId>,
    vertices: Vec<VertexId>,
    edges: u64,
}

impl MemoryPartition {
    /// Builds the partition of `host` from edges whose source it owns.
    pub fn from_edges<I>(host: HostId, edges: I) -> Self
    where
        I: IntoIterator<Item = ShardEdge>,
    {
        let mut adjacency: FxHashMap<VertexId, Vec<VertexId>> = FxHashMap::default();
        let mut positions = FxHashMap::default();
        let mut owners = FxHashMap::default();
        let mut count = 0u64;
        for edge in edges {
            let list = adjacency.entry(edge.src).or_default();
            positions
                .entry((edge.src, edge.dst))
                .or_insert(list.len() as EdgeIndex);
            list.push(edge.dst);
            owners.insert(edge.src, host);
            owners.entry(edge.dst).or_insert(edge.dst_host);
            if edge.dst_host == host {
                // owned sinks still count as local vertices
                adjacency.entry(edge.dst).or_default();
            }
            count += 1;
        }
        let mut vertices: Vec<VertexId> = adjacency.keys().copied().collect();
        vertices.sort_unstable();
        Self {
            host,
            adjacency,
            positions,
            owners,
            vertices,
            edges: count,
        }
    }

    /// Loads the shard file written by [`shard::split_edge_list`] for `host`.
    pub fn load_shard(host: HostId, path: &Path) -> Result<Self> {
        let edges = shard::read_shard(path)?;
        let partition = Self::from_edges(host, edges);
        info!(
            host = %host,
            path = %path.display(),
            vertices = partition.vertices.len(),
            edges = partition.edges,
            "graph.shard.loaded"
        );
        Ok(partition)
    }
}

impl PartitionGraph for MemoryPartition {
    fn host(&self) -> HostId {
        self.host
    }

    fn has_vertex(&self, vertex: VertexId) -> bool {
        self.adjacency.contains_key(&vertex)
    }

    fn degree(&self, vertex: VertexId) -> Option<u64> {
        self.adjacency.get(&vertex).map(|list| list.len() as u64)
    }

    fn neighbor(&self, vertex: VertexId, index: EdgeIndex) -> Option<VertexId> {
        let list = self.adjacency.get(&vertex)?;
        usize::try_from(index).ok().and_then(|i| list.get(i)).copied()
    }

    fn index_of(&self, from: VertexId, to: VertexId) -> Option<EdgeIndex> {
        self.positions.get(&(from, to)).copied()
    }

    fn host_of(&self, vertex: VertexId) -> Option<HostId> {
        self.owners.get(&vertex).copied()
    }

    fn vertices(&self) -> &[VertexId] {
        &self.vertices
    }

    fn edge_count(&self) -> u64 {
        self.edges
    }
}
