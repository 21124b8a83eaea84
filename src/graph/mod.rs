#![forbid(unsafe_code)]
//! Read-only view of this worker's graph partition.
//!
//! The engine only ever talks to the partition through [`PartitionGraph`];
//! [`MemoryPartition`] is the in-memory implementation loaded from a shard file.

mod memory;
pub mod shard;

pub use memory::MemoryPartition;
pub use shard::{ShardEdge, SplitOptions, SplitSummary};

use crate::types::{EdgeIndex, HostId, VertexId};

/// Queries the engine needs from the locally owned partition.
pub trait PartitionGraph: Send + Sync {
    /// Host owning this partition.
    fn host(&self) -> HostId;

    /// True if `vertex` is owned here.
    fn has_vertex(&self, vertex: VertexId) -> bool;

    /// Out-degree of an owned vertex.
    fn degree(&self, vertex: VertexId) -> Option<u64>;

    /// Neighbor at position `index` in the adjacency list of an owned vertex.
    fn neighbor(&self, vertex: VertexId, index: EdgeIndex) -> Option<VertexId>;

    /// Position of `to` in the adjacency list of `from`.
    fn index_of(&self, from: VertexId, to: VertexId) -> Option<EdgeIndex>;

    /// Owner of an owned vertex or of any neighbor of one.
    fn host_of(&self, vertex: VertexId) -> Option<HostId>;

    /// Owned vertices in ascending id order.
    fn vertices(&self) -> &[VertexId];

    /// Number of adjacency entries stored locally.
    fn edge_count(&self) -> u64;
}
