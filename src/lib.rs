//! Strider: distributed random walks over a partitioned graph.
//!
//! Every worker process owns one partition of the vertex set. Walkers start
//! at owned vertices, step locally while they can and travel between workers
//! as UDP datagrams when they cross a partition boundary. A finished walk is
//! returned to the host that seeded it, where it is either timed (measured
//! run) or folded into a cache of remote adjacency (warming run).

#![warn(missing_docs)]

pub mod cache;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod graph;
pub mod primitives;
pub mod protocol;
pub mod stats;
pub mod types;
pub mod walker;

pub use cache::{Admission, CacheLayout, CacheSignals, RemoteVertexCache};
pub use config::{CoordinatorConfig, EngineConfig, StriderConfig};
pub use coordinator::{Coordinator, RunSummary};
pub use engine::{Engine, EngineHandle, IndexSampler, UniformSampler, WalkOutcome};
pub use graph::{MemoryPartition, PartitionGraph};
pub use protocol::{Datagram, MessageKind, RunReport, WarmReport};
pub use stats::WalkStatsTracker;
pub use types::{EdgeIndex, HostId, Result, StriderError, VertexId, WalkerId};
pub use walker::Walker;
