#![forbid(unsafe_code)]
//! Identifier newtypes and the crate-wide error type.

use std::fmt;

/// Identifier of a graph vertex, global across all partitions.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct VertexId(pub u64);

/// Identifier of a worker process; doubles as the index into the peer list.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
pub struct HostId(pub u32);

/// Identifier of a walker, unique per origin host and run.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct WalkerId(pub u32);

/// Position of an edge inside a vertex's local adjacency list.
pub type EdgeIndex = u64;

impl HostId {
    /// Returns the host id as a queue/peer index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl WalkerId {
    /// Returns the walker id as a slot index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for WalkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for VertexId {
    fn from(value: u64) -> Self {
        VertexId(value)
    }
}

impl From<u32> for HostId {
    fn from(value: u32) -> Self {
        HostId(value)
    }
}

impl From<u32> for WalkerId {
    fn from(value: u32) -> Self {
        WalkerId(value)
    }
}

/// Errors raised by the walker codec, the cache and the engine.
#[derive(thiserror::Error, Debug)]
pub enum StriderError {
    /// Underlying socket or file failure.
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    /// A walker was constructed with a life that is zero or too long for one datagram.
    #[error("invalid walker life {0}")]
    InvalidLife(u32),
    /// The pending next index was read without having been set.
    #[error("walker {0} has no pending next index")]
    MissingNextIndex(WalkerId),
    /// A hop was requested on a walker whose life is exhausted.
    #[error("walker {0} is terminal")]
    WalkerTerminal(WalkerId),
    /// A path accessor was used on a walker without any hop.
    #[error("walker {0} has an empty path")]
    EmptyPath(WalkerId),
    /// Wire bytes are truncated or internally inconsistent.
    #[error("corruption: {0}")]
    Corruption(&'static str),
    /// A message carries a kind value this protocol does not define.
    #[error("unknown message kind {0}")]
    UnknownMessageKind(u8),
    /// A message carries a protocol version this build does not speak.
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),
    /// A well-formed message arrived where the protocol does not allow it.
    #[error("protocol violation: {0}")]
    Protocol(&'static str),
    /// Neither the local partition nor the cache knows the owner of a vertex.
    #[error("owner of vertex {0} is unknown")]
    UnknownHost(VertexId),
    /// A text edge list line is not a pair of vertex ids.
    #[error("edge list line {0} is malformed")]
    InvalidEdgeList(usize),
    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StriderError>;
