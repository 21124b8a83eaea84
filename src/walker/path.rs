use crate::types::{EdgeIndex, HostId, VertexId};

/// One visited vertex together with what was learned about it in transit.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Hop {
    /// The vertex the walker stood on.
    pub vertex: VertexId,
    /// Degree of `vertex`, once its owner (or the cache) filled it in.
    pub degree: Option<u64>,
    /// Index of the edge previous → `vertex` in the previous vertex's adjacency list.
    pub forward: Option<EdgeIndex>,
    /// Index of the edge `vertex` → previous in this vertex's adjacency list.
    pub reverse: Option<EdgeIndex>,
}

impl Hop {
    /// Creates a hop with every learned field unknown.
    pub fn at(vertex: VertexId) -> Self {
        Self {
            vertex,
            degree: None,
            forward: None,
            reverse: None,
        }
    }
}

/// A maximal run of consecutive hops on vertices owned by the same host.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Segment {
    /// Owner of every vertex in `hops`.
    pub host: HostId,
    /// Set once the walker was shipped over the network to continue in this segment.
    pub crossed: bool,
    /// Hops in visit order; never empty for a segment produced by stepping.
    pub hops: Vec<Hop>,
}

impl Segment {
    pub(crate) fn new(host: HostId) -> Self {
        Self {
            host,
            crossed: false,
            hops: Vec::new(),
        }
    }
}

/// A hop flattened out of its segment, carrying its owner explicitly.
///
/// This is the shape the remote-vertex cache consumes when it folds a finished walk.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PathEntry {
    /// Visited vertex.
    pub vertex: VertexId,
    /// Owner of `vertex`.
    pub host: HostId,
    /// Degree of `vertex`, if known.
    pub degree: Option<u64>,
    /// Index of previous → `vertex` in the previous vertex's list, if known.
    pub forward: Option<EdgeIndex>,
    /// Index of `vertex` → previous in this vertex's list, if known.
    pub reverse: Option<EdgeIndex>,
}

pub(crate) fn flatten(segments: &[Segment]) -> Vec<PathEntry> {
    let total = segments.iter().map(|s| s.hops.len()).sum();
    let mut out = Vec::with_capacity(total);
    for segment in segments {
        out.extend(segment.hops.iter().map(|hop| PathEntry {
            vertex: hop.vertex,
            host: segment.host,
            degree: hop.degree,
            forward: hop.forward,
            reverse: hop.reverse,
        }));
    }
    out
}
