//! Shard files: one per worker, holding the edges whose source it owns.
//!
//! A shard is a flat sequence of 24-byte little-endian records
//! `(src u64, dst u64, dst_host u32, reserved u32)`.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::primitives::bytes::{buf::Cursor, le};
use crate::types::{HostId, Result, StriderError, VertexId};

/// Length of one shard record.
pub const RECORD_LEN: usize = 24;

/// One directed edge as stored in a shard.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShardEdge {
    /// Source vertex, owned by the shard's host.
    pub src: VertexId,
    /// Destination vertex.
    pub dst: VertexId,
    /// Owner of `dst`.
    pub dst_host: HostId,
}

impl ShardEdge {
    fn encode(&self, out: &mut Vec<u8>) {
        le::put_u64(out, self.src.0);
        le::put_u64(out, self.dst.0);
        le::put_u32(out, self.dst_host.0);
        le::put_u32(out, 0);
    }

    fn decode(cur: &mut Cursor<'_>) -> Result<Self> {
        let edge = Self {
            src: VertexId(cur.get_u64()?),
            dst: VertexId(cur.get_u64()?),
            dst_host: HostId(cur.get_u32()?),
        };
        cur.get_u32()?;
        Ok(edge)
    }
}

/// Reads every record of a shard file.
pub fn read_shard(path: &Path) -> Result<Vec<ShardEdge>> {
    let mut raw = Vec::new();
    BufReader::new(File::open(path)?).read_to_end(&mut raw)?;
    if raw.len() % RECORD_LEN != 0 {
        return Err(StriderError::Corruption("shard length is not a whole number of records"));
    }
    let mut cur = Cursor::new(&raw);
    let mut edges = Vec::with_capacity(raw.len() / RECORD_LEN);
    while cur.remaining() > 0 {
        edges.push(ShardEdge::decode(&mut cur)?);
    }
    Ok(edges)
}

/// Writes `edges` as a shard file, replacing any existing file.
pub fn write_shard(path: &Path, edges: &[ShardEdge]) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    let mut record = Vec::with_capacity(RECORD_LEN);
    for edge in edges {
        record.clear();
        edge.encode(&mut record);
        out.write_all(&record)?;
    }
    out.flush()?;
    Ok(())
}

/// Options for [`split_edge_list`].
#[derive(Clone, Debug)]
pub struct SplitOptions {
    /// Number of partitions, one per worker.
    pub parts: u32,
    /// Also emit the reverse of every input edge.
    pub mirror: bool,
}

/// Counters reported after a split.
#[derive(Clone, Debug, Default, Serialize)]
pub struct SplitSummary {
    /// Edges parsed from the input.
    pub edges_read: u64,
    /// Records written, indexed by partition.
    pub records_per_part: Vec<u64>,
    /// Shard files written, indexed by partition.
    pub files: Vec<PathBuf>,
}

/// Partition owning `vertex` when the graph is split `parts` ways.
pub fn owner_of(vertex: VertexId, parts: u32) -> HostId {
    HostId((vertex.0 % u64::from(parts.max(1))) as u32)
}

/// Path of the shard for `part` under `dir`.
pub fn shard_path(dir: &Path, part: u32) -> PathBuf {
    dir.join(format!("{part}.shard"))
}

/// Splits a whitespace-separated text edge list into per-worker shard files.
///
/// Blank lines and lines starting with `#` or `%` are skipped. Vertex `v` is
/// owned by partition `v mod parts`; each edge is stored in the shard of its
/// source.
///
/// # Arguments
/// * `input` - Text edge list, one `src dst` pair per line
/// * `out_dir` - Directory receiving `<part>.shard`, created if missing
/// * `opts` - Partition count and mirroring
///
/// # Returns
/// A [`SplitSummary`] with the per-partition record counts.
pub fn split_edge_list<R: BufRead>(
    input: R,
    out_dir: &Path,
    opts: &SplitOptions,
) -> Result<SplitSummary> {
    if opts.parts == 0 {
        return Err(StriderError::Config("split needs at least one partition".into()));
    }
    let mut parts: Vec<Vec<ShardEdge>> = vec![Vec::new(); opts.parts as usize];
    let mut summary = SplitSummary::default();

    for (n, line) in input.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('%') {
            continue;
        }
        let (src, dst) = parse_pair(trimmed).ok_or(StriderError::InvalidEdgeList(n + 1))?;
        summary.edges_read += 1;
        let src_host = owner_of(src, opts.parts);
        let dst_host = owner_of(dst, opts.parts);
        parts[src_host.index()].push(ShardEdge { src, dst, dst_host });
        if opts.mirror {
            parts[dst_host.index()].push(ShardEdge {
                src: dst,
                dst: src,
                dst_host: src_host,
            });
        }
    }

    fs::create_dir_all(out_dir)?;
    for (part, edges) in parts.iter().enumerate() {
        let path = shard_path(out_dir, part as u32);
        write_shard(&path, edges)?;
        debug!(part, records = edges.len(), path = %path.display(), "graph.split.part");
        summary.records_per_part.push(edges.len() as u64);
        summary.files.push(path);
    }
    info!(
        edges = summary.edges_read,
        parts = opts.parts,
        mirror = opts.mirror,
        "graph.split.done"
    );
    Ok(summary)
}

fn parse_pair(line: &str) -> Option<(VertexId, VertexId)> {
    let mut fields = line.split_whitespace();
    let src = fields.next()?.parse().ok()?;
    let dst = fields.next()?.parse().ok()?;
    Some((VertexId(src), VertexId(dst)))
}
