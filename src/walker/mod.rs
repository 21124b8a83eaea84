#![forbid(unsafe_code)]
//! The mobile state of one random walk.
//!
//! A [`Walker`] carries its protocol header and the full path it has walked so
//! far. The path is kept as a list of per-host [`Segment`]s; the flat word
//! layout only exists on the wire (see [`Walker::encode`]).

mod codec;
mod path;

pub use codec::{HEADER_LEN, UNKNOWN, WORD_LEN};
pub use path::{Hop, PathEntry, Segment};

use crate::protocol::MessageKind;
use crate::types::{EdgeIndex, HostId, Result, StriderError, VertexId, WalkerId};

/// Bits of the header flag byte.
pub mod flags {
    /// The walker crossed a host boundary on its latest transfer.
    pub const CROSSED_STEP: u8 = 1 << 7;
    /// A pending next index is stored in the header.
    pub const NEXT_INDEX: u8 = 1 << 6;
    /// The walker crossed a host boundary at least once.
    pub const CROSSED_EVER: u8 = 1 << 5;
}

/// Words a single hop may add: a fresh segment header plus the hop itself.
const WORST_CASE_HOP_WORDS: usize = 5;

/// Longest life whose worst-case encoding fits in `limit` bytes.
///
/// The origin hop already occupies one worst-case unit, so a walker of life
/// `L` never grows beyond `HEADER_LEN + 40 * (L + 1)` bytes.
pub const fn max_life_for(limit: usize) -> u16 {
    let units = limit.saturating_sub(HEADER_LEN) / (WORD_LEN * WORST_CASE_HOP_WORDS);
    let life = units.saturating_sub(1);
    if life > u16::MAX as usize {
        u16::MAX
    } else {
        life as u16
    }
}

/// Upper bound imposed by the 16-bit size field, independent of any payload limit.
pub const MAX_LIFE: u16 = max_life_for(u16::MAX as usize);

/// One random walk in flight.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Walker {
    kind: MessageKind,
    flags: u8,
    id: WalkerId,
    life: u16,
    reserved: u32,
    next_index: u64,
    segments: Vec<Segment>,
    size: u16,
}

impl Walker {
    /// Seeds a walk at `origin`, owned by `host`, with `life` hops to go.
    ///
    /// The origin segment is pre-marked as crossed so that the walk is always
    /// reported back to `host` when it ends.
    pub fn new(
        origin: VertexId,
        degree: u64,
        id: WalkerId,
        host: HostId,
        life: u16,
    ) -> Result<Self> {
        if life == 0 || life > MAX_LIFE {
            return Err(StriderError::InvalidLife(u32::from(life)));
        }
        let mut segment = Segment::new(host);
        segment.crossed = true;
        segment.hops.push(Hop {
            degree: Some(degree),
            ..Hop::at(origin)
        });
        Ok(Self {
            kind: MessageKind::Alive,
            flags: 0,
            id,
            life,
            reserved: 0,
            next_index: 0,
            segments: vec![segment],
            size: (HEADER_LEN + WORD_LEN * WORST_CASE_HOP_WORDS) as u16,
        })
    }

    /// A pathless message whose only purpose is to wake a blocked consumer.
    pub fn noop() -> Self {
        Self {
            kind: MessageKind::Noop,
            flags: 0,
            id: WalkerId(0),
            life: 0,
            reserved: 0,
            next_index: 0,
            segments: Vec::new(),
            size: HEADER_LEN as u16,
        }
    }

    /// Message kind carried in the header.
    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Overrides the message kind, e.g. to mark a finished walk for forwarding.
    pub fn set_kind(&mut self, kind: MessageKind) {
        self.kind = kind;
    }

    /// Walker identity, unique per origin host and run.
    pub fn id(&self) -> WalkerId {
        self.id
    }

    /// Run tag stored in the reserved header word.
    pub fn run(&self) -> u32 {
        self.reserved
    }

    /// Stamps the run this walk was seeded for.
    pub fn set_run(&mut self, run: u32) {
        self.reserved = run;
    }

    /// Hops left before the walk terminates.
    pub fn life(&self) -> u16 {
        self.life
    }

    /// Encoded length in bytes, header included.
    pub fn size(&self) -> usize {
        usize::from(self.size)
    }

    /// Raw flag byte.
    pub fn flags(&self) -> u8 {
        self.flags
    }

    /// True once life has run out.
    pub fn is_end(&self) -> bool {
        self.kind == MessageKind::Dead
    }

    /// True if the walker crossed a boundary on its latest transfer.
    pub fn is_crossed(&self) -> bool {
        self.flags & flags::CROSSED_STEP != 0
    }

    /// True if the walker has crossed a boundary at any point.
    pub fn is_crossed_ever(&self) -> bool {
        self.flags & flags::CROSSED_EVER != 0
    }

    /// Marks (or clears) the pending boundary crossing. Setting it also latches
    /// the crossed-ever bit, which is never cleared.
    pub fn set_crossed(&mut self, crossed: bool) {
        if crossed {
            self.flags |= flags::CROSSED_STEP | flags::CROSSED_EVER;
        } else {
            self.flags &= !flags::CROSSED_STEP;
        }
    }

    /// True if a resumption index is pending.
    pub fn has_next_index(&self) -> bool {
        self.flags & flags::NEXT_INDEX != 0
    }

    /// Stores the edge index the receiving host must follow.
    pub fn set_next_index(&mut self, index: EdgeIndex) {
        self.next_index = index;
        self.flags |= flags::NEXT_INDEX;
    }

    /// Consumes the pending resumption index.
    pub fn take_next_index(&mut self) -> Result<EdgeIndex> {
        if !self.has_next_index() {
            return Err(StriderError::MissingNextIndex(self.id));
        }
        self.flags &= !flags::NEXT_INDEX;
        Ok(self.next_index)
    }

    /// Vertex the walker currently stands on.
    pub fn current_vertex(&self) -> Option<VertexId> {
        self.current_hop().map(|hop| hop.vertex)
    }

    /// Vertex visited just before the current one.
    pub fn prev_vertex(&self) -> Option<VertexId> {
        let mut hops = self.segments.iter().rev().flat_map(|s| s.hops.iter().rev());
        hops.next()?;
        hops.next().map(|hop| hop.vertex)
    }

    /// Host that seeded the walk.
    pub fn origin_host(&self) -> Option<HostId> {
        self.segments.first().map(|s| s.host)
    }

    /// Host recorded for the current segment.
    pub fn current_host(&self) -> Option<HostId> {
        self.segments.last().map(|s| s.host)
    }

    /// Hops recorded in the current segment.
    pub fn hops_at_current_host(&self) -> u16 {
        self.segments.last().map_or(0, |s| s.hops.len() as u16)
    }

    /// Total hops recorded, the origin included.
    pub fn hop_count(&self) -> usize {
        self.segments.iter().map(|s| s.hops.len()).sum()
    }

    /// Segmented view of the path.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Flattened path, one entry per visited vertex.
    pub fn path(&self) -> Vec<PathEntry> {
        path::flatten(&self.segments)
    }

    /// Records the current vertex's degree once its owner looked it up.
    pub fn set_current_degree(&mut self, degree: u64) {
        if let Some(hop) = self.current_hop_mut() {
            hop.degree = Some(degree);
        }
    }

    /// Records where the previous vertex sits in the current vertex's list.
    pub fn set_current_reverse(&mut self, index: EdgeIndex) {
        if let Some(hop) = self.current_hop_mut() {
            hop.reverse = Some(index);
        }
    }

    /// Moves the walker to `next`, owned by `host`.
    ///
    /// Opens a new segment when `host` differs from the current one and
    /// consumes one unit of life; the walker turns [`MessageKind::Dead`] when
    /// life reaches zero.
    pub fn advance(
        &mut self,
        next: VertexId,
        host: HostId,
        degree: Option<u64>,
        forward: Option<EdgeIndex>,
        reverse: Option<EdgeIndex>,
    ) -> Result<()> {
        if self.life == 0 || self.is_end() {
            return Err(StriderError::WalkerTerminal(self.id));
        }
        if self.is_crossed() {
            if let Some(segment) = self.segments.last_mut() {
                segment.crossed = true;
            }
            self.set_crossed(false);
        }
        let mut grow = 4 * WORD_LEN;
        if self.current_host() != Some(host) {
            self.segments.push(Segment::new(host));
            grow += WORD_LEN;
        }
        self.size = self
            .size
            .checked_add(grow as u16)
            .ok_or(StriderError::Corruption("walker outgrew its size field"))?;
        if let Some(segment) = self.segments.last_mut() {
            segment.hops.push(Hop {
                vertex: next,
                degree,
                forward,
                reverse,
            });
        }
        self.life -= 1;
        if self.life == 0 {
            self.kind = MessageKind::Dead;
        }
        Ok(())
    }

    fn current_hop(&self) -> Option<&Hop> {
        self.segments.last().and_then(|s| s.hops.last())
    }

    fn current_hop_mut(&mut self) -> Option<&mut Hop> {
        self.segments.last_mut().and_then(|s| s.hops.last_mut())
    }

    fn word_count(&self) -> usize {
        self.segments.iter().map(|s| 1 + 4 * s.hops.len()).sum()
    }
}
