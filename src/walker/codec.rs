//! Fixed-layout wire encoding of a [`Walker`].
//!
//! ```text
//! 0      1      2        4          8       10          12         16            24
//! | kind | flags | size  | walker id | life | hops@host | reserved | next index  | path words...
//! ```
//!
//! Every path word is a little-endian u64. A segment starts with
//! `host << 16 | hops << 1 | crossed` and is followed by `hops` quadruples of
//! `(vertex, degree, forward index, reverse index)`.

use super::{Hop, Segment, Walker};
use crate::primitives::bytes::{buf::Cursor, le};
use crate::protocol::MessageKind;
use crate::types::{HostId, Result, StriderError, VertexId, WalkerId};

/// Encoded header length in bytes.
pub const HEADER_LEN: usize = 24;
/// Width of one path word in bytes.
pub const WORD_LEN: usize = 8;
/// Wire value standing for "not known yet" in degree and index slots.
pub const UNKNOWN: u64 = 2_001_002_003;

const HOPS_MASK: u64 = 0x7FFF;

fn segment_word(segment: &Segment) -> u64 {
    (u64::from(segment.host.0) << 16)
        | ((segment.hops.len() as u64 & HOPS_MASK) << 1)
        | u64::from(segment.crossed)
}

fn known(word: u64) -> Option<u64> {
    (word != UNKNOWN).then_some(word)
}

impl Walker {
    /// Appends the wire form of this walker to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.reserve(self.size());
        le::put_u8(out, self.kind.to_byte());
        le::put_u8(out, self.flags);
        le::put_u16(out, self.size);
        le::put_u32(out, self.id.0);
        le::put_u16(out, self.life);
        le::put_u16(out, self.hops_at_current_host());
        le::put_u32(out, self.reserved);
        le::put_u64(out, self.next_index);
        for segment in &self.segments {
            le::put_u64(out, segment_word(segment));
            for hop in &segment.hops {
                le::put_u64(out, hop.vertex.0);
                le::put_u64(out, hop.degree.unwrap_or(UNKNOWN));
                le::put_u64(out, hop.forward.unwrap_or(UNKNOWN));
                le::put_u64(out, hop.reverse.unwrap_or(UNKNOWN));
            }
        }
    }

    /// Wire form as a fresh buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.size());
        self.encode(&mut out);
        out
    }

    /// Reads one walker record starting at the cursor, leaving it just past the record.
    pub fn decode(cur: &mut Cursor<'_>) -> Result<Self> {
        let kind = MessageKind::from_byte(cur.get_u8()?)?;
        let flags = cur.get_u8()?;
        let size = cur.get_u16()?;
        let id = WalkerId(cur.get_u32()?);
        let life = cur.get_u16()?;
        let hops_at_host = cur.get_u16()?;
        let reserved = cur.get_u32()?;
        let next_index = cur.get_u64()?;

        let body_len = usize::from(size)
            .checked_sub(HEADER_LEN)
            .ok_or(StriderError::Corruption("walker size below header length"))?;
        if body_len % WORD_LEN != 0 {
            return Err(StriderError::Corruption("walker size is not word aligned"));
        }
        let mut words = Cursor::new(cur.take(body_len)?);

        let mut segments = Vec::new();
        while words.remaining() > 0 {
            let head = words.get_u64()?;
            if head >> 48 != 0 {
                return Err(StriderError::Corruption("segment host out of range"));
            }
            let hops = ((head >> 1) & HOPS_MASK) as usize;
            if hops == 0 {
                return Err(StriderError::Corruption("empty path segment"));
            }
            let mut segment = Segment {
                host: HostId((head >> 16) as u32),
                crossed: head & 1 == 1,
                hops: Vec::with_capacity(hops),
            };
            for _ in 0..hops {
                segment.hops.push(Hop {
                    vertex: VertexId(words.get_u64()?),
                    degree: known(words.get_u64()?),
                    forward: known(words.get_u64()?),
                    reverse: known(words.get_u64()?),
                });
            }
            segments.push(segment);
        }
        let tail = segments.last().map_or(0, |s| s.hops.len());
        if tail != usize::from(hops_at_host) {
            return Err(StriderError::Corruption("hop count disagrees with path"));
        }
        let walks = matches!(
            kind,
            MessageKind::Alive | MessageKind::Dead | MessageKind::DeadForward
        );
        if walks && segments.is_empty() {
            return Err(StriderError::Corruption("walker record without a path"));
        }
        if kind == MessageKind::Alive && life == 0 {
            return Err(StriderError::Corruption("live walker without life"));
        }

        Ok(Self {
            kind,
            flags,
            id,
            life,
            reserved,
            next_index,
            segments,
            size,
        })
    }

    /// Decodes a buffer holding exactly one walker record.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut cur = Cursor::new(bytes);
        let walker = Self::decode(&mut cur)?;
        if cur.remaining() != 0 {
            return Err(StriderError::Corruption("trailing bytes after walker"));
        }
        Ok(walker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn header_layout_is_fixed() {
        let mut w = Walker::new(VertexId(5), 2, WalkerId(0x0102_0304), HostId(3), 9).unwrap();
        w.set_next_index(0x1122);
        w.set_crossed(true);
        let bytes = w.to_bytes();
        assert_eq!(bytes.len(), HEADER_LEN + 5 * WORD_LEN);
        assert_eq!(bytes[0], 0x00, "version 0, kind alive");
        assert_eq!(bytes[1], 0b1110_0000);
        assert_eq!(u16::from_le_bytes([bytes[2], bytes[3]]) as usize, bytes.len());
        assert_eq!(&bytes[4..8], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(u16::from_le_bytes([bytes[8], bytes[9]]), 9);
        assert_eq!(u16::from_le_bytes([bytes[10], bytes[11]]), 1);
        assert_eq!(&bytes[16..24], &0x1122u64.to_le_bytes());
        let head = u64::from_le_bytes(bytes[24..32].try_into().unwrap());
        assert_eq!(head, (3 << 16) | (1 << 1) | 1);
        let vertex = u64::from_le_bytes(bytes[32..40].try_into().unwrap());
        assert_eq!(vertex, 5);
        let forward = u64::from_le_bytes(bytes[48..56].try_into().unwrap());
        assert_eq!(forward, UNKNOWN);
    }

    #[test]
    fn noop_is_a_bare_header() {
        let bytes = Walker::noop().to_bytes();
        assert_eq!(bytes.len(), HEADER_LEN);
        assert_eq!(bytes[0], MessageKind::Noop.to_byte());
        assert_eq!(Walker::from_bytes(&bytes).unwrap(), Walker::noop());
    }

    #[test]
    fn truncated_record_is_rejected() {
        let w = Walker::new(VertexId(1), 1, WalkerId(1), HostId(0), 3).unwrap();
        let bytes = w.to_bytes();
        let err = Walker::from_bytes(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(err, StriderError::Corruption(_)));
    }

    #[test]
    fn unknown_kind_and_version_are_rejected() {
        let w = Walker::new(VertexId(1), 1, WalkerId(1), HostId(0), 3).unwrap();
        let mut bytes = w.to_bytes();
        bytes[0] = 0x0C;
        assert!(matches!(
            Walker::from_bytes(&bytes),
            Err(StriderError::UnknownMessageKind(0x0C))
        ));
        bytes[0] = 0x10;
        assert!(matches!(
            Walker::from_bytes(&bytes),
            Err(StriderError::UnsupportedVersion(1))
        ));
    }

    #[test]
    fn inconsistent_hop_count_is_rejected() {
        let w = Walker::new(VertexId(1), 1, WalkerId(1), HostId(0), 3).unwrap();
        let mut bytes = w.to_bytes();
        bytes[10] = 2;
        assert!(matches!(
            Walker::from_bytes(&bytes),
            Err(StriderError::Corruption(_))
        ));
    }

    #[test]
    fn pathless_walker_records_are_rejected() {
        for kind in [MessageKind::Alive, MessageKind::Dead, MessageKind::DeadForward] {
            let mut bytes = Walker::noop().to_bytes();
            bytes[0] = kind.to_byte();
            bytes[8] = 3;
            assert!(
                matches!(Walker::from_bytes(&bytes), Err(StriderError::Corruption(_))),
                "{kind:?}"
            );
        }
    }

    #[test]
    fn live_walker_without_life_is_rejected() {
        let w = Walker::new(VertexId(1), 1, WalkerId(3), HostId(0), 3).unwrap();
        let mut bytes = w.to_bytes();
        bytes[8..10].copy_from_slice(&0u16.to_le_bytes());
        assert!(matches!(
            Walker::from_bytes(&bytes),
            Err(StriderError::Corruption(_))
        ));

        // a finished walker legitimately carries no life
        bytes[0] = MessageKind::Dead.to_byte();
        let dead = Walker::from_bytes(&bytes).unwrap();
        assert_eq!((dead.kind(), dead.life()), (MessageKind::Dead, 0));
    }

    #[test]
    fn consecutive_records_decode_in_place() {
        let a = Walker::new(VertexId(1), 1, WalkerId(1), HostId(0), 3).unwrap();
        let mut b = Walker::new(VertexId(2), 4, WalkerId(2), HostId(1), 3).unwrap();
        b.advance(VertexId(3), HostId(0), Some(6), Some(1), Some(0))
            .unwrap();
        let mut bytes = a.to_bytes();
        b.encode(&mut bytes);
        let mut cur = Cursor::new(&bytes);
        assert_eq!(Walker::decode(&mut cur).unwrap(), a);
        assert_eq!(Walker::decode(&mut cur).unwrap(), b);
        assert_eq!(cur.remaining(), 0);
    }

    #[derive(Debug, Clone)]
    enum Step {
        Hop { host: u32, degree: Option<u64>, forward: Option<u64> },
        Cross,
        Pending(u64),
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            4 => (0u32..4, proptest::option::of(0u64..1_000), proptest::option::of(0u64..1_000))
                .prop_map(|(host, degree, forward)| Step::Hop { host, degree, forward }),
            1 => Just(Step::Cross),
            1 => (0u64..1_000).prop_map(Step::Pending),
        ]
    }

    proptest! {
        #[test]
        fn wire_roundtrip_prop(
            life in 1u16..40,
            id in any::<u32>(),
            steps in proptest::collection::vec(step(), 0..80),
        ) {
            let mut w = Walker::new(VertexId(9), 3, WalkerId(id), HostId(1), life).unwrap();
            for (n, s) in steps.into_iter().enumerate() {
                match s {
                    Step::Hop { host, degree, forward } => {
                        if w.is_end() {
                            continue;
                        }
                        w.advance(VertexId(n as u64), HostId(host), degree, forward, None).unwrap();
                    }
                    Step::Cross => w.set_crossed(true),
                    Step::Pending(i) => w.set_next_index(i),
                }
            }
            let bytes = w.to_bytes();
            prop_assert_eq!(bytes.len(), w.size());
            let back = Walker::from_bytes(&bytes).unwrap();
            prop_assert_eq!(&back, &w);
            prop_assert_eq!(back.to_bytes(), bytes);
        }
    }
}
