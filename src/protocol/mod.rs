#![forbid(unsafe_code)]
//! Datagram and report formats exchanged between workers and the coordinator.
//!
//! Every datagram starts with one byte holding the protocol version in the
//! high nibble and a [`MessageKind`] in the low nibble. Walker batches carry a
//! `u16` record count followed by the concatenated walker records; control
//! messages carry a fixed body. Reports travel over TCP as fixed-width
//! little-endian records.

use std::io::{Read, Write};
use std::net::Ipv4Addr;

use serde::Serialize;

use crate::primitives::bytes::{buf::Cursor, le};
use crate::types::{Result, StriderError};
use crate::walker::Walker;

/// Protocol version written into the high nibble of every kind byte.
pub const WIRE_VERSION: u8 = 0;
/// Kind byte plus record count.
pub const BATCH_HEADER_LEN: usize = 3;
/// Default maximum datagram payload in bytes.
pub const DEFAULT_PAYLOAD_LIMIT: usize = 8950;
/// Largest payload a UDP datagram over IPv4 can carry.
pub const MAX_UDP_PAYLOAD: usize = 65_507;

/// Message kinds carried in the low nibble of the kind byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    /// Walker still has hops to take.
    Alive = 0,
    /// Walker life is exhausted.
    Dead = 1,
    /// Datagram carrying a batch of walker records.
    Batch = 2,
    /// Coordinator arms the measured run.
    StartExperiment = 3,
    /// Coordinator arms the cache warming run.
    CacheWarm = 4,
    /// Coordinator asks for the run report.
    EndExperiment = 5,
    /// Finished walker travelling back to its origin host.
    DeadForward = 6,
    /// Wake-up message without payload.
    Noop = 7,
}

impl MessageKind {
    /// Kind byte with the current protocol version.
    pub fn to_byte(self) -> u8 {
        (WIRE_VERSION << 4) | self as u8
    }

    /// Parses a kind byte, checking the version nibble first.
    pub fn from_byte(byte: u8) -> Result<Self> {
        let version = byte >> 4;
        if version != WIRE_VERSION {
            return Err(StriderError::UnsupportedVersion(version));
        }
        Ok(match byte & 0x0F {
            0 => Self::Alive,
            1 => Self::Dead,
            2 => Self::Batch,
            3 => Self::StartExperiment,
            4 => Self::CacheWarm,
            5 => Self::EndExperiment,
            6 => Self::DeadForward,
            7 => Self::Noop,
            other => return Err(StriderError::UnknownMessageKind(other)),
        })
    }
}

/// A decoded datagram.
#[derive(Debug, Clone, PartialEq)]
pub enum Datagram {
    /// Walker records in send order.
    Batch(Vec<Walker>),
    /// Start the measured run; reports go to `coordinator`.
    StartExperiment {
        /// Address the run report is sent to.
        coordinator: Ipv4Addr,
        /// Walks to seed at every owned vertex.
        walks_per_vertex: u32,
    },
    /// Start a cache warming run; reports go to `coordinator`.
    CacheWarm {
        /// Address the warm report is sent to.
        coordinator: Ipv4Addr,
    },
    /// Stop measuring and send the run report.
    EndExperiment,
}

impl Datagram {
    /// Appends the wire form to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Datagram::Batch(walkers) => {
                le::put_u8(out, MessageKind::Batch.to_byte());
                le::put_u16(out, walkers.len() as u16);
                for walker in walkers {
                    walker.encode(out);
                }
            }
            Datagram::StartExperiment {
                coordinator,
                walks_per_vertex,
            } => {
                le::put_u8(out, MessageKind::StartExperiment.to_byte());
                out.extend_from_slice(&coordinator.octets());
                le::put_u32(out, *walks_per_vertex);
            }
            Datagram::CacheWarm { coordinator } => {
                le::put_u8(out, MessageKind::CacheWarm.to_byte());
                out.extend_from_slice(&coordinator.octets());
            }
            Datagram::EndExperiment => le::put_u8(out, MessageKind::EndExperiment.to_byte()),
        }
    }

    /// Wire form as a fresh buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode(&mut out);
        out
    }

    /// Parses one received datagram.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut cur = Cursor::new(bytes);
        let datagram = match MessageKind::from_byte(cur.get_u8()?)? {
            MessageKind::Batch => {
                let count = cur.get_u16()?;
                let mut walkers = Vec::with_capacity(usize::from(count));
                for _ in 0..count {
                    walkers.push(Walker::decode(&mut cur)?);
                }
                Datagram::Batch(walkers)
            }
            MessageKind::StartExperiment => {
                let coordinator = read_ipv4(&mut cur)?;
                let walks_per_vertex = cur.get_u32()?;
                Datagram::StartExperiment {
                    coordinator,
                    walks_per_vertex,
                }
            }
            MessageKind::CacheWarm => Datagram::CacheWarm {
                coordinator: read_ipv4(&mut cur)?,
            },
            MessageKind::EndExperiment => Datagram::EndExperiment,
            _ => return Err(StriderError::Protocol("walker kind used as datagram kind")),
        };
        if cur.remaining() != 0 {
            return Err(StriderError::Corruption("trailing bytes after datagram"));
        }
        Ok(datagram)
    }
}

fn read_ipv4(cur: &mut Cursor<'_>) -> Result<Ipv4Addr> {
    let octets: [u8; 4] = cur
        .take(4)?
        .try_into()
        .map_err(|_| StriderError::Corruption("short address"))?;
    Ok(Ipv4Addr::from(octets))
}

/// Packs walker records into one outbound batch datagram.
pub struct BatchWriter {
    buf: Vec<u8>,
    count: u16,
    limit: usize,
}

impl BatchWriter {
    /// Creates an empty batch bounded by `limit` payload bytes.
    pub fn new(limit: usize) -> Self {
        let mut buf = Vec::with_capacity(limit);
        le::put_u8(&mut buf, MessageKind::Batch.to_byte());
        le::put_u16(&mut buf, 0);
        Self {
            buf,
            count: 0,
            limit,
        }
    }

    /// True if `walker` can join the open batch without exceeding the limit.
    pub fn fits(&self, walker: &Walker) -> bool {
        self.count < u16::MAX && self.buf.len() + walker.size() <= self.limit
    }

    /// Appends `walker`; fails if it does not fit.
    pub fn push(&mut self, walker: &Walker) -> Result<()> {
        if !self.fits(walker) {
            return Err(StriderError::Protocol("walker does not fit the open datagram"));
        }
        walker.encode(&mut self.buf);
        self.count += 1;
        le::patch_u16(&mut self.buf, 1, self.count);
        Ok(())
    }

    /// Records in the open batch.
    pub fn count(&self) -> u16 {
        self.count
    }

    /// True if nothing was pushed since the last reset.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Datagram bytes ready to send.
    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Empties the batch, keeping the allocation.
    pub fn reset(&mut self) {
        self.buf.truncate(BATCH_HEADER_LEN);
        self.count = 0;
        le::patch_u16(&mut self.buf, 1, 0);
    }
}

/// Result of one measured run on one worker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RunReport {
    /// Reporting worker.
    pub host: Ipv4Addr,
    /// Walks that finished at this origin.
    pub completed: u32,
    /// Seconds from the first start to the last end.
    pub execution_time: f64,
    /// Datagrams that could not be handed to the socket.
    pub send_failures: u32,
}

impl RunReport {
    /// Encoded length in bytes.
    pub const LEN: usize = 20;

    /// Wire form.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::LEN);
        out.extend_from_slice(&self.host.octets());
        le::put_u32(&mut out, self.completed);
        le::put_f64(&mut out, self.execution_time);
        le::put_u32(&mut out, self.send_failures);
        out
    }

    /// Parses the wire form.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut cur = Cursor::new(bytes);
        Ok(Self {
            host: read_ipv4(&mut cur)?,
            completed: cur.get_u32()?,
            execution_time: cur.get_f64()?,
            send_failures: cur.get_u32()?,
        })
    }

    /// Writes the record to a stream.
    pub fn write_to<W: Write>(&self, mut w: W) -> Result<()> {
        w.write_all(&self.to_bytes())?;
        w.flush()?;
        Ok(())
    }

    /// Reads exactly one record from a stream.
    pub fn read_from<R: Read>(mut r: R) -> Result<Self> {
        let mut raw = [0u8; Self::LEN];
        r.read_exact(&mut raw)?;
        Self::from_bytes(&raw)
    }
}

/// Result of one cache warming run on one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WarmReport {
    /// Reporting worker.
    pub host: Ipv4Addr,
    /// Walkers generated before the cache closed.
    pub walkers: u32,
}

impl WarmReport {
    /// Encoded length in bytes.
    pub const LEN: usize = 8;

    /// Wire form.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::LEN);
        out.extend_from_slice(&self.host.octets());
        le::put_u32(&mut out, self.walkers);
        out
    }

    /// Parses the wire form.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut cur = Cursor::new(bytes);
        Ok(Self {
            host: read_ipv4(&mut cur)?,
            walkers: cur.get_u32()?,
        })
    }

    /// Writes the record to a stream.
    pub fn write_to<W: Write>(&self, mut w: W) -> Result<()> {
        w.write_all(&self.to_bytes())?;
        w.flush()?;
        Ok(())
    }

    /// Reads exactly one record from a stream.
    pub fn read_from<R: Read>(mut r: R) -> Result<Self> {
        let mut raw = [0u8; Self::LEN];
        r.read_exact(&mut raw)?;
        Self::from_bytes(&raw)
    }
}
