use std::io::ErrorKind;
use std::net::{SocketAddrV4, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::Engine;
use crate::protocol::{BatchWriter, Datagram, MAX_UDP_PAYLOAD};
use crate::types::{HostId, Result, StriderError};
use crate::walker::Walker;

const SEND_POLL: Duration = Duration::from_millis(10);
const RECV_POLL: Duration = Duration::from_millis(200);

/// Round-robin choice of the next send queue to drain.
///
/// A destination is handed to at most one sender at a time; the claim is
/// released when the returned [`SendClaim`] drops.
pub(crate) struct SendCursor {
    next: Mutex<usize>,
    busy: Vec<AtomicBool>,
    skip: usize,
}

pub(crate) struct SendClaim<'a> {
    cursor: &'a SendCursor,
    index: usize,
}

impl SendClaim<'_> {
    pub(crate) fn index(&self) -> usize {
        self.index
    }
}

impl Drop for SendClaim<'_> {
    fn drop(&mut self) {
        self.cursor.busy[self.index].store(false, Ordering::Release);
    }
}

impl SendCursor {
    pub(crate) fn new(destinations: usize, skip: HostId) -> Self {
        Self {
            next: Mutex::new(0),
            busy: (0..destinations).map(|_| AtomicBool::new(false)).collect(),
            skip: skip.index(),
        }
    }

    /// Claims the next idle destination other than this host, if any.
    pub(crate) fn claim(&self) -> Option<SendClaim<'_>> {
        let mut next = self.next.lock();
        let n = self.busy.len();
        for _ in 0..n {
            let index = *next;
            *next = (index + 1) % n;
            if index == self.skip {
                continue;
            }
            if self.busy[index]
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Some(SendClaim {
                    cursor: self,
                    index,
                });
            }
        }
        None
    }
}

/// Relaxed counters of datagram traffic.
#[derive(Debug, Default)]
pub struct TransportCounters {
    datagrams_sent: AtomicU64,
    walkers_sent: AtomicU64,
    datagrams_received: AtomicU64,
    walkers_received: AtomicU64,
    send_failures: AtomicU64,
    dropped_datagrams: AtomicU64,
}

/// Point-in-time copy of [`TransportCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransportSnapshot {
    /// Batch datagrams handed to the socket.
    pub datagrams_sent: u64,
    /// Walkers inside those datagrams.
    pub walkers_sent: u64,
    /// Batch datagrams received.
    pub datagrams_received: u64,
    /// Walkers inside those datagrams.
    pub walkers_received: u64,
    /// `send_to` calls that failed; their walkers are lost.
    pub send_failures: u64,
    /// Received datagrams that failed to decode.
    pub dropped_datagrams: u64,
}

impl TransportCounters {
    /// Reads every counter.
    pub fn snapshot(&self) -> TransportSnapshot {
        TransportSnapshot {
            datagrams_sent: self.datagrams_sent.load(Ordering::Relaxed),
            walkers_sent: self.walkers_sent.load(Ordering::Relaxed),
            datagrams_received: self.datagrams_received.load(Ordering::Relaxed),
            walkers_received: self.walkers_received.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            dropped_datagrams: self.dropped_datagrams.load(Ordering::Relaxed),
        }
    }
}

impl Engine {
    /// Sender loop: drains claimed send queues into batch datagrams.
    pub(crate) fn run_sender(self: Arc<Self>, slot: usize) -> Result<()> {
        let socket = UdpSocket::bind((self.config.bind_ip, 0))?;
        let mut rng = self.walk_rng(0x5e4d_0000 | slot as u64);
        let mut batch = BatchWriter::new(self.config.payload_limit);
        let mut drained: Vec<Walker> = Vec::new();
        debug!(host = %self.host, slot, "transport.sender.start");

        while !self.phase.is_shutting_down() {
            let Some(claim) = self.cursor.claim() else {
                thread::sleep(SEND_POLL);
                continue;
            };
            let dest = claim.index();
            let popped = self.send_queues[dest].pop_all_timeout(&mut drained, SEND_POLL);
            drop(claim);
            if popped == 0 {
                continue;
            }
            let peer = self.config.peers[dest];
            for walker in drained.drain(..) {
                if !batch.fits(&walker) {
                    self.flush(&socket, &mut batch, peer, &mut rng);
                }
                if let Err(err) = batch.push(&walker) {
                    warn!(walker = %walker.id(), size = walker.size(), error = %err, "transport.sender.oversized");
                }
            }
            self.flush(&socket, &mut batch, peer, &mut rng);
        }
        Ok(())
    }

    fn flush<R: Rng>(&self, socket: &UdpSocket, batch: &mut BatchWriter, peer: SocketAddrV4, rng: &mut R) {
        if batch.is_empty() {
            return;
        }
        let port = peer
            .port()
            .saturating_add(rng.gen_range(0..self.config.receivers as u16));
        let target = SocketAddrV4::new(*peer.ip(), port);
        match socket.send_to(batch.bytes(), target) {
            Ok(_) => {
                self.counters.datagrams_sent.fetch_add(1, Ordering::Relaxed);
                self.counters
                    .walkers_sent
                    .fetch_add(u64::from(batch.count()), Ordering::Relaxed);
                debug!(
                    to = %target,
                    walkers = batch.count(),
                    bytes = batch.bytes().len(),
                    "transport.sender.flush"
                );
            }
            Err(err) => {
                self.counters.send_failures.fetch_add(1, Ordering::Relaxed);
                warn!(to = %target, walkers = batch.count(), error = %err, "transport.sender.failed");
            }
        }
        batch.reset();
    }

    /// Receiver loop for one data port.
    pub(crate) fn run_receiver(self: Arc<Self>, socket: UdpSocket) -> Result<()> {
        socket.set_read_timeout(Some(RECV_POLL))?;
        let mut rng = self.walk_rng(0x7ec0_0000 | u64::from(socket.local_addr()?.port()));
        let mut buf = vec![0u8; MAX_UDP_PAYLOAD];
        info!(host = %self.host, addr = %socket.local_addr()?, "transport.receiver.start");

        while !self.phase.is_shutting_down() {
            let len = match socket.recv(&mut buf) {
                Ok(len) => len,
                Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => continue,
                Err(err) => return Err(err.into()),
            };
            let datagram = match Datagram::decode(&buf[..len]) {
                Ok(datagram) => datagram,
                Err(err @ (StriderError::UnknownMessageKind(_) | StriderError::UnsupportedVersion(_))) => {
                    return Err(err);
                }
                Err(err) => {
                    self.counters.dropped_datagrams.fetch_add(1, Ordering::Relaxed);
                    warn!(len, error = %err, "transport.receiver.dropped");
                    continue;
                }
            };
            self.handle_datagram(datagram, &mut rng)?;
        }
        Ok(())
    }

    /// Applies one decoded datagram: walker batches go to a random receive
    /// queue of the active pool, control messages switch the phase.
    pub fn handle_datagram<R: Rng>(self: &Arc<Self>, datagram: Datagram, rng: &mut R) -> Result<()> {
        match datagram {
            Datagram::Batch(walkers) => {
                self.counters.datagrams_received.fetch_add(1, Ordering::Relaxed);
                self.counters
                    .walkers_received
                    .fetch_add(walkers.len() as u64, Ordering::Relaxed);
                let active = if self.phase.is_main() {
                    self.config.main_processors
                } else {
                    self.config.warm_processors
                };
                let queue = rng.gen_range(0..active.min(self.receive_queues.len()));
                self.receive_queues[queue].push_batch(walkers);
            }
            Datagram::StartExperiment {
                coordinator,
                walks_per_vertex,
            } => {
                info!(host = %self.host, %coordinator, walks_per_vertex, "engine.phase.main");
                self.phase.enter_main(coordinator, walks_per_vertex);
                self.start_latch.open();
            }
            Datagram::CacheWarm { coordinator } => {
                info!(host = %self.host, %coordinator, "engine.phase.warm");
                self.phase.enter_warm(coordinator);
                if self.cache.is_full() {
                    self.cache.signals().halt();
                }
                self.warm_latch.open();
            }
            Datagram::EndExperiment => {
                info!(host = %self.host, "engine.phase.end");
                let engine = Arc::clone(self);
                super::spawn_fatal("strider-report".into(), move || engine.send_run_report())?;
            }
        }
        Ok(())
    }
}
