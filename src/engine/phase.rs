use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::cache::CacheSignals;

/// Which kind of run the worker is in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunMode {
    /// Measured run: finished walks are timed at their origin.
    Main,
    /// Warming run: finished walks are folded into the cache.
    CacheWarm,
}

/// Process-wide phase state shared by every engine thread.
///
/// Folding and warm generation follow the cache's [`CacheSignals`], so a full
/// cache stops both without any thread polling the cache itself.
#[derive(Debug)]
pub struct Phase {
    mode: AtomicU8,
    shutdown: AtomicBool,
    signals: Arc<CacheSignals>,
    coordinator: Mutex<Option<Ipv4Addr>>,
    walks_per_vertex: AtomicU32,
}

impl Phase {
    pub(crate) fn new(signals: Arc<CacheSignals>) -> Self {
        // nothing is folded until a warming run arms the signals
        signals.halt();
        Self {
            mode: AtomicU8::new(RunMode::Main as u8),
            shutdown: AtomicBool::new(false),
            signals,
            coordinator: Mutex::new(None),
            walks_per_vertex: AtomicU32::new(0),
        }
    }

    /// Current run mode.
    pub fn mode(&self) -> RunMode {
        match self.mode.load(Ordering::Acquire) {
            0 => RunMode::Main,
            _ => RunMode::CacheWarm,
        }
    }

    /// True during a measured run.
    pub fn is_main(&self) -> bool {
        self.mode() == RunMode::Main
    }

    /// True while finished walks should be folded into the cache.
    pub fn folding(&self) -> bool {
        self.signals.tracking()
    }

    /// True while warm walkers should still be generated.
    pub fn generating(&self) -> bool {
        self.signals.generating()
    }

    /// Switches to a measured run reporting to `coordinator`.
    pub fn enter_main(&self, coordinator: Ipv4Addr, walks_per_vertex: u32) {
        *self.coordinator.lock() = Some(coordinator);
        self.walks_per_vertex.store(walks_per_vertex, Ordering::Release);
        self.signals.halt();
        self.mode.store(RunMode::Main as u8, Ordering::Release);
    }

    /// Switches to a warming run reporting to `coordinator`.
    pub fn enter_warm(&self, coordinator: Ipv4Addr) {
        *self.coordinator.lock() = Some(coordinator);
        self.mode.store(RunMode::CacheWarm as u8, Ordering::Release);
        self.signals.arm();
    }

    /// Coordinator of the latest run, if any was started.
    pub fn coordinator(&self) -> Option<Ipv4Addr> {
        *self.coordinator.lock()
    }

    /// Walks per owned vertex requested by the latest start message.
    pub fn walks_per_vertex(&self) -> u32 {
        self.walks_per_vertex.load(Ordering::Acquire)
    }

    /// Asks every engine thread to exit.
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    /// True once shutdown was requested.
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}
