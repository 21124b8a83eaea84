#![forbid(unsafe_code)]
//! Per-worker random-walk engine.
//!
//! An [`Engine`] owns one partition of the graph, the remote-vertex cache and
//! the walk statistics of the walkers it seeds. [`Engine::start`] brings up the
//! thread set of a worker:
//!
//! * one receiver per consecutive data port, decoding datagrams into the
//!   receive queues or phase changes;
//! * one sender per remote peer, draining the per-destination send queues
//!   into batch datagrams;
//! * a main controller that seeds a measured run on every start message;
//! * a warm controller that seeds a warming run on every cache-warm message.
//!
//! Processor pools drain the receive queues and drive each walker with
//! [`Engine::dispatch`]. Any error escaping one of these threads is fatal for
//! the whole process.

mod generate;
mod phase;
mod report;
mod step;
mod transport;

pub use generate::{draw_life, IndexSampler, UniformSampler};
pub use phase::{Phase, RunMode};
pub use step::WalkOutcome;
pub use transport::{TransportCounters, TransportSnapshot};

use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rand::Rng;
use tracing::{debug, error, info, warn};

use crate::cache::{CacheSignals, RemoteVertexCache};
use crate::config::EngineConfig;
use crate::graph::PartitionGraph;
use crate::primitives::concurrency::{Latch, MessageQueue};
use crate::stats::WalkStatsTracker;
use crate::types::{HostId, Result, StriderError};
use crate::walker::Walker;
use transport::SendCursor;

const CONTROL_POLL: Duration = Duration::from_millis(100);
const PROCESS_POLL: Duration = Duration::from_millis(50);

/// State of one worker process.
pub struct Engine {
    config: EngineConfig,
    host: HostId,
    graph: Box<dyn PartitionGraph>,
    cache: RemoteVertexCache,
    stats: WalkStatsTracker,
    phase: Phase,
    receive_queues: Vec<MessageQueue<Walker>>,
    send_queues: Vec<MessageQueue<Walker>>,
    cursor: SendCursor,
    counters: TransportCounters,
    start_latch: Latch,
    warm_latch: Latch,
}

impl Engine {
    /// Builds the engine of host `config.host_id` over `graph`.
    ///
    /// # Arguments
    /// * `config` - Validated worker settings.
    /// * `graph` - Partition owned by this host.
    ///
    /// # Returns
    /// The engine, not yet running any thread.
    pub fn new(config: EngineConfig, graph: Box<dyn PartitionGraph>) -> Result<Self> {
        config.validate()?;
        let host = config.host();
        if graph.host() != host {
            return Err(StriderError::Config(format!(
                "partition of host {} loaded by host {host}",
                graph.host()
            )));
        }
        let signals = Arc::new(CacheSignals::new());
        let cache = RemoteVertexCache::new(
            config.cache_options(),
            graph.edge_count(),
            Arc::clone(&signals),
        );
        let peers = config.peers.len();
        Ok(Self {
            host,
            graph,
            cache,
            stats: WalkStatsTracker::new(),
            phase: Phase::new(signals),
            receive_queues: (0..config.queue_count()).map(|_| MessageQueue::new()).collect(),
            send_queues: (0..peers).map(|_| MessageQueue::new()).collect(),
            cursor: SendCursor::new(peers, host),
            counters: TransportCounters::default(),
            start_latch: Latch::new(),
            warm_latch: Latch::new(),
            config,
        })
    }

    /// Partition owned by this worker.
    pub fn graph(&self) -> &dyn PartitionGraph {
        self.graph.as_ref()
    }

    /// Remote-vertex cache.
    pub fn cache(&self) -> &RemoteVertexCache {
        &self.cache
    }

    /// Statistics of walkers seeded here.
    pub fn stats(&self) -> &WalkStatsTracker {
        &self.stats
    }

    /// Current phase.
    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    /// Settings this engine runs with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Host id of this worker.
    pub fn host(&self) -> HostId {
        self.host
    }

    /// Outgoing walkers waiting for `host`.
    pub fn send_queue(&self, host: HostId) -> Option<&MessageQueue<Walker>> {
        self.send_queues.get(host.index())
    }

    /// Incoming walkers of processor `index`.
    pub fn receive_queue(&self, index: usize) -> Option<&MessageQueue<Walker>> {
        self.receive_queues.get(index)
    }

    /// Datagram traffic counters.
    pub fn counters(&self) -> &TransportCounters {
        &self.counters
    }

    /// Binds the receive ports and spawns every long-running thread.
    pub fn start(self: &Arc<Self>) -> Result<EngineHandle> {
        let mut threads = Vec::new();
        let base = self.config.data_port();
        for i in 0..self.config.receivers {
            let port = base + i as u16;
            let socket = UdpSocket::bind((self.config.bind_ip, port))?;
            let engine = Arc::clone(self);
            threads.push(spawn_fatal(format!("strider-recv-{i}"), move || {
                engine.run_receiver(socket)
            })?);
        }
        for slot in 0..self.config.peers.len().saturating_sub(1) {
            let engine = Arc::clone(self);
            threads.push(spawn_fatal(format!("strider-send-{slot}"), move || {
                engine.run_sender(slot)
            })?);
        }
        let engine = Arc::clone(self);
        threads.push(spawn_fatal("strider-main".into(), move || {
            engine.run_main_controller()
        })?);
        let engine = Arc::clone(self);
        threads.push(spawn_fatal("strider-warm".into(), move || {
            engine.run_warm_controller()
        })?);

        info!(
            host = %self.host,
            port = base,
            receivers = self.config.receivers,
            peers = self.config.peers.len(),
            vertices = self.graph.vertices().len(),
            edges = self.graph.edge_count(),
            "engine.started"
        );
        Ok(EngineHandle {
            engine: Arc::clone(self),
            threads,
        })
    }

    fn run_main_controller(self: Arc<Self>) -> Result<()> {
        let mut pool: Option<ProcessorPool> = None;
        while !self.phase.is_shutting_down() {
            if !self.start_latch.wait_timeout(CONTROL_POLL) {
                continue;
            }
            if pool.is_none() {
                pool = Some(self.spawn_processors(self.config.main_processors, "main")?);
            }
            self.generate_main(self.phase.walks_per_vertex())?;
        }
        if let Some(pool) = pool {
            pool.stop(&self);
        }
        Ok(())
    }

    fn run_warm_controller(self: Arc<Self>) -> Result<()> {
        while !self.phase.is_shutting_down() {
            if !self.warm_latch.wait_timeout(CONTROL_POLL) {
                continue;
            }
            let pool = self.spawn_processors(self.config.warm_processors, "warm")?;
            let seeded = self.generate_warm()?;

            // workers report at staggered times
            let mut rng = self.walk_rng(0xa11e_0000);
            let jitter = rng.gen_range(0..=self.config.report_delay_ms);
            thread::sleep(Duration::from_millis(jitter));
            let release = self.bind_release()?;
            self.send_warm_report(seeded)?;

            self.await_warm_release(release)?;
            pool.stop(&self);
            info!(
                host = %self.host,
                seeded,
                cache_size = self.cache.size(),
                "engine.warm.done"
            );
        }
        Ok(())
    }

    fn spawn_processors(self: &Arc<Self>, size: usize, label: &str) -> Result<ProcessorPool> {
        let running = Arc::new(AtomicBool::new(true));
        let mut handles = Vec::with_capacity(size);
        for queue in 0..size {
            let engine = Arc::clone(self);
            let running = Arc::clone(&running);
            handles.push(spawn_fatal(format!("strider-{label}-{queue}"), move || {
                engine.run_processor(queue, &running)
            })?);
        }
        debug!(host = %self.host, size, pool = label, "engine.processors.start");
        Ok(ProcessorPool {
            running,
            handles,
            size,
        })
    }

    fn run_processor(&self, queue: usize, running: &AtomicBool) -> Result<()> {
        let mut sampler = UniformSampler::new(self.walk_rng(0x9_0000 | queue as u64));
        let mut drained = Vec::new();
        while running.load(Ordering::Acquire) && !self.phase.is_shutting_down() {
            if self.receive_queues[queue].pop_all_timeout(&mut drained, PROCESS_POLL) == 0 {
                continue;
            }
            for walker in drained.drain(..) {
                self.dispatch(walker, &mut sampler)?;
            }
        }
        Ok(())
    }
}

/// Processors draining the first `size` receive queues.
struct ProcessorPool {
    running: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
    size: usize,
}

impl ProcessorPool {
    fn stop(self, engine: &Engine) {
        self.running.store(false, Ordering::Release);
        for queue in engine.receive_queues.iter().take(self.size) {
            queue.push(Walker::noop());
        }
        for handle in self.handles {
            if handle.join().is_err() {
                warn!(host = %engine.host, "engine.processors.panicked");
            }
        }
    }
}

/// Running engine threads.
pub struct EngineHandle {
    engine: Arc<Engine>,
    threads: Vec<JoinHandle<()>>,
}

impl EngineHandle {
    /// Engine the threads run on.
    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Asks every thread to exit at its next poll.
    pub fn shutdown(&self) {
        self.engine.phase.request_shutdown();
    }

    /// Waits for every thread to exit.
    pub fn join(self) {
        for handle in self.threads {
            if handle.join().is_err() {
                warn!(host = %self.engine.host, "engine.thread.panicked");
            }
        }
    }
}

/// Spawns a named thread whose error terminates the process.
pub(crate) fn spawn_fatal<F>(name: String, f: F) -> Result<JoinHandle<()>>
where
    F: FnOnce() -> Result<()> + Send + 'static,
{
    let handle = thread::Builder::new().name(name.clone()).spawn(move || {
        if let Err(err) = f() {
            error!(thread = %name, error = %err, "engine.thread.fatal");
            std::process::exit(1);
        }
    })?;
    Ok(handle)
}
