use std::io::Read;
use std::net::{TcpListener, TcpStream};
use std::thread;

use tracing::info;

use super::Engine;
use crate::protocol::{RunReport, WarmReport};
use crate::types::{Result, StriderError};

impl Engine {
    /// Result of the current measured run as seen by this origin.
    pub fn run_report(&self) -> RunReport {
        RunReport {
            host: self.config.local_ip(),
            completed: u32::try_from(self.stats.completed()).unwrap_or(u32::MAX),
            execution_time: self.stats.execution_time(),
            send_failures: u32::try_from(self.counters.snapshot().send_failures)
                .unwrap_or(u32::MAX),
        }
    }

    /// Waits the configured delay, then pushes the run report to the coordinator.
    pub(crate) fn send_run_report(&self) -> Result<()> {
        thread::sleep(self.config.report_delay());
        let coordinator = self
            .phase
            .coordinator()
            .ok_or(StriderError::Protocol("end of run before any start"))?;
        let report = self.run_report();
        let transport = self.counters.snapshot();
        let queued: usize = self.receive_queues.iter().map(|q| q.len()).sum();
        let pending: usize = self.send_queues.iter().map(|q| q.len()).sum();
        info!(
            host = %self.host,
            completed = report.completed,
            completed_hops = self.stats.completed_hops(),
            execution_time = report.execution_time,
            datagrams_sent = transport.datagrams_sent,
            walkers_sent = transport.walkers_sent,
            datagrams_received = transport.datagrams_received,
            send_failures = transport.send_failures,
            dropped_datagrams = transport.dropped_datagrams,
            queued,
            pending,
            local_edges = self.graph.edge_count(),
            cache_edges = self.cache.size(),
            "engine.report.run"
        );
        let stream = TcpStream::connect((coordinator, self.config.report_port))?;
        report.write_to(stream)
    }

    /// Pushes the warm report to the coordinator.
    pub(crate) fn send_warm_report(&self, walkers: u32) -> Result<()> {
        let coordinator = self
            .phase
            .coordinator()
            .ok_or(StriderError::Protocol("warming run without a coordinator"))?;
        let report = WarmReport {
            host: self.config.local_ip(),
            walkers,
        };
        info!(
            host = %self.host,
            walkers,
            cache_edges = self.cache.size(),
            "engine.report.warm"
        );
        let stream = TcpStream::connect((coordinator, self.config.report_port))?;
        report.write_to(stream)
    }

    /// Listener for the warm-run release, bound before the warm report goes out.
    pub(crate) fn bind_release(&self) -> Result<TcpListener> {
        Ok(TcpListener::bind((self.config.bind_ip, self.config.control_port))?)
    }

    /// Blocks until the coordinator connects to the control port, signalling
    /// that every worker finished warming.
    pub(crate) fn await_warm_release(&self, listener: TcpListener) -> Result<()> {
        let (mut stream, peer) = listener.accept()?;
        let mut sink = Vec::new();
        stream.read_to_end(&mut sink)?;
        info!(host = %self.host, %peer, "engine.warm.released");
        Ok(())
    }
}
