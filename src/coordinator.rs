#![forbid(unsafe_code)]
//! Driver that arms runs on every worker and gathers their reports.
//!
//! A run is an optional cache warming phase followed by one measured run:
//!
//! 1. `CacheWarm` to every worker, then one [`WarmReport`] per worker, then a
//!    connection to every worker's control port releasing the warm barrier.
//! 2. `StartExperiment`, a fixed wait, `EndExperiment`, then one
//!    [`RunReport`] per worker.

use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddrV4, TcpListener, TcpStream, UdpSocket};
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::CoordinatorConfig;
use crate::protocol::{Datagram, RunReport, WarmReport};
use crate::types::Result;

const ACCEPT_POLL: Duration = Duration::from_millis(50);
const RELEASE_RETRY: Duration = Duration::from_millis(100);

/// Outcome of one coordinated run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Walks seeded per owned vertex on every worker.
    pub walks_per_vertex: u32,
    /// Warm reports, empty when no warming phase ran.
    pub warm: Vec<WarmReport>,
    /// Run reports in arrival order.
    pub reports: Vec<RunReport>,
    /// Workers that did not report before the timeout.
    pub missing: usize,
    /// Walks completed over all workers.
    pub completed: u64,
    /// Longest per-worker execution time, in seconds.
    pub execution_time: f64,
    /// Completed walks per second of `execution_time`.
    pub throughput: f64,
    /// Failed sends over all workers.
    pub send_failures: u64,
}

impl RunSummary {
    fn new(walks_per_vertex: u32, warm: Vec<WarmReport>, reports: Vec<RunReport>, expected: usize) -> Self {
        let completed = reports.iter().map(|r| u64::from(r.completed)).sum::<u64>();
        let execution_time = reports
            .iter()
            .map(|r| r.execution_time)
            .fold(0.0_f64, f64::max);
        let throughput = if execution_time > 0.0 {
            completed as f64 / execution_time
        } else {
            0.0
        };
        Self {
            walks_per_vertex,
            warm,
            missing: expected.saturating_sub(reports.len()),
            send_failures: reports.iter().map(|r| u64::from(r.send_failures)).sum(),
            reports,
            completed,
            execution_time,
            throughput,
        }
    }
}

/// Sends control datagrams to the workers and collects their reports.
pub struct Coordinator {
    config: CoordinatorConfig,
    socket: UdpSocket,
}

impl Coordinator {
    /// Validates `config` and opens the control socket.
    pub fn new(config: CoordinatorConfig) -> Result<Self> {
        config.validate()?;
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        Ok(Self { config, socket })
    }

    /// Settings this coordinator runs with.
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Sends `datagram` to the first data port of every worker.
    pub fn broadcast(&self, datagram: &Datagram) -> Result<()> {
        let bytes = datagram.to_bytes();
        for worker in &self.config.workers {
            self.socket.send_to(&bytes, worker)?;
            debug!(to = %worker, len = bytes.len(), "coordinator.broadcast");
        }
        Ok(())
    }

    /// Runs the optional warming phase and one measured run.
    pub fn run(&self) -> Result<RunSummary> {
        let listener = TcpListener::bind((self.config.address, self.config.report_port))?;
        let warm = if self.config.warm {
            self.warm(&listener)?
        } else {
            Vec::new()
        };

        let walks_per_vertex = self.config.walks_per_vertex;
        self.broadcast(&Datagram::StartExperiment {
            coordinator: self.config.address,
            walks_per_vertex,
        })?;
        info!(
            workers = self.config.workers.len(),
            walks_per_vertex,
            run_secs = self.config.run_secs,
            "coordinator.run.start"
        );
        thread::sleep(Duration::from_secs(self.config.run_secs));
        self.broadcast(&Datagram::EndExperiment)?;

        let reports = self.collect(&listener, RunReport::read_from)?;
        for report in &reports {
            info!(
                host = %report.host,
                completed = report.completed,
                execution_time = report.execution_time,
                send_failures = report.send_failures,
                "coordinator.report.run"
            );
        }
        let summary = RunSummary::new(walks_per_vertex, warm, reports, self.config.workers.len());
        info!(
            completed = summary.completed,
            execution_time = summary.execution_time,
            throughput = summary.throughput,
            missing = summary.missing,
            "coordinator.run.done"
        );
        Ok(summary)
    }

    fn warm(&self, listener: &TcpListener) -> Result<Vec<WarmReport>> {
        self.broadcast(&Datagram::CacheWarm {
            coordinator: self.config.address,
        })?;
        info!(workers = self.config.workers.len(), "coordinator.warm.start");
        let reports = self.collect(listener, WarmReport::read_from)?;
        for report in &reports {
            info!(host = %report.host, walkers = report.walkers, "coordinator.report.warm");
        }
        for worker in &self.config.workers {
            self.release(SocketAddrV4::new(*worker.ip(), self.config.control_port))?;
        }
        info!(reports = reports.len(), "coordinator.warm.released");
        Ok(reports)
    }

    /// Connects once to a worker's control port; the connection itself is the signal.
    fn release(&self, target: SocketAddrV4) -> Result<()> {
        let deadline = Instant::now() + self.timeout();
        loop {
            match TcpStream::connect(target) {
                Ok(stream) => {
                    drop(stream);
                    return Ok(());
                }
                Err(err) if err.kind() == ErrorKind::ConnectionRefused && Instant::now() < deadline => {
                    thread::sleep(RELEASE_RETRY);
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Accepts one report per worker, giving up at the configured timeout.
    fn collect<T, F>(&self, listener: &TcpListener, read: F) -> Result<Vec<T>>
    where
        F: Fn(TcpStream) -> Result<T>,
    {
        let expected = self.config.workers.len();
        let deadline = Instant::now() + self.timeout();
        let mut reports = Vec::with_capacity(expected);
        listener.set_nonblocking(true)?;
        while reports.len() < expected {
            match listener.accept() {
                Ok((stream, peer)) => {
                    stream.set_nonblocking(false)?;
                    stream.set_read_timeout(Some(self.timeout()))?;
                    match read(stream) {
                        Ok(report) => reports.push(report),
                        Err(err) => warn!(%peer, error = %err, "coordinator.report.invalid"),
                    }
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        warn!(
                            received = reports.len(),
                            expected,
                            "coordinator.report.timeout"
                        );
                        break;
                    }
                    thread::sleep(ACCEPT_POLL);
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(reports)
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.report_timeout_secs)
    }
}
